//! Registration session data model.

/// Maximum number of participants in one team registration.
pub const MAX_TEAM_SIZE: usize = 3;

/// One participant's answers, filled field by field during a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserData {
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
    pub phone_number: String,
}

/// Registration flavor. Fixed for the lifetime of a session once chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationType {
    Single,
    Team,
}

impl RegistrationType {
    /// Maximum number of participants this flavor allows.
    pub fn max_users(&self) -> usize {
        match self {
            Self::Single => 1,
            Self::Team => MAX_TEAM_SIZE,
        }
    }
}

impl std::fmt::Display for RegistrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Single => "single",
            Self::Team => "team",
        };
        write!(f, "{s}")
    }
}

/// The field currently being collected.
///
/// Progresses FirstName → LastName → Age → PhoneNumber, then either
/// AwaitingMore (team with room left) or finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    FirstName,
    LastName,
    Age,
    PhoneNumber,
    AwaitingMore,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Age => "age",
            Self::PhoneNumber => "phone_number",
            Self::AwaitingMore => "awaiting_more",
        };
        write!(f, "{s}")
    }
}

/// An in-progress registration: the session aggregate.
///
/// `users` is never empty and `current_user_index` always points into it.
/// Fields are private so the invariants can only change through the
/// methods below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    registration_type: RegistrationType,
    users: Vec<UserData>,
    current_step: Step,
    current_user_index: usize,
}

impl Registration {
    /// Start a registration with one empty participant at `FirstName`.
    pub fn new(registration_type: RegistrationType) -> Self {
        Self {
            registration_type,
            users: vec![UserData::default()],
            current_step: Step::FirstName,
            current_user_index: 0,
        }
    }

    pub fn registration_type(&self) -> RegistrationType {
        self.registration_type
    }

    pub fn users(&self) -> &[UserData] {
        &self.users
    }

    pub fn current_step(&self) -> Step {
        self.current_step
    }

    pub fn current_user_index(&self) -> usize {
        self.current_user_index
    }

    /// 1-based number of the participant being filled in.
    pub fn participant_number(&self) -> usize {
        self.current_user_index + 1
    }

    /// The participant currently being filled in.
    ///
    /// # Panics
    ///
    /// Panics if the index invariant is broken. That is a bug in this
    /// module, never a user error.
    pub fn current_user(&self) -> &UserData {
        self.users.get(self.current_user_index).unwrap_or_else(|| {
            panic!(
                "registration invariant violated: current_user_index {} >= {} users",
                self.current_user_index,
                self.users.len()
            )
        })
    }

    /// Mutable access to the participant currently being filled in.
    ///
    /// # Panics
    ///
    /// Same contract as [`Registration::current_user`].
    pub fn current_user_mut(&mut self) -> &mut UserData {
        let len = self.users.len();
        let index = self.current_user_index;
        self.users.get_mut(index).unwrap_or_else(|| {
            panic!("registration invariant violated: current_user_index {index} >= {len} users")
        })
    }

    /// Whether another participant may still be added.
    pub fn has_room(&self) -> bool {
        self.users.len() < self.registration_type.max_users()
    }

    /// Whether `phone` was already entered by another participant of this
    /// session. The participant currently being filled in is excluded so a
    /// retried finalization can resend the same number.
    pub fn phone_used_by_other(&self, phone: &str) -> bool {
        self.users
            .iter()
            .enumerate()
            .any(|(i, u)| i != self.current_user_index && u.phone_number == phone)
    }

    pub(crate) fn set_step(&mut self, step: Step) {
        debug_assert!(
            step != Step::AwaitingMore || self.registration_type == RegistrationType::Team,
            "AwaitingMore is only reachable for team registrations"
        );
        self.current_step = step;
    }

    /// Append an empty participant and make it current.
    ///
    /// Returns `false` (and changes nothing) if the team is already full.
    pub(crate) fn add_user(&mut self) -> bool {
        if !self.has_room() {
            return false;
        }
        self.users.push(UserData::default());
        self.current_user_index = self.users.len() - 1;
        self.current_step = Step::FirstName;
        true
    }
}
