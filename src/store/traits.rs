//! `RegistrationStore` trait — the persistence interface the bot relies on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::registration::UserData;

/// A participant ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
    pub phone_number: String,
    /// Shared by all members of one team registration; `None` for singles.
    pub team_id: Option<String>,
}

impl NewUser {
    pub fn from_user_data(user: &UserData, team_id: Option<&str>) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            age: user.age,
            phone_number: user.phone_number.clone(),
            team_id: team_id.map(String::from),
        }
    }
}

/// A persisted participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
    pub phone_number: String,
    pub team_id: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Durable table of finalized registrations.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Insert one participant, returning its id.
    ///
    /// Fails with `DatabaseError::Constraint` if the phone number is
    /// already registered.
    async fn insert_user(&self, user: &NewUser) -> Result<i64, DatabaseError>;

    /// Insert several participants in order, all or nothing.
    async fn insert_users(&self, users: &[NewUser]) -> Result<Vec<i64>, DatabaseError>;

    /// Number of persisted participants with this phone number (0 or 1).
    async fn count_by_phone(&self, phone_number: &str) -> Result<i64, DatabaseError>;

    /// Members of a team, in insertion order.
    async fn team_members(&self, team_id: &str) -> Result<Vec<RegisteredUser>, DatabaseError>;

    /// Total number of persisted participants.
    async fn count_users(&self) -> Result<i64, DatabaseError>;
}
