//! Step engine — pure transition logic for one registration session.
//!
//! The engine never touches the store or the gateway. The one fact it needs
//! from outside (whether a phone number is already persisted) is looked up
//! by the dispatcher beforehand and passed in.

use crate::channels::{Keyboard, OutgoingMessage};

use super::command::Command;
use super::model::{Registration, Step};
use super::prompts;

/// Why an answer was refused. The step does not advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidAge,
    PhoneTaken,
}

/// Side effect the dispatcher must apply after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// All data collected: persist every participant, then drop the session.
    PersistAll,
    Reject(RejectReason),
}

/// Outcome of feeding one answer to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub registration: Registration,
    pub effect: Effect,
    /// Next message for the user. `None` for `PersistAll`, whose reply
    /// depends on whether persistence succeeds.
    pub reply: Option<OutgoingMessage>,
}

/// Canonical form of an answer: surrounding whitespace removed.
pub fn normalize(input: &str) -> &str {
    input.trim()
}

/// Prompt for the step the registration is currently on.
pub fn current_prompt(registration: &Registration) -> OutgoingMessage {
    let text = prompts::step_prompt(
        registration.registration_type(),
        registration.current_step(),
        registration.participant_number(),
    );
    match registration.current_step() {
        Step::AwaitingMore => OutgoingMessage::new(text).with_keyboard(Keyboard::YesNo),
        _ => OutgoingMessage::new(text).with_keyboard(Keyboard::Remove),
    }
}

/// Apply one answer to `registration`.
///
/// `phone_registered` must be true when the (normalized) input already
/// exists in the Registration Store; it is only consulted at `PhoneNumber`.
pub fn transition(
    mut registration: Registration,
    input: &str,
    phone_registered: bool,
) -> Transition {
    let input = normalize(input);

    match registration.current_step() {
        Step::FirstName => {
            registration.current_user_mut().first_name = input.to_string();
            advance(registration, Step::LastName)
        }
        Step::LastName => {
            registration.current_user_mut().last_name = input.to_string();
            advance(registration, Step::Age)
        }
        Step::Age => match input.parse::<u32>() {
            Ok(age) => {
                registration.current_user_mut().age = age;
                advance(registration, Step::PhoneNumber)
            }
            Err(_) => reject(registration, RejectReason::InvalidAge, prompts::INVALID_AGE),
        },
        Step::PhoneNumber => {
            if phone_registered || registration.phone_used_by_other(input) {
                return reject(registration, RejectReason::PhoneTaken, prompts::PHONE_TAKEN);
            }
            registration.current_user_mut().phone_number = input.to_string();
            if registration.has_room() {
                advance(registration, Step::AwaitingMore)
            } else {
                finalize(registration)
            }
        }
        Step::AwaitingMore => {
            if Command::parse(input) == Command::Yes && registration.add_user() {
                let reply = current_prompt(&registration);
                Transition {
                    registration,
                    effect: Effect::None,
                    reply: Some(reply),
                }
            } else {
                finalize(registration)
            }
        }
    }
}

fn advance(mut registration: Registration, next: Step) -> Transition {
    registration.set_step(next);
    let reply = current_prompt(&registration);
    Transition {
        registration,
        effect: Effect::None,
        reply: Some(reply),
    }
}

fn reject(registration: Registration, reason: RejectReason, text: &str) -> Transition {
    Transition {
        registration,
        effect: Effect::Reject(reason),
        reply: Some(OutgoingMessage::new(text)),
    }
}

/// Step is left unchanged so that resending the last answer re-triggers
/// finalization if persistence fails.
fn finalize(registration: Registration) -> Transition {
    Transition {
        registration,
        effect: Effect::PersistAll,
        reply: None,
    }
}
