//! Registration flow — per-chat state machine, sessions and dispatch.

pub mod command;
pub mod dispatcher;
pub mod engine;
pub mod model;
pub mod prompts;
pub mod session;

pub use command::Command;
pub use dispatcher::Dispatcher;
pub use engine::{Effect, RejectReason, Transition};
pub use model::{MAX_TEAM_SIZE, Registration, RegistrationType, Step, UserData};
pub use session::{ConversationId, SessionTable};
