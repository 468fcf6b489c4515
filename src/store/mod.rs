//! Persistence layer — libSQL-backed registration store.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{NewUser, RegisteredUser, RegistrationStore};
