//! Regibot — Telegram event registration bot.

pub mod channels;
pub mod config;
pub mod error;
pub mod registration;
pub mod store;
