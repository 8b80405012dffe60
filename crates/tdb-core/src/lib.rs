//! Core domain + application logic for the Telegram download bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the media
//! fetch engine live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod fetch;
pub mod job;
pub mod limiter;
pub mod logging;
pub mod messaging;
pub mod pool;

pub use errors::{Error, Result};
