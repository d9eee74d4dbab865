//! # Cellar Common Library
//!
//! Shared code for the Cellar services including:
//! - Error types
//! - Bootstrap configuration loading and root folder resolution
//! - Clock abstraction for time-windowed logic

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, ManualClock, SystemClock};
