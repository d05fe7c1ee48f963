//! Application configuration and constants.
//!
//! This module provides:
//! - Pipeline constants (queue sizes, worker counts, timeouts)
//! - Configuration types shared by the two binaries

mod constants;
mod types;

pub use constants::*;
pub use types::{LogFormat, LogLevel};
