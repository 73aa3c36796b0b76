//! # lmctfy Common
//!
//! Shared utilities for the lmctfy offline worker crates.
//!
//! Currently this is just logging configuration and setup; every binary in
//! the workspace initializes `tracing` through [`init_logging`] so the
//! worker crates only ever emit events and never install a subscriber
//! themselves.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
