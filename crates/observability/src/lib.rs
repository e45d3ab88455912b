//! Tracing/logging setup shared by every shopfloor process.

pub mod subscriber;

pub use subscriber::{LogFormat, init, init_for_tests, init_with};
