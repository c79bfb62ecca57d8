//! Linux command executor for turnstile
//!
//! Provides:
//! - Shell execution with process group isolation
//! - A scrubbed environment for every child
//! - Wall-clock timeouts that kill the whole process group
//! - Bounded stdout/stderr capture

mod executor;
mod process;

pub use executor::*;
pub use process::*;
