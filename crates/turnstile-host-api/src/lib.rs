//! Command executor interfaces for turnstile
//!
//! This crate defines the seam between the admission pipeline and whatever
//! actually runs an accepted command. It contains no platform code itself.

mod dry_run;
mod mock;
mod output;
mod traits;

pub use dry_run::*;
pub use mock::*;
pub use output::*;
pub use traits::*;
