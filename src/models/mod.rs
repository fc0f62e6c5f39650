//! Data models for the measures tracker.
//!
//! Reference data (classes, rosters, catalog), per-student state and write actions.

mod action;
mod catalog;
mod state;

pub use action::*;
pub use catalog::*;
pub use state::*;
