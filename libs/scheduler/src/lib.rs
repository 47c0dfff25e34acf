//! Target registration and the round runner that drives a [`RoundSetup`] to completion (or
//! abortion) and records the resulting [`History`](history::History).
//!
//! Deliberately has no dependency on the checker crate: a round's history is handed back to
//! the caller, which decides what to do with it (feed it to a checker, discard it, log it).
//! That orchestration lives one layer up, in `concheck`.

mod budget;
mod builder;
mod error;
mod policy;
mod round;

pub use budget::Budget;
pub use builder::{sample_programs, MethodBuilder, RoundSetup, TargetFactory};
pub use error::{RoundAborted, RoundError, TargetPanicked};
pub use policy::{SchedulePolicy, UniformRandom};
pub use round::run_round;
