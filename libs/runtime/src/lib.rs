//! Task, stackful task and token primitives: the resumable-unit layer the scheduler drives.
//!
//! A method under test runs inside a [`Task`], a single [`fiber::Fiber`] specialized to
//! yield a [`Signal`] and return a type-erased [`value_box::ValueBox`]. Nested calls to
//! other annotated methods are represented as a flat stack of `Task`s inside one
//! [`StackfulTask`] rather than as nested fibers: there is exactly one logical thread of
//! control per `StackfulTask`, and [`Ctx::call`] is the explicit stand-in for the
//! compiler-inserted suspension point a source rewrite would otherwise insert at every
//! such call.

mod child_slab;
mod current;
mod signal;
mod stackful;
mod task;
mod token;

pub use child_slab::ChildSlab;
pub use current::{CurrentTask, CurrentTaskGuard, current_task, set_current_task};
pub use signal::{Signal, TaskLocal};
pub use stackful::{StackfulPoll, StackfulTask};
pub use task::{Ctx, PreconditionError, Task, TaskPoll};
pub use token::Token;
