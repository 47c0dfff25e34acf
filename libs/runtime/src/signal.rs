use std::cell::Cell;

use value_box::ValueBox;

use crate::task::Task;

/// The three reasons a task's fiber can suspend itself.
///
/// These are the only suspension points `runtime` knows about; everything else a method
/// under test does is ordinary, non-suspending Rust code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A voluntary yield: give the scheduler a chance to interleave another thread here.
    Yield,
    /// The task parked itself on a token and must not be resumed until unparked.
    Park,
    /// The task is calling another annotated method and needs the scheduler to push a
    /// child [`Task`](crate::task::Task) onto its stack before it can make progress.
    SpawnChild,
}

/// Per-fiber scratch state, stored at the top of the fiber's own stack (see
/// [`fiber::Fiber::fiber_local`]) so it stays at a stable address regardless of where the
/// owning [`Task`](crate::task::Task) itself lives.
///
/// This is how [`crate::Ctx::call`] hands a child-building closure to the task's driver
/// without either side needing a raw pointer back to the other.
#[derive(Default)]
pub struct TaskLocal {
    pub(crate) child_slot: Cell<Option<Box<dyn FnOnce() -> Task>>>,
    pub(crate) last_child_return: Cell<Option<ValueBox>>,
}
