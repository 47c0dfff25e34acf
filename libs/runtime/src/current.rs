use std::cell::Cell;

thread_local! {
    static CURRENT: Cell<Option<CurrentTask>> = const { Cell::new(None) };
}

/// A snapshot of which logical thread and method is currently executing.
///
/// Unlike the global mutable "current task" pointer this replaces, there's no raw pointer
/// here: a method under test that wants to know "which thread am I" (e.g. to pick a
/// thread-distinct value to push) gets a cheap, owned copy instead of a borrow it could
/// hold past the task's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct CurrentTask {
    /// Index of the logical thread driving this task, in `0..threads`.
    pub thread_index: usize,
    /// Name of the method currently on top of the stack.
    pub task_name: &'static str,
}

/// Returns the task currently executing on this OS thread, if the scheduler has one set.
///
/// Only meaningful when called from inside a method under test; outside of a
/// [`StackfulTask::resume`](crate::StackfulTask::resume) call this is always `None`.
#[must_use]
pub fn current_task() -> Option<CurrentTask> {
    CURRENT.with(Cell::get)
}

/// RAII guard restoring the previous current task when dropped.
#[must_use = "the current task is restored when this guard is dropped"]
pub struct CurrentTaskGuard {
    prev: Option<CurrentTask>,
}

impl Drop for CurrentTaskGuard {
    fn drop(&mut self) {
        CURRENT.with(|cell| cell.set(self.prev));
    }
}

/// Sets the current task for the duration of the returned guard.
///
/// The scheduler calls this immediately before each [`StackfulTask::resume`](crate::StackfulTask::resume)
/// and lets the guard drop right after, so the thread-local only ever reflects whichever
/// task is actively running.
pub fn set_current_task(task: CurrentTask) -> CurrentTaskGuard {
    let prev = CURRENT.with(|cell| cell.replace(Some(task)));
    CurrentTaskGuard { prev }
}

#[cfg(test)]
mod tests {
    use super::{CurrentTask, current_task, set_current_task};

    #[test]
    fn unset_by_default() {
        assert!(current_task().is_none());
    }

    #[test]
    fn set_is_visible_until_guard_drops() {
        {
            let _guard = set_current_task(CurrentTask { thread_index: 3, task_name: "push" });
            let current = current_task().unwrap();
            assert_eq!(current.thread_index, 3);
            assert_eq!(current.task_name, "push");
        }
        assert!(current_task().is_none());
    }

    #[test]
    fn nested_guards_restore_the_outer_value() {
        let _outer = set_current_task(CurrentTask { thread_index: 0, task_name: "outer" });
        {
            let _inner = set_current_task(CurrentTask { thread_index: 1, task_name: "inner" });
            assert_eq!(current_task().unwrap().task_name, "inner");
        }
        assert_eq!(current_task().unwrap().task_name, "outer");
    }
}
