use value_box::ValueBox;

use crate::child_slab::ChildSlab;
use crate::task::{Task, TaskPoll};

/// The outcome of resuming a [`StackfulTask`] for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackfulPoll {
    /// The top of the stack yielded voluntarily.
    Yielded,
    /// The top of the stack parked on a token.
    Parked,
    /// The top of the stack called a nested method; a child was pushed and the stack
    /// should be resumed again to drive it.
    ChildSpawned,
    /// A child call returned into its parent; the stack should be resumed again to let
    /// the parent continue.
    ChildReturned,
    /// The root task returned; this stackful task is finished.
    Returned,
    /// Whichever frame was on top of the stack panicked; this stackful task is now done
    /// (every remaining frame, if any, is left unresolved and must be terminated rather
    /// than resumed).
    Panicked(String),
}

/// One logical thread's sequence of nested method calls.
///
/// A stackful task starts as a single root [`Task`]. Whenever the currently-running task
/// calls another annotated method (via [`crate::Ctx::call`]), a child `Task` is pushed onto
/// this stack and becomes the new target of [`StackfulTask::resume`]; when that child
/// returns, it's popped and its return value is handed back to the task now on top. Each
/// [`Task`] is individually boxed so its address is stable even as this stack grows and
/// shrinks, matching the "children must not move while their fiber is live" invariant
/// (only [`Task::fiber_local`] storage actually depends on this, but boxing keeps the
/// invariant visible at the type level too).
pub struct StackfulTask {
    root: Box<Task>,
    children: ChildSlab,
}

impl StackfulTask {
    /// Wraps `root` as a fresh, not-yet-started stackful task.
    #[must_use]
    pub fn new(root: Task) -> Self {
        Self {
            root: Box::new(root),
            children: ChildSlab::new(),
        }
    }

    /// The name of whichever task is currently on top of the stack.
    #[must_use]
    pub fn current_name(&self) -> &'static str {
        self.top_ref().name()
    }

    /// Depth of the call stack: 0 while only the root task is active.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.children.len()
    }

    /// The suspension budget hint of whichever task is currently on top of the stack.
    #[must_use]
    pub fn current_suspension_budget_hint(&self) -> usize {
        self.top_ref().suspension_budget_hint()
    }

    fn top_ref(&self) -> &Task {
        self.children.last().unwrap_or(self.root.as_ref())
    }

    fn top_mut(&mut self) -> &mut Task {
        self.children.last_mut().map_or(self.root.as_mut(), |b| b.as_mut())
    }

    /// Whether the root task has returned, i.e. this whole unit is finished.
    ///
    /// By construction a child is always popped as soon as it returns (see
    /// [`StackfulTask::resume`]), so the root can only be the active task once `children`
    /// is empty; "root returned" and "stackful task finished" therefore coincide.
    #[must_use]
    pub fn is_returned(&self) -> bool {
        self.root.is_returned()
    }

    /// The final return value, once [`StackfulTask::is_returned`] is `true`.
    #[must_use]
    pub fn return_value(&self) -> Option<&ValueBox> {
        self.root.return_value()
    }

    /// Whether the stackful task's own token (the root task's token) is parked.
    ///
    /// This is distinct from [`StackfulTask::is_blocked`]: a deeply nested child can be
    /// parked on its own token without the root's token being touched at all.
    #[must_use]
    pub fn is_parked(&self) -> bool {
        self.root.is_parked()
    }

    /// Whether the scheduler must not resume this stackful task right now.
    ///
    /// True whenever whichever task is currently on top of the stack is parked, since
    /// that's the task an actual [`StackfulTask::resume`] call would drive next.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.top_ref().is_parked()
    }

    /// Resumes exactly one step: the task on top of the stack is resumed once, and any
    /// resulting child-spawn or child-return bookkeeping is applied.
    ///
    /// # Panics
    ///
    /// Panics if this stackful task has already returned.
    pub fn resume(&mut self) -> StackfulPoll {
        assert!(!self.is_returned(), "resumed a stackful task that has already returned");

        match self.top_mut().resume() {
            TaskPoll::Yielded => StackfulPoll::Yielded,
            TaskPoll::Parked => StackfulPoll::Parked,
            TaskPoll::Panicked(message) => StackfulPoll::Panicked(message),
            TaskPoll::SpawnedChild => {
                let build = self
                    .top_mut()
                    .take_child_builder()
                    .expect("SpawnChild yield without a pending child builder");
                self.children.push(build());
                StackfulPoll::ChildSpawned
            }
            TaskPoll::Returned => {
                let value = self
                    .top_mut()
                    .return_value()
                    .cloned()
                    .expect("a just-returned task always has a return value");

                if self.children.pop().is_some() {
                    self.top_mut().set_last_child_return(value);
                    StackfulPoll::ChildReturned
                } else {
                    StackfulPoll::Returned
                }
            }
        }
    }

    /// Returns a fresh stackful task restarting from the root's own [`Task::restart`], with
    /// no children.
    ///
    /// A stackful task's persistent identity — the name, arguments, and token Testable
    /// Property #2 requires to survive a restart — lives entirely on the root; any children
    /// pushed during the finished run are nested calls that belong to that run, not to the
    /// unit's identity, so they aren't carried forward.
    ///
    /// # Panics
    ///
    /// Panics if this stackful task has not returned (delegates to [`Task::restart`]'s own
    /// precondition on the root).
    #[must_use]
    pub fn restart(&self) -> StackfulTask {
        StackfulTask {
            root: Box::new(self.root.restart()),
            children: ChildSlab::new(),
        }
    }

    /// Abandons this stackful task and every frame on it, bottom to top.
    ///
    /// Used by the scheduler when a round's step budget is exhausted: the round's history
    /// is discarded and every live task is terminated rather than driven to completion.
    pub fn terminate(self) {
        for child in self.children {
            child.terminate();
        }
        self.root.terminate();
    }
}

impl std::fmt::Debug for StackfulTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackfulTask")
            .field("current", &self.current_name())
            .field("depth", &self.depth())
            .field("returned", &self.is_returned())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{StackfulPoll, StackfulTask};
    use crate::task::Task;
    use value_box::ValueBox;

    #[test]
    fn a_task_with_no_children_returns_directly() {
        let mut st = StackfulTask::new(Task::new("root", ValueBox::void(), vec![], 0, None, |_ctx| ValueBox::new(1_i32)));
        assert_eq!(st.resume(), StackfulPoll::Returned);
        assert!(st.is_returned());
        assert_eq!(st.return_value().unwrap().get::<i32>(), Some(&1));
    }

    #[test]
    fn nested_call_pushes_and_pops_a_child() {
        let mut st = StackfulTask::new(Task::new("root", ValueBox::void(), vec![], 1, None, |ctx| {
            let child_result: i32 =
                ctx.call(|| Task::new("child", ValueBox::void(), vec![], 0, None, |_ctx| ValueBox::new(41_i32)));
            ValueBox::new(child_result + 1)
        }));

        assert_eq!(st.resume(), StackfulPoll::ChildSpawned);
        assert_eq!(st.depth(), 1);
        assert_eq!(st.current_name(), "child");

        assert_eq!(st.resume(), StackfulPoll::ChildReturned);
        assert_eq!(st.depth(), 0);
        assert_eq!(st.current_name(), "root");

        assert_eq!(st.resume(), StackfulPoll::Returned);
        assert_eq!(st.return_value().unwrap().get::<i32>(), Some(&42));
    }

    #[test]
    fn restart_produces_a_fresh_unstarted_stack_with_no_children() {
        let mut st = StackfulTask::new(Task::new("root", ValueBox::new(5_i32), vec!["5".to_string()], 1, None, |ctx| {
            let child_result: i32 =
                ctx.call(|| Task::new("child", ValueBox::void(), vec![], 0, None, |_ctx| ValueBox::new(1_i32)));
            ValueBox::new(child_result)
        }));

        assert_eq!(st.resume(), StackfulPoll::ChildSpawned);
        assert_eq!(st.resume(), StackfulPoll::ChildReturned);
        assert_eq!(st.resume(), StackfulPoll::Returned);

        let mut restarted = st.restart();
        assert_eq!(restarted.current_name(), "root");
        assert_eq!(restarted.depth(), 0);
        assert!(!restarted.is_returned());

        assert_eq!(restarted.resume(), StackfulPoll::ChildSpawned);
        assert_eq!(restarted.resume(), StackfulPoll::ChildReturned);
        assert_eq!(restarted.resume(), StackfulPoll::Returned);
        assert_eq!(restarted.return_value().unwrap().get::<i32>(), Some(&1));
    }

    #[test]
    #[should_panic(expected = "has not returned")]
    fn restarting_a_not_yet_returned_stack_panics() {
        let st = StackfulTask::new(Task::new("root", ValueBox::void(), vec![], 0, None, |ctx| {
            ctx.yield_now();
            ValueBox::void()
        }));
        let _ = st.restart();
    }

    #[test]
    fn a_panic_in_a_nested_child_is_reported_at_the_stack_level() {
        let mut st = StackfulTask::new(Task::new("root", ValueBox::void(), vec![], 1, None, |ctx| {
            let _: i32 = ctx.call(|| Task::new("child", ValueBox::void(), vec![], 0, None, |_ctx| panic!("oops")));
            ValueBox::void()
        }));

        assert_eq!(st.resume(), StackfulPoll::ChildSpawned);
        match st.resume() {
            StackfulPoll::Panicked(message) => assert!(message.contains("oops")),
            other => panic!("expected Panicked, got {other:?}"),
        }
    }
}
