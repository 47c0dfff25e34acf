use std::rc::Rc;

use fiber::stack::DefaultFiberStack;
use fiber::{Fiber, FiberResult, Suspend};
use value_box::ValueBox;

use crate::signal::{Signal, TaskLocal};
use crate::token::Token;

/// Fatal violations of the task driving protocol.
///
/// These can only be produced by a broken driver (scheduler or checker bug), never by a
/// method under test, so every one of them is surfaced as a panic rather than a `Result`.
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    /// [`Task::resume`] was called again after the task had already returned.
    #[error("resumed a task that has already returned")]
    AlreadyReturned,
    /// The scheduler drove a [`Signal::SpawnChild`] yield to completion without ever
    /// storing a return value back into the parent's [`TaskLocal`] slot.
    #[error("child task protocol violated: no return value was handed back to the parent")]
    MissingChildReturn,
    /// [`Task::restart`] was called on a task that has not yet returned.
    #[error("restarted a task that has not returned")]
    RestartOfNonReturnedTask,
}

/// The handle a running method body uses to suspend itself.
///
/// Borrowed from the fiber's own [`Suspend`] and [`TaskLocal`], both of which live at a
/// stable address inside the fiber's stack for as long as the fiber exists, so holding a
/// `Ctx` across yields is sound even though the owning [`Task`] may itself move.
pub struct Ctx<'a> {
    suspend: &'a Suspend<(), Signal>,
    local: &'a TaskLocal,
}

impl<'a> Ctx<'a> {
    fn new(suspend: &'a Suspend<(), Signal>, local: &'a TaskLocal) -> Self {
        Self { suspend, local }
    }

    /// Suspends with the given signal, discarding the resumed `()` input.
    pub(crate) fn suspend(&self, signal: Signal) {
        self.suspend.suspend(signal);
    }

    /// Voluntarily yields, giving the scheduler a chance to interleave another thread.
    pub fn yield_now(&self) {
        self.suspend(Signal::Yield);
    }

    /// Calls another annotated method as a nested invocation.
    ///
    /// This is the explicit stand-in for the compiler-inserted suspension point that a
    /// source-to-source rewrite would otherwise insert at every call to an annotated
    /// method: it stashes `build` (a thunk that constructs the child [`Task`]) into this
    /// task's fiber-local slot, yields [`Signal::SpawnChild`], and on resume reads back the
    /// value the scheduler placed in the same slot once the child task returned.
    ///
    /// # Panics
    ///
    /// Panics if the scheduler resumes this task after a `SpawnChild` yield without first
    /// writing the child's return value into the fiber-local slot (a scheduler bug).
    pub fn call<R: Clone + 'static>(&self, build: impl FnOnce() -> Task + 'static) -> R {
        self.local.child_slot.set(Some(Box::new(build)));
        self.suspend(Signal::SpawnChild);

        let value = self
            .local
            .last_child_return
            .take()
            .unwrap_or_else(|| panic!("{}", PreconditionError::MissingChildReturn));
        value
            .get::<R>()
            .cloned()
            .expect("child task returned a value of the wrong type")
    }
}

/// A single resumable method invocation.
///
/// `Task` wraps a [`Fiber`] specialized to take no resume input, yield a [`Signal`], and
/// return a type-erased [`ValueBox`]. It corresponds to one call frame of a stackful task:
/// the root call, or one of its nested annotated-method calls.
pub struct Task {
    name: &'static str,
    args: ValueBox,
    rendered_args: Vec<String>,
    token: Option<Token>,
    suspension_budget_hint: usize,
    ret: Option<ValueBox>,
    returned: bool,
    /// The method body, kept around (not just consumed into the fiber) so [`Task::restart`]
    /// can build a fresh fiber from the same builder inputs without the caller having to
    /// remember how this task was originally constructed.
    entry: Rc<dyn Fn(Ctx<'_>) -> ValueBox>,
    fiber: Fiber<(), Signal, ValueBox, TaskLocal, DefaultFiberStack>,
}

impl Task {
    /// Builds a new, not-yet-started task.
    ///
    /// `args` is the method's typed argument payload, boxed the same way a return value
    /// is: the checker's method table applies it to the reference specification's
    /// matching entry. `rendered_args` is the same arguments already rendered to display
    /// strings, kept separately since the history recorder only ever needs the rendering.
    /// `suspension_budget_hint` is the number of suspension points the method is expected
    /// to use; the scheduler folds it into its step budget (see `scheduler::Budget`).
    ///
    /// `entry` must be callable more than once (`Fn`, not `FnOnce`): a task built from it
    /// may later be [`restart`](Task::restart)ed, which re-invokes the same body against a
    /// fresh fiber.
    pub fn new<F>(
        name: &'static str,
        args: ValueBox,
        rendered_args: Vec<String>,
        suspension_budget_hint: usize,
        token: Option<Token>,
        entry: F,
    ) -> Self
    where
        F: Fn(Ctx<'_>) -> ValueBox + 'static,
    {
        let entry: Rc<dyn Fn(Ctx<'_>) -> ValueBox> = Rc::new(entry);
        let fiber = build_fiber(entry.clone());

        Self {
            name,
            args,
            rendered_args,
            token,
            suspension_budget_hint,
            ret: None,
            returned: false,
            entry,
            fiber,
        }
    }

    /// Returns a fresh task with the same name, arguments, token, and method body as this
    /// one, reset to method entry with an empty return slot.
    ///
    /// This is the task-level restart operation: the identity that survives a restart is
    /// the builder inputs (name, rendered arguments, typed arguments, token) and the method
    /// body itself, not any state the previous run accumulated inside the fiber.
    ///
    /// # Panics
    ///
    /// Panics if this task has not returned.
    #[must_use]
    pub fn restart(&self) -> Task {
        assert!(self.returned, "{}", PreconditionError::RestartOfNonReturnedTask);

        Task {
            name: self.name,
            args: self.args.clone(),
            rendered_args: self.rendered_args.clone(),
            token: self.token.clone(),
            suspension_budget_hint: self.suspension_budget_hint,
            ret: None,
            returned: false,
            entry: self.entry.clone(),
            fiber: build_fiber(self.entry.clone()),
        }
    }

    /// The registered name of the method this task is running.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The method's typed argument payload, as handed to the checker's method table.
    #[must_use]
    pub fn args(&self) -> &ValueBox {
        &self.args
    }

    /// The method's arguments, already rendered to display strings.
    #[must_use]
    pub fn rendered_args(&self) -> &[String] {
        &self.rendered_args
    }

    /// The suspension-point budget hint this task was built with.
    #[must_use]
    pub fn suspension_budget_hint(&self) -> usize {
        self.suspension_budget_hint
    }

    /// Whether this task has returned.
    #[must_use]
    pub fn is_returned(&self) -> bool {
        self.returned
    }

    /// Whether this task is currently parked on its token.
    #[must_use]
    pub fn is_parked(&self) -> bool {
        self.token.as_ref().is_some_and(Token::is_parked)
    }

    /// The value this task returned, if it has.
    #[must_use]
    pub fn return_value(&self) -> Option<&ValueBox> {
        self.ret.as_ref()
    }

    /// Resumes this task's fiber for one step.
    ///
    /// A panic inside the method body (e.g. a failed assertion in the target under test) is
    /// caught here rather than left to unwind across the fiber-switch boundary into the
    /// scheduler: the fiber's own `may_unwind` plumbing (see `fiber`'s architecture modules)
    /// lets the unwind cross back into this call, where [`std::panic::catch_unwind`] turns
    /// it into [`TaskPoll::Panicked`] instead of a raw process panic.
    ///
    /// # Panics
    ///
    /// Panics if the task has already returned.
    pub fn resume(&mut self) -> TaskPoll {
        assert!(!self.returned, "{}", PreconditionError::AlreadyReturned);

        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.fiber.resume(()))) {
            Ok(FiberResult::Yield(Signal::Yield)) => TaskPoll::Yielded,
            Ok(FiberResult::Yield(Signal::Park)) => TaskPoll::Parked,
            Ok(FiberResult::Yield(Signal::SpawnChild)) => TaskPoll::SpawnedChild,
            Ok(FiberResult::Return(value)) => {
                self.ret = Some(value);
                self.returned = true;
                TaskPoll::Returned
            }
            Err(payload) => {
                self.returned = true;
                TaskPoll::Panicked(panic_message(&payload))
            }
        }
    }

    /// Takes the pending child-building thunk left by [`Ctx::call`], if any.
    pub(crate) fn take_child_builder(&self) -> Option<Box<dyn FnOnce() -> Task>> {
        self.fiber.fiber_local().child_slot.take()
    }

    /// Hands a completed child's return value back to this (now top-of-stack) task.
    pub(crate) fn set_last_child_return(&self, value: ValueBox) {
        self.fiber.fiber_local().last_child_return.set(Some(value));
    }

    /// Abandons this task, used when the scheduler aborts a round (e.g. budget exhaustion).
    ///
    /// The adopted fiber implementation doesn't support unwinding a suspended stack (see
    /// `fiber::Fiber::force_unwind`, never finished upstream), so this can't run drop glue
    /// for locals still alive inside the method body — any such state is leaked. Registered
    /// methods in this project only ever hold `Copy`/`Clone` locals across suspension
    /// points, so that leak is empty in practice; it's called out here because it would
    /// matter for a method that parked while holding a `Box` or similar.
    pub fn terminate(mut self) {
        if !self.fiber.done() {
            // Safety: no live locals requiring drop are expected to be on a registered
            // method's stack at a suspension point (see doc comment above).
            unsafe {
                self.fiber.force_reset();
            }
        }
    }
}

/// Builds a fresh fiber whose body re-invokes `entry`, shared so both [`Task::new`] and
/// [`Task::restart`] wire up the stack-switch plumbing identically.
fn build_fiber(entry: Rc<dyn Fn(Ctx<'_>) -> ValueBox>) -> Fiber<(), Signal, ValueBox, TaskLocal, DefaultFiberStack> {
    let stack = DefaultFiberStack::default();
    Fiber::with_stack_and_local(stack, TaskLocal::default(), move |(), suspend, local| entry(Ctx::new(suspend, local)))
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("returned", &self.returned)
            .field("parked", &self.is_parked())
            .finish()
    }
}

/// The outcome of resuming a [`Task`] for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll {
    /// The task yielded voluntarily and can be resumed again right away.
    Yielded,
    /// The task parked; it must not be resumed until its token is unparked.
    Parked,
    /// The task is calling a nested method; the scheduler must push a child task before
    /// resuming this one again.
    SpawnedChild,
    /// The task returned.
    Returned,
    /// The method body panicked; the task is now done and must not be resumed again.
    Panicked(String),
}

/// Renders a caught panic payload to a human-readable message, the way `std`'s default
/// panic hook extracts one for its own report.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "target method panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{Task, TaskPoll};
    use value_box::ValueBox;

    #[test]
    fn a_task_with_no_suspension_points_returns_immediately() {
        let mut task = Task::new("noop", ValueBox::void(), vec![], 0, None, |_ctx| ValueBox::new(42_i32));
        assert_eq!(task.resume(), TaskPoll::Returned);
        assert_eq!(task.return_value().unwrap().get::<i32>(), Some(&42));
    }

    #[test]
    fn yield_now_suspends_exactly_once_per_call() {
        let mut task = Task::new("yields_twice", ValueBox::void(), vec![], 2, None, |ctx| {
            ctx.yield_now();
            ctx.yield_now();
            ValueBox::void()
        });

        assert_eq!(task.resume(), TaskPoll::Yielded);
        assert_eq!(task.resume(), TaskPoll::Yielded);
        assert_eq!(task.resume(), TaskPoll::Returned);
    }

    #[test]
    #[should_panic(expected = "already returned")]
    fn resuming_a_returned_task_panics() {
        let mut task = Task::new("noop", ValueBox::void(), vec![], 0, None, |_ctx| ValueBox::void());
        assert_eq!(task.resume(), TaskPoll::Returned);
        let _ = task.resume();
    }

    #[test]
    fn terminating_a_parked_task_does_not_panic() {
        let task = Task::new("spins_forever", ValueBox::void(), vec![], 0, None, |ctx| {
            loop {
                ctx.yield_now();
            }
        });
        task.terminate();
    }

    #[test]
    fn a_panicking_method_body_is_caught_and_reported() {
        let mut task = Task::new("buggy", ValueBox::void(), vec![], 0, None, |_ctx| {
            panic!("assertion failed: bad target state")
        });
        match task.resume() {
            TaskPoll::Panicked(message) => assert!(message.contains("bad target state")),
            other => panic!("expected Panicked, got {other:?}"),
        }
        assert!(task.is_returned(), "a panicked task must not be resumable again");
    }

    #[test]
    fn rendered_args_are_exposed() {
        let task = Task::new("add", ValueBox::new(1_i32), vec!["1".to_string()], 0, None, |_ctx| ValueBox::void());
        assert_eq!(task.rendered_args(), ["1".to_string()]);
    }

    #[test]
    fn restart_yields_a_fresh_task_with_the_same_name_and_arguments() {
        let mut task = Task::new("add", ValueBox::new(1_i32), vec!["1".to_string()], 0, None, |ctx| {
            ctx.yield_now();
            ValueBox::new(7_i32)
        });

        assert_eq!(task.resume(), TaskPoll::Yielded);
        assert_eq!(task.resume(), TaskPoll::Returned);

        let mut restarted = task.restart();
        assert_eq!(restarted.name(), task.name());
        assert_eq!(restarted.rendered_args(), task.rendered_args());
        assert_eq!(restarted.args().get::<i32>(), task.args().get::<i32>());
        assert!(!restarted.is_returned());
        assert!(restarted.return_value().is_none());

        assert_eq!(restarted.resume(), TaskPoll::Yielded);
        assert_eq!(restarted.resume(), TaskPoll::Returned);
        assert_eq!(restarted.return_value().unwrap().get::<i32>(), Some(&7));
    }

    #[test]
    fn restart_shares_the_same_token_identity() {
        let token = super::Token::new();
        let mut task = Task::new("wait", ValueBox::void(), vec![], 0, Some(token.clone()), {
            let token = token.clone();
            move |ctx| {
                token.park(&ctx);
                ValueBox::void()
            }
        });

        assert_eq!(task.resume(), TaskPoll::Parked);
        assert!(task.is_parked());
        token.unpark();
        assert_eq!(task.resume(), TaskPoll::Returned);

        let mut restarted = task.restart();
        assert!(!restarted.is_parked(), "a restarted task's token starts unparked");
        assert_eq!(restarted.resume(), TaskPoll::Parked);
        assert!(restarted.is_parked());

        // Unparking via the token clone this test still holds affects the restarted
        // task, proving restart inherited the same underlying flag, not a copy of it.
        token.unpark();
        assert!(!restarted.is_parked());
        assert_eq!(restarted.resume(), TaskPoll::Returned);
    }

    #[test]
    #[should_panic(expected = "has not returned")]
    fn restarting_a_non_returned_task_panics() {
        let task = Task::new("noop", ValueBox::void(), vec![], 0, None, |_ctx| ValueBox::void());
        let _ = task.restart();
    }
}
