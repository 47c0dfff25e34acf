use history::History;
use runtime::{CurrentTask, StackfulPoll, StackfulTask, set_current_task};

use crate::budget::Budget;
use crate::builder::{MethodBuilder, RoundSetup};
use crate::error::{RoundAborted, RoundError, TargetPanicked};
use crate::policy::SchedulePolicy;

/// One logical thread's state over the course of a round.
struct ThreadState {
    program: std::collections::VecDeque<MethodBuilder>,
    current: Option<ActiveCall>,
}

/// The in-flight call currently occupying a thread, plus the history bookkeeping needed
/// to close it out correctly.
struct ActiveCall {
    stackful: StackfulTask,
    invocation: history::InvocationId,
    is_blocking: bool,
    /// For a blocking call, whether its request/follow-up boundary yield has already been
    /// observed and turned into a `RequestResponse`/`FollowUpInvoke` pair.
    boundary_crossed: bool,
}

/// Drives one round to completion or abortion.
///
/// Builds a fresh [`RoundSetup`] via `factory`, then repeatedly: finds the set of threads
/// that currently have runnable work, picks one via `policy`, resumes it by exactly one
/// step, and folds the result into the returned [`History`]. See the data model's §4.7 for
/// the round loop this mirrors.
///
/// # Errors
///
/// Returns [`RoundAborted`] if the step budget runs out before every thread's program is
/// exhausted, or [`TargetPanicked`] if a method under test panics. Every thread still
/// holding a live task is terminated before returning either error.
pub fn run_round(
    setup: RoundSetup,
    policy: &mut dyn SchedulePolicy,
    step_budget: usize,
) -> Result<History, RoundError> {
    let mut threads: Vec<ThreadState> = setup
        .programs
        .into_iter()
        .map(|program| ThreadState { program: program.into(), current: None })
        .collect();

    let mut history = History::new();
    let mut budget = Budget::new(step_budget);
    let mut steps_taken = 0_usize;

    loop {
        for (index, state) in threads.iter_mut().enumerate() {
            if state.current.is_none() {
                if let Some(builder) = state.program.pop_front() {
                    state.current = Some(start_call(&mut history, index, &builder));
                }
            }
        }

        let runnable: Vec<usize> = threads
            .iter()
            .enumerate()
            .filter(|(_, state)| state.current.as_ref().is_some_and(|call| !call.stackful.is_blocked()))
            .map(|(index, _)| index)
            .collect();

        if runnable.is_empty() {
            if threads.iter().all(|state| state.current.is_none()) {
                return Ok(history);
            }

            // Every live thread is parked on a token nobody will ever unpark. Charge the
            // budget for the scheduler's wasted attempt rather than spinning forever.
            steps_taken += 1;
            if !budget.consume(0) {
                tracing::debug!(steps_taken, "round aborted: every live thread is permanently parked");
                abort(threads);
                return Err(RoundAborted { steps_taken }.into());
            }
            continue;
        }

        let chosen = runnable[policy.choose(runnable.len())];
        let hint = threads[chosen].current.as_ref().unwrap().stackful.current_suspension_budget_hint();

        steps_taken += 1;
        if !budget.consume(hint) {
            tracing::debug!(steps_taken, "round aborted: step budget exhausted");
            abort(threads);
            return Err(RoundAborted { steps_taken }.into());
        }

        let task_name = threads[chosen].current.as_ref().unwrap().stackful.current_name();
        let poll = {
            let _current = set_current_task(CurrentTask { thread_index: chosen, task_name });
            threads[chosen].current.as_mut().unwrap().stackful.resume()
        };

        if let StackfulPoll::Panicked(message) = poll {
            let method_name = threads[chosen].current.as_ref().unwrap().stackful.current_name();
            tracing::debug!(thread = chosen, method_name, message, "round aborted: target panicked");
            let panicked = TargetPanicked { thread: chosen, method_name, message, history };
            abort(threads);
            return Err(panicked.into());
        }

        apply_poll(&mut history, &mut threads[chosen], chosen, poll);
    }
}

fn start_call(history: &mut History, thread: usize, builder: &MethodBuilder) -> ActiveCall {
    let task = (builder.build)(thread);
    let rendered_args = task.rendered_args().to_vec();
    let value_args = task.args().clone();
    let name = task.name();
    let invocation = history.next_invocation_id();

    tracing::trace!(thread, name, is_blocking = builder.is_blocking, "starting call");

    if builder.is_blocking {
        history.record_request_invoke(invocation, thread, name, rendered_args, value_args);
    } else {
        history.record_invoke(invocation, thread, name, rendered_args, value_args);
    }

    ActiveCall {
        stackful: StackfulTask::new(task),
        invocation,
        is_blocking: builder.is_blocking,
        boundary_crossed: false,
    }
}

fn apply_poll(history: &mut History, state: &mut ThreadState, thread: usize, poll: StackfulPoll) {
    let call = state.current.as_mut().expect("apply_poll called with no active call");

    match poll {
        StackfulPoll::Yielded => {
            if call.is_blocking && !call.boundary_crossed {
                call.boundary_crossed = true;
                let name = call.stackful.current_name();
                history.record_request_response(call.invocation, thread, name);

                let follow_up = history.next_invocation_id();
                history.record_follow_up_invoke(follow_up, thread, name);
                call.invocation = follow_up;
            }
        }
        StackfulPoll::Parked | StackfulPoll::ChildSpawned | StackfulPoll::ChildReturned => {}
        StackfulPoll::Panicked(_) => unreachable!("run_round handles a panic before calling apply_poll"),
        StackfulPoll::Returned => {
            let name = call.stackful.current_name();
            let value = call.stackful.return_value().cloned().expect("a returned stackful task has a return value");

            if call.is_blocking {
                history.record_follow_up_response(call.invocation, thread, name, value);
            } else {
                history.record_response(call.invocation, thread, name, value);
            }

            state.current = None;
        }
    }
}

fn abort(threads: Vec<ThreadState>) {
    for state in threads {
        if let Some(call) = state.current {
            call.stackful.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use std::cell::RefCell;

    use runtime::{Task, current_task};
    use value_box::ValueBox;

    use super::run_round;
    use crate::builder::{MethodBuilder, RoundSetup};
    use crate::error::RoundError;
    use crate::policy::UniformRandom;

    fn plain(name: &'static str, value: i32) -> MethodBuilder {
        MethodBuilder {
            name,
            is_blocking: false,
            build: Rc::new(move |_thread| Task::new(name, ValueBox::void(), vec![], 0, None, move |_ctx| ValueBox::new(value))),
        }
    }

    #[test]
    fn a_non_blocking_round_records_one_invoke_response_pair_per_call() {
        let setup = RoundSetup { programs: vec![vec![plain("get", 1)], vec![plain("get", 2)]] };
        let mut policy = UniformRandom::new(1);

        let history = run_round(setup, &mut policy, 100).expect("round should not abort");

        assert!(history.is_well_formed());
        assert_eq!(history.events().len(), 4);
    }

    #[test]
    fn a_blocking_method_yields_a_dual_event_pair() {
        let builder = MethodBuilder {
            name: "enqueue",
            is_blocking: true,
            build: Rc::new(|_thread| {
                Task::new("enqueue", ValueBox::new(7_i32), vec!["7".to_string()], 1, None, |ctx| {
                    ctx.yield_now();
                    ValueBox::void()
                })
            }),
        };
        let setup = RoundSetup { programs: vec![vec![builder]] };
        let mut policy = UniformRandom::new(2);

        let history = run_round(setup, &mut policy, 100).expect("round should not abort");

        assert!(history.is_well_formed());
        assert_eq!(history.events().len(), 4);
        assert!(matches!(history.events()[0], history::HistoryEvent::RequestInvoke(_)));
        assert!(matches!(history.events()[1], history::HistoryEvent::RequestResponse(_)));
        assert!(matches!(history.events()[2], history::HistoryEvent::FollowUpInvoke(_)));
        assert!(matches!(history.events()[3], history::HistoryEvent::FollowUpResponse(_)));
    }

    #[test]
    fn a_spin_loop_exhausts_the_budget_and_aborts() {
        let builder = MethodBuilder {
            name: "spin",
            is_blocking: false,
            build: Rc::new(|_thread| {
                Task::new("spin", ValueBox::void(), vec![], 1, None, |ctx| loop {
                    ctx.yield_now();
                })
            }),
        };
        let setup = RoundSetup { programs: vec![vec![builder]] };
        let mut policy = UniformRandom::new(3);

        let err = run_round(setup, &mut policy, 20).expect_err("a runaway spin must abort");
        match err {
            RoundError::Aborted(aborted) => assert!(aborted.steps_taken > 0),
            RoundError::Panicked(_) => panic!("a plain yield loop cannot panic"),
        }
    }

    #[test]
    fn a_permanently_parked_thread_eventually_aborts() {
        let builder = MethodBuilder {
            name: "wait_forever",
            is_blocking: false,
            build: Rc::new(|_thread| {
                let token = runtime::Token::new();
                let parked = token.clone();
                Task::new("wait_forever", ValueBox::void(), vec![], 0, Some(token), move |ctx| {
                    parked.park(&ctx);
                    ValueBox::void()
                })
            }),
        };
        let setup = RoundSetup { programs: vec![vec![builder]] };
        let mut policy = UniformRandom::new(4);

        let err = run_round(setup, &mut policy, 10).expect_err("a never-unparked task must abort");
        match err {
            RoundError::Aborted(aborted) => assert!(aborted.steps_taken > 0),
            RoundError::Panicked(_) => panic!("a parked task cannot panic"),
        }
    }

    #[test]
    fn the_current_task_is_set_during_resume_and_cleared_between_steps() {
        let observed: Rc<RefCell<Option<(usize, &'static str)>>> = Rc::new(RefCell::new(None));
        let observed_inside = observed.clone();

        let builder = MethodBuilder {
            name: "observe",
            is_blocking: false,
            build: Rc::new(move |_thread| {
                let observed_inside = observed_inside.clone();
                Task::new("observe", ValueBox::void(), vec![], 0, None, move |_ctx| {
                    let current = current_task().expect("current task is set while a method body is running");
                    *observed_inside.borrow_mut() = Some((current.thread_index, current.task_name));
                    ValueBox::void()
                })
            }),
        };
        let setup = RoundSetup { programs: vec![vec![builder]] };
        let mut policy = UniformRandom::new(9);

        assert!(current_task().is_none(), "no task is current before the round starts");
        run_round(setup, &mut policy, 100).expect("round should not abort");

        assert_eq!(*observed.borrow(), Some((0, "observe")));
        assert!(current_task().is_none(), "the guard must restore None once the round returns");
    }

    #[test]
    fn a_panicking_method_is_reported_with_the_history_recorded_so_far() {
        let builder = MethodBuilder {
            name: "buggy",
            is_blocking: false,
            build: Rc::new(|_thread| {
                Task::new("buggy", ValueBox::void(), vec![], 0, None, |_ctx| panic!("bad target state"))
            }),
        };
        let setup = RoundSetup { programs: vec![vec![builder]] };
        let mut policy = UniformRandom::new(5);

        let err = run_round(setup, &mut policy, 100).expect_err("a panicking method must not produce a history");
        match err {
            RoundError::Panicked(panicked) => {
                assert_eq!(panicked.thread, 0);
                assert_eq!(panicked.method_name, "buggy");
                assert!(panicked.message.contains("bad target state"));
                assert_eq!(panicked.history.events().len(), 1, "only the invoke was ever recorded");
            }
            RoundError::Aborted(_) => panic!("expected a panic, not a budget abort"),
        }
    }
}
