//! A correct and a reorder-buggy FIFO queue (scenarios S3/S4).
//!
//! Grounded on `examples/original_source/verifying/specs/queue.h`'s `Push`/`Pop` pair:
//! `Push(v)` appends `v` and returns nothing meaningful, `Pop()` removes and returns the
//! front element, or `0` if the queue is empty. The racy target's `Push` reads the whole
//! queue, yields, then writes back `snapshot + v` — an unsynchronized read-modify-write
//! that loses a concurrent push's element, the queue analogue of the register's racy `add`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use checker::{ConfigError, OperationKey, OperationKind, Specification};
use runtime::Task;
use scheduler::{MethodBuilder, RoundSetup, TargetFactory};
use value_box::ValueBox;

/// The sequential reference queue: `push` appends, `pop` removes from the front (`0` if
/// the queue is empty).
pub struct QueueSpec;

impl Specification for QueueSpec {
    type State = Vec<i32>;

    fn initial_state(&self) -> Vec<i32> {
        Vec::new()
    }

    fn hash_state(&self, state: &Vec<i32>) -> u64 {
        state.iter().fold(0_u64, |acc, v| acc.wrapping_mul(31).wrapping_add(u64::from(v.unsigned_abs())))
    }

    fn states_equal(&self, a: &Vec<i32>, b: &Vec<i32>) -> bool {
        a == b
    }

    fn apply(&self, state: &Vec<i32>, key: OperationKey, args: &ValueBox) -> Result<(Vec<i32>, ValueBox), ConfigError> {
        match (key.name, key.kind) {
            ("push", OperationKind::Plain) => {
                let value = *args.get::<i32>().expect("push takes an i32");
                let mut next = state.clone();
                next.push(value);
                Ok((next, ValueBox::void()))
            }
            ("pop", OperationKind::Plain) => {
                let mut next = state.clone();
                let popped = if next.is_empty() { 0 } else { next.remove(0) };
                Ok((next, ValueBox::new(popped)))
            }
            _ => Err(ConfigError(key)),
        }
    }

    fn known_methods(&self) -> &'static [&'static str] {
        &["push", "pop"]
    }
}

fn push_builder(value: i32, storage: Rc<RefCell<VecDeque<i32>>>) -> MethodBuilder {
    MethodBuilder {
        name: "push",
        is_blocking: false,
        build: Rc::new(move |_thread| {
            let storage = storage.clone();
            Task::new("push", ValueBox::new(value), vec![value.to_string()], 0, None, move |_ctx| {
                storage.borrow_mut().push_back(value);
                ValueBox::void()
            })
        }),
    }
}

fn pop_builder(storage: Rc<RefCell<VecDeque<i32>>>) -> MethodBuilder {
    MethodBuilder {
        name: "pop",
        is_blocking: false,
        build: Rc::new(move |_thread| {
            let storage = storage.clone();
            Task::new("pop", ValueBox::void(), vec![], 0, None, move |_ctx| ValueBox::new(storage.borrow_mut().pop_front().unwrap_or(0)))
        }),
    }
}

/// Reads the whole queue, yields, then writes back `snapshot + value` — a concurrent push
/// racing in that window overwrites this one's effect (or has its own overwritten).
fn racy_push_builder(value: i32, storage: Rc<RefCell<VecDeque<i32>>>) -> MethodBuilder {
    MethodBuilder {
        name: "push",
        is_blocking: false,
        build: Rc::new(move |_thread| {
            let storage = storage.clone();
            Task::new("push", ValueBox::new(value), vec![value.to_string()], 1, None, move |ctx| {
                let mut snapshot: VecDeque<i32> = storage.borrow().clone();
                ctx.yield_now();
                snapshot.push_back(value);
                *storage.borrow_mut() = snapshot;
                ValueBox::void()
            })
        }),
    }
}

/// Scenario S3: thread 0 pushes `1`, `2`; thread 1 pops twice. Every pop result is a
/// prefix-respecting subsequence of `{1, 2, 0}`; the checker should accept every schedule.
#[must_use]
pub fn fifo_factory() -> TargetFactory {
    Rc::new(|_policy| {
        let storage = Rc::new(RefCell::new(VecDeque::new()));
        RoundSetup {
            programs: vec![
                vec![push_builder(1, storage.clone()), push_builder(2, storage.clone())],
                vec![pop_builder(storage.clone()), pop_builder(storage)],
            ],
        }
    })
}

/// Scenario S4: two threads each push, then pop. Some schedules let the two pushes race
/// (see [`racy_push_builder`]), losing one element; the follow-up pop on the thread that
/// "won" the race can then return a value no linearization of the history would produce.
#[must_use]
pub fn racy_push_factory() -> TargetFactory {
    Rc::new(|_policy| {
        let storage = Rc::new(RefCell::new(VecDeque::new()));
        RoundSetup {
            programs: vec![
                vec![racy_push_builder(1, storage.clone()), pop_builder(storage.clone())],
                vec![racy_push_builder(2, storage.clone()), pop_builder(storage)],
            ],
        }
    })
}

#[cfg(test)]
mod tests {
    use scheduler::{run_round, UniformRandom};

    use super::{fifo_factory, racy_push_factory, QueueSpec};

    #[test]
    fn the_fifo_queue_is_linearizable_across_many_schedules() {
        for seed in 0..50 {
            let mut policy = UniformRandom::new(seed);
            let setup = fifo_factory()(&mut policy);
            let history = run_round(setup, &mut policy, 1_000).expect("push/pop never block");
            assert!(checker::check(&QueueSpec, &history).is_ok(), "seed {seed} should linearize");
        }
    }

    #[test]
    fn the_racy_queue_eventually_produces_a_violation() {
        let found = (0..200_u64).any(|seed| {
            let mut policy = UniformRandom::new(seed);
            let setup = racy_push_factory()(&mut policy);
            let history = run_round(setup, &mut policy, 1_000).expect("racy push never blocks");
            checker::check(&QueueSpec, &history).is_err()
        });

        assert!(found, "expected at least one of 200 schedules to lose a push");
    }
}
