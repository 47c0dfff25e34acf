//! Atomic and racy single-cell registers (scenarios S1/S2).
//!
//! Both targets share one sequential specification: `add` increments by one and returns
//! nothing, `get` returns the current total. The atomic target's `add` is a single
//! uninterrupted step; the racy target's `add` splits the read and the write across a
//! voluntary yield, the way `examples/original_source/verifying/targets/race_register.cpp`'s
//! unsynchronized `++x` would look if compiled down to the read-modify-write it actually is.

use std::cell::Cell;
use std::rc::Rc;

use checker::{ConfigError, OperationKey, OperationKind, Specification};
use runtime::Task;
use scheduler::{MethodBuilder, RoundSetup, TargetFactory};
use value_box::ValueBox;

/// The sequential reference register: `add()` increments by one, `get()` reads the total.
pub struct RegisterSpec;

impl Specification for RegisterSpec {
    type State = i32;

    fn initial_state(&self) -> i32 {
        0
    }

    fn hash_state(&self, state: &i32) -> u64 {
        u64::from(state.unsigned_abs())
    }

    fn states_equal(&self, a: &i32, b: &i32) -> bool {
        a == b
    }

    fn apply(&self, state: &i32, key: OperationKey, _args: &ValueBox) -> Result<(i32, ValueBox), ConfigError> {
        match (key.name, key.kind) {
            ("add", OperationKind::Plain) => Ok((state + 1, ValueBox::void())),
            ("get", OperationKind::Plain) => Ok((*state, ValueBox::new(*state))),
            _ => Err(ConfigError(key)),
        }
    }

    fn known_methods(&self) -> &'static [&'static str] {
        &["add", "get"]
    }
}

fn add_builder(counter: Rc<Cell<i32>>) -> MethodBuilder {
    MethodBuilder {
        name: "add",
        is_blocking: false,
        build: Rc::new(move |_thread| {
            let counter = counter.clone();
            Task::new("add", ValueBox::void(), vec![], 0, None, move |_ctx| {
                counter.set(counter.get() + 1);
                ValueBox::void()
            })
        }),
    }
}

fn get_builder(counter: Rc<Cell<i32>>) -> MethodBuilder {
    MethodBuilder {
        name: "get",
        is_blocking: false,
        build: Rc::new(move |_thread| {
            let counter = counter.clone();
            Task::new("get", ValueBox::void(), vec![], 0, None, move |_ctx| ValueBox::new(counter.get()))
        }),
    }
}

/// `add` split into a read and a write separated by a voluntary yield: two concurrent
/// `add`s can both read the same value before either writes, losing one increment.
fn racy_add_builder(counter: Rc<Cell<i32>>) -> MethodBuilder {
    MethodBuilder {
        name: "add",
        is_blocking: false,
        build: Rc::new(move |_thread| {
            let counter = counter.clone();
            Task::new("add", ValueBox::void(), vec![], 1, None, move |ctx| {
                let observed = counter.get();
                ctx.yield_now();
                counter.set(observed + 1);
                ValueBox::void()
            })
        }),
    }
}

/// Scenario S1: two threads each run `add(); add(); get()` against an atomic `add`.
///
/// Every `get` must observe a value in `{2,3,4}` consistent with some linear order of the
/// four `add`s and two `get`s; the checker should accept every schedule.
#[must_use]
pub fn atomic_factory() -> TargetFactory {
    Rc::new(|_policy| {
        let counter = Rc::new(Cell::new(0));
        let program = vec![add_builder(counter.clone()), add_builder(counter.clone()), get_builder(counter)];
        RoundSetup { programs: vec![program.clone(), program] }
    })
}

/// Scenario S2: same program shape as [`atomic_factory`], but `add` is the racy,
/// two-step version. Some schedules lose an increment, producing a `get` response the
/// checker cannot reconcile with any linearization.
#[must_use]
pub fn racy_add_factory() -> TargetFactory {
    Rc::new(|_policy| {
        let counter = Rc::new(Cell::new(0));
        let program = vec![racy_add_builder(counter.clone()), racy_add_builder(counter.clone()), get_builder(counter)];
        RoundSetup { programs: vec![program.clone(), program] }
    })
}

#[cfg(test)]
mod tests {
    use scheduler::{run_round, UniformRandom};

    use super::{atomic_factory, racy_add_factory, RegisterSpec};

    #[test]
    fn the_atomic_register_is_linearizable_across_many_schedules() {
        for seed in 0..50 {
            let mut policy = UniformRandom::new(seed);
            let setup = atomic_factory()(&mut policy);
            let history = run_round(setup, &mut policy, 1_000).expect("atomic add never blocks");
            assert!(checker::check(&RegisterSpec, &history).is_ok(), "seed {seed} should linearize");
        }
    }

    #[test]
    fn the_racy_register_eventually_produces_a_violation() {
        let found = (0..200_u64).any(|seed| {
            let mut policy = UniformRandom::new(seed);
            let setup = racy_add_factory()(&mut policy);
            let history = run_round(setup, &mut policy, 1_000).expect("racy add never blocks");
            checker::check(&RegisterSpec, &history).is_err()
        });

        assert!(found, "expected at least one of 200 schedules to lose an increment");
    }
}
