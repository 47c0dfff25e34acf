//! Runaway spin target (scenario S6).
//!
//! A method that yields forever without ever returning. No sequential specification
//! applies here — the point of this target is that the round aborts once the step budget
//! is exhausted, producing no counterexample, rather than hanging the scheduler.

use std::rc::Rc;

use runtime::Task;
use scheduler::{MethodBuilder, RoundSetup, TargetFactory};
use value_box::ValueBox;

fn spin_builder() -> MethodBuilder {
    MethodBuilder {
        name: "spin",
        is_blocking: false,
        build: Rc::new(|_thread| {
            Task::new("spin", ValueBox::void(), vec![], 1, None, |ctx| loop {
                ctx.yield_now();
            })
        }),
    }
}

/// Scenario S6: a single thread runs [`spin_builder`] forever.
#[must_use]
pub fn spin_factory() -> TargetFactory {
    Rc::new(|_policy| RoundSetup { programs: vec![vec![spin_builder()]] })
}

#[cfg(test)]
mod tests {
    use scheduler::{run_round, RoundError, UniformRandom};

    use super::spin_factory;

    #[test]
    fn the_round_aborts_instead_of_hanging() {
        let mut policy = UniformRandom::new(1);
        let setup = spin_factory()(&mut policy);

        let err = run_round(setup, &mut policy, 50).expect_err("a spin target must exhaust the budget");
        match err {
            RoundError::Aborted(aborted) => assert!(aborted.steps_taken > 0),
            RoundError::Panicked(_) => panic!("a plain spin loop cannot panic"),
        }
    }
}
