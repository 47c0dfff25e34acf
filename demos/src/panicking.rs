//! A target whose method body panics outright (§7's panic-handling path).
//!
//! Distinct from the six numbered scenarios: this isn't a data-structure bug for the
//! checker to find, it's a target author's assertion failing mid-call, which the scheduler
//! must catch and report rather than let crash the whole `concheck` process.

use std::rc::Rc;

use runtime::Task;
use scheduler::{MethodBuilder, RoundSetup, TargetFactory};
use value_box::ValueBox;

fn assert_builder() -> MethodBuilder {
    MethodBuilder {
        name: "assert_invariant",
        is_blocking: false,
        build: Rc::new(|_thread| {
            Task::new("assert_invariant", ValueBox::void(), vec![], 0, None, |_ctx| {
                panic!("invariant violated: target is in an unexpected state")
            })
        }),
    }
}

/// A single thread running [`assert_builder`], which always panics on its first step.
#[must_use]
pub fn panicking_factory() -> TargetFactory {
    Rc::new(|_policy| RoundSetup { programs: vec![vec![assert_builder()]] })
}

#[cfg(test)]
mod tests {
    use scheduler::{run_round, RoundError, UniformRandom};

    use super::panicking_factory;

    #[test]
    fn the_round_reports_the_panic_instead_of_crashing() {
        let mut policy = UniformRandom::new(1);
        let setup = panicking_factory()(&mut policy);

        let err = run_round(setup, &mut policy, 100).expect_err("the target always panics");
        match err {
            RoundError::Panicked(panicked) => {
                assert_eq!(panicked.method_name, "assert_invariant");
                assert!(panicked.message.contains("invariant violated"));
            }
            RoundError::Aborted(_) => panic!("expected a panic, not a budget abort"),
        }
    }
}
