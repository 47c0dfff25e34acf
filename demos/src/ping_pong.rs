//! Park/unpark ping-pong (scenario S5).
//!
//! Task A parks on a shared [`runtime::Token`] and returns once woken; task B unparks it.
//! Unlike the register and queue scenarios this isn't checked against a sequential
//! specification — it exercises the scheduler's park/unpark handling directly: exactly one
//! unpark must resume A, and [`runtime::Token::unpark`] is a no-op when called again before
//! a second park (see `runtime::Token`'s own tests for that half).

use std::rc::Rc;

use runtime::{Task, Token};
use scheduler::{MethodBuilder, RoundSetup, TargetFactory};
use value_box::ValueBox;

fn wait_builder(token: Token) -> MethodBuilder {
    MethodBuilder {
        name: "wait_turn",
        is_blocking: false,
        build: Rc::new(move |_thread| {
            let token = token.clone();
            Task::new("wait_turn", ValueBox::void(), vec![], 0, Some(token.clone()), move |ctx| {
                token.park(&ctx);
                ValueBox::void()
            })
        }),
    }
}

fn signal_builder(token: Token) -> MethodBuilder {
    MethodBuilder {
        name: "signal_turn",
        is_blocking: false,
        build: Rc::new(move |_thread| {
            let token = token.clone();
            Task::new("signal_turn", ValueBox::void(), vec![], 0, None, move |_ctx| {
                token.unpark();
                ValueBox::void()
            })
        }),
    }
}

/// Scenario S5: thread 0 parks on a token, thread 1 unparks it.
///
/// The round must complete (thread 0's `wait_turn` is only ever blocked, not permanently
/// parked) and its history must show `wait_turn`'s response strictly after
/// `signal_turn`'s, since nothing can resume a still-parked task.
#[must_use]
pub fn ping_pong_factory() -> TargetFactory {
    Rc::new(|_policy| {
        let token = Token::new();
        RoundSetup { programs: vec![vec![wait_builder(token.clone())], vec![signal_builder(token)]] }
    })
}

#[cfg(test)]
mod tests {
    use history::HistoryEvent;
    use scheduler::{run_round, UniformRandom};

    use super::ping_pong_factory;

    #[test]
    fn the_signal_always_resumes_the_waiter_before_it_responds() {
        for seed in 0..20 {
            let mut policy = UniformRandom::new(seed);
            let setup = ping_pong_factory()(&mut policy);
            let history = run_round(setup, &mut policy, 1_000).expect("a single unpark must always arrive");

            assert!(history.is_well_formed());
            let signal_response = history
                .events()
                .iter()
                .position(|e| matches!(e, HistoryEvent::Response(r) if r.name == "signal_turn"))
                .expect("signal_turn responds");
            let wait_response = history
                .events()
                .iter()
                .position(|e| matches!(e, HistoryEvent::Response(r) if r.name == "wait_turn"))
                .expect("wait_turn responds");

            assert!(signal_response < wait_response, "seed {seed}: the unpark must precede the wake it causes");
        }
    }
}
