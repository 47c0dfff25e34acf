use std::collections::HashMap;

use history::History;
use value_box::ValueBox;

use crate::counterexample::Counterexample;
use crate::operations::{extract, Operation};
use crate::spec::{ConfigError, OperationKey, Specification};

/// The outcome of checking a history against a specification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CheckError {
    /// The specification's method table is missing an entry the history actually used.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No interleaving of the history's operations is consistent with the specification.
    #[error("history is not linearizable: {0}")]
    NotLinearizable(Counterexample),
}

/// Checks whether `history` is linearizable with respect to `spec`.
///
/// Wing–Gong-style search with memoization over `(hash(reference_state), frontier)`
/// pairs, where `frontier` marks which of the history's operations have been linearized so
/// far. See the operation-selection rules in [`is_candidate`] and the acceptance condition
/// in [`is_accepting`].
///
/// # Errors
///
/// Returns [`CheckError::Config`] if the history exercises an operation the specification
/// never registered, or [`CheckError::NotLinearizable`] with the first response the search
/// could not reconcile with any reachable state.
///
/// # Panics
///
/// The fallback counterexample built when the search fails without ever recording a value
/// mismatch indexes the first extracted operation; this path is unreachable in practice
/// (a non-empty, completed history always yields at least one mismatch before the search
/// gives up), but isn't proven so to the compiler.
pub fn check<S: Specification>(spec: &S, history: &History) -> Result<(), CheckError> {
    let operations = extract(history);
    let frontier = vec![false; operations.len()];

    let mut runner = Search {
        spec,
        operations: &operations,
        visited: HashMap::new(),
        best_failure: None,
    };

    let mut linearized = Vec::new();
    if runner.run(spec.initial_state(), frontier, &mut linearized)? {
        return Ok(());
    }

    Err(CheckError::NotLinearizable(runner.best_failure.unwrap_or_else(|| Counterexample {
        failing_operation: operations[0].key,
        invoke_index: operations[0].invoke_index,
        expected: "<no reachable candidate>".to_string(),
        actual: "<search exhausted without a single value mismatch>".to_string(),
        linearized_prefix: Vec::new(),
    })))
}

struct Search<'a, S: Specification> {
    spec: &'a S,
    operations: &'a [Operation],
    /// Buckets visited `(hash(state), frontier)` pairs, storing every distinct state
    /// (per [`Specification::states_equal`]) the search has already exhausted under that
    /// key — a hash collision between two genuinely different states must not prune a
    /// branch neither of them has actually been explored from.
    visited: HashMap<(u64, Vec<bool>), Vec<S::State>>,
    best_failure: Option<Counterexample>,
}

impl<'a, S: Specification> Search<'a, S> {
    /// Attempts to complete a linearization from `state`/`frontier` onward.
    ///
    /// Returns `Ok(true)` if some completion accepts, `Ok(false)` if this whole subtree is
    /// a dead end (every candidate either revisits a memoized state or mismatches).
    fn run(&mut self, state: S::State, frontier: Vec<bool>, linearized: &mut Vec<OperationKey>) -> Result<bool, ConfigError> {
        if is_accepting(self.operations, &frontier) {
            return Ok(true);
        }

        let state_hash = self.spec.hash_state(&state);
        let bucket = self.visited.entry((state_hash, frontier.clone())).or_default();
        if bucket.iter().any(|seen| self.spec.states_equal(seen, &state)) {
            return Ok(false);
        }
        bucket.push(state.clone());

        for index in 0..self.operations.len() {
            if frontier[index] || !is_candidate(self.operations, &frontier, index) {
                continue;
            }

            let operation = &self.operations[index];
            let (next_state, value) = self.spec.apply(&state, operation.key, &operation.args)?;

            if let Some(recorded) = &operation.response {
                if *recorded != value {
                    self.record_failure(index, &value, recorded, linearized);
                    continue;
                }
            }

            let mut next_frontier = frontier.clone();
            next_frontier[index] = true;
            linearized.push(self.operations[index].key);

            if self.run(next_state, next_frontier, linearized)? {
                return Ok(true);
            }

            linearized.pop();
        }

        Ok(false)
    }

    fn record_failure(&mut self, index: usize, expected: &ValueBox, actual: &ValueBox, linearized: &[OperationKey]) {
        let operation = &self.operations[index];
        let is_earlier = self.best_failure.as_ref().is_none_or(|existing| operation.invoke_index < existing.invoke_index);
        if is_earlier {
            self.best_failure = Some(Counterexample {
                failing_operation: operation.key,
                invoke_index: operation.invoke_index,
                expected: expected.render(),
                actual: actual.render(),
                linearized_prefix: linearized.to_vec(),
            });
        }
    }
}

/// Whether every operation with an observed response has already been linearized.
///
/// Pending operations (no response yet, per the method's dual state or an in-flight call
/// at the end of a round) are allowed to remain outside the frontier — they may yet
/// linearize after the observed history's end, per the base specification's acceptance
/// rule.
fn is_accepting(operations: &[Operation], frontier: &[bool]) -> bool {
    operations.iter().enumerate().all(|(index, operation)| operation.response.is_none() || frontier[index])
}

/// Whether `index` may be linearized next: it must not already be in the frontier, and no
/// other not-yet-linearized operation may have a response that precedes its invoke in real
/// time (that operation would have to be linearized first).
fn is_candidate(operations: &[Operation], frontier: &[bool], index: usize) -> bool {
    let target = &operations[index];
    operations.iter().enumerate().all(|(other_index, other)| {
        other_index == index || frontier[other_index] || other.response_index.is_none_or(|response_index| response_index >= target.invoke_index)
    })
}

#[cfg(test)]
mod tests {
    use value_box::ValueBox;

    use super::{check, CheckError};
    use crate::spec::{ConfigError, OperationKey, OperationKind, Specification};

    /// A minimal register: `add(n)` adds `n` and returns void, `get()` returns the total.
    struct Register;

    impl Specification for Register {
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

        fn apply(&self, state: &i32, key: OperationKey, args: &ValueBox) -> Result<(i32, ValueBox), ConfigError> {
            match (key.name, key.kind) {
                ("add", OperationKind::Plain) => {
                    let delta = *args.get::<i32>().expect("add takes an i32");
                    Ok((state + delta, ValueBox::void()))
                }
                ("get", OperationKind::Plain) => Ok((*state, ValueBox::new(*state))),
                _ => Err(ConfigError(key)),
            }
        }

        fn known_methods(&self) -> &'static [&'static str] {
            &["add", "get"]
        }
    }

    fn register_history(ops: &[(&'static str, i32, Option<i32>)]) -> history::History {
        let mut h = history::History::new();
        for (name, arg, expected) in ops {
            let id = h.next_invocation_id();
            if *name == "add" {
                h.record_invoke(id, 0, name, vec![arg.to_string()], ValueBox::new(*arg));
                h.record_response(id, 0, name, ValueBox::void());
            } else {
                h.record_invoke(id, 0, name, vec![], ValueBox::void());
                h.record_response(id, 0, name, ValueBox::new(expected.unwrap_or(*arg)));
            }
        }
        h
    }

    #[test]
    fn a_consistent_sequential_history_is_linearizable() {
        let h = register_history(&[("add", 5, None), ("get", 0, Some(5)), ("add", 2, None), ("get", 0, Some(7))]);
        assert!(check(&Register, &h).is_ok());
    }

    #[test]
    fn a_history_that_contradicts_every_add_order_is_rejected() {
        let mut h = history::History::new();
        let add_id = h.next_invocation_id();
        h.record_invoke(add_id, 0, "add", vec!["5".to_string()], ValueBox::new(5_i32));
        h.record_response(add_id, 0, "add", ValueBox::void());

        let get_id = h.next_invocation_id();
        h.record_invoke(get_id, 0, "get", vec![], ValueBox::void());
        h.record_response(get_id, 0, "get", ValueBox::new(999_i32));

        match check(&Register, &h) {
            Err(CheckError::NotLinearizable(counterexample)) => {
                assert_eq!(counterexample.failing_operation.name, "get");
            }
            other => panic!("expected a linearizability violation, got {other:?}"),
        }
    }

    #[test]
    fn an_unregistered_method_is_a_config_error() {
        let mut h = history::History::new();
        let id = h.next_invocation_id();
        h.record_invoke(id, 0, "remove", vec![], ValueBox::void());
        h.record_response(id, 0, "remove", ValueBox::void());

        assert!(matches!(check(&Register, &h), Err(CheckError::Config(_))));
    }

    #[test]
    fn concurrent_operations_may_linearize_in_either_real_time_compatible_order() {
        // Two adds overlap (neither's response precedes the other's invoke), so the
        // checker must accept whichever order makes the final get consistent.
        let mut h = history::History::new();
        let a = h.next_invocation_id();
        h.record_invoke(a, 0, "add", vec!["1".to_string()], ValueBox::new(1_i32));
        let b = h.next_invocation_id();
        h.record_invoke(b, 1, "add", vec!["2".to_string()], ValueBox::new(2_i32));
        h.record_response(a, 0, "add", ValueBox::void());
        h.record_response(b, 1, "add", ValueBox::void());

        let get_id = h.next_invocation_id();
        h.record_invoke(get_id, 0, "get", vec![], ValueBox::void());
        h.record_response(get_id, 0, "get", ValueBox::new(3_i32));

        assert!(check(&Register, &h).is_ok());
    }

    proptest::proptest! {
        /// Any purely sequential history consistent with the specification must be accepted
        /// — the search's frontier always has exactly the one op available at each step, so
        /// there's nothing to backtrack over and no reason for it to ever reject.
        #[test]
        fn any_sequential_history_consistent_with_the_spec_is_accepted(
            deltas in proptest::collection::vec(-20_i32..20, 0..30),
        ) {
            let mut h = history::History::new();
            let mut total = 0_i32;
            for delta in deltas {
                let add_id = h.next_invocation_id();
                h.record_invoke(add_id, 0, "add", vec![delta.to_string()], ValueBox::new(delta));
                h.record_response(add_id, 0, "add", ValueBox::void());
                total += delta;

                let get_id = h.next_invocation_id();
                h.record_invoke(get_id, 0, "get", vec![], ValueBox::void());
                h.record_response(get_id, 0, "get", ValueBox::new(total));
            }
            proptest::prop_assert!(check(&Register, &h).is_ok());
        }

        /// A witness always exists for a history built as a sequence of pairs, each pair
        /// either fully sequential or with the second add's invoke overlapping the first's
        /// still-open response — both are real-time compatible with the pair's chosen order
        /// (first-then-second), so the checker must still find it.
        #[test]
        fn overlapping_pairs_consistent_with_a_real_order_always_linearize(
            pairs in proptest::collection::vec((-20_i32..20, -20_i32..20, proptest::prelude::any::<bool>()), 0..10),
        ) {
            let mut h = history::History::new();
            let mut total = 0_i32;

            for (first, second, overlap) in pairs {
                let first_id = h.next_invocation_id();
                h.record_invoke(first_id, 0, "add", vec![first.to_string()], ValueBox::new(first));
                if !overlap {
                    h.record_response(first_id, 0, "add", ValueBox::void());
                }

                let second_id = h.next_invocation_id();
                h.record_invoke(second_id, 1, "add", vec![second.to_string()], ValueBox::new(second));

                if overlap {
                    h.record_response(first_id, 0, "add", ValueBox::void());
                }
                h.record_response(second_id, 1, "add", ValueBox::void());

                total += first + second;
            }

            let get_id = h.next_invocation_id();
            h.record_invoke(get_id, 0, "get", vec![], ValueBox::void());
            h.record_response(get_id, 0, "get", ValueBox::new(total));

            proptest::prop_assert!(check(&Register, &h).is_ok());
        }
    }
}
