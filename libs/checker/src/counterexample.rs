use std::fmt;

use crate::spec::OperationKey;

/// The first response the search could not reconcile with any reachable linearization,
/// plus the longest prefix it did manage to linearize on the path that reached it.
///
/// "First" here means earliest by the operation's invoke position in the raw history, per
/// the base specification's framing of reporting "the minimal counterexample in frontier
/// order" rather than whichever mismatch the search happens to stumble on last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counterexample {
    pub failing_operation: OperationKey,
    pub invoke_index: usize,
    /// What the sequential specification predicts this operation should have returned.
    pub expected: String,
    /// What the operation actually returned in the recorded history.
    pub actual: String,
    pub linearized_prefix: Vec<OperationKey>,
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "operation {:?} (at event {}) returned {}, but the sequential specification says {} after linearizing {} prior operation(s)",
            self.failing_operation,
            self.invoke_index,
            self.actual,
            self.expected,
            self.linearized_prefix.len(),
        )
    }
}
