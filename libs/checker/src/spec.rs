use value_box::ValueBox;

/// Which half of a (possibly dual-operation) call a history event belongs to.
///
/// Non-blocking methods only ever produce [`OperationKind::Plain`] operations. A blocking
/// method's `RequestInvoke`/`RequestResponse` pair becomes one [`OperationKind::Request`]
/// operation, and its `FollowUpInvoke`/`FollowUpResponse` pair becomes a separate
/// [`OperationKind::FollowUp`] operation — each linearized as its own atomic step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Plain,
    Request,
    FollowUp,
}

/// A method table key: the target method's registered name plus which half of a
/// dual-operation call this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub name: &'static str,
    pub kind: OperationKind,
}

impl OperationKey {
    #[must_use]
    pub fn new(name: &'static str, kind: OperationKind) -> Self {
        Self { name, kind }
    }
}

/// A sequential reference implementation of the same method set as the target.
///
/// Registration mirrors the base specification directly: an initial-state constructor, a
/// hash function and an equality function over states (so the search can memoize visited
/// `(state, frontier)` pairs without requiring `Hash`/`Eq` on `State` itself — a
/// specification author may want, say, a structural hash that ignores allocation order),
/// and a method table covering every operation key the history can produce.
pub trait Specification {
    type State: Clone;

    /// Builds a fresh initial state. Called once per checker run, and again at the start
    /// of every round if the specification is reused across rounds.
    fn initial_state(&self) -> Self::State;

    /// A hash of `state`, used only to bucket the search's visited-set; collisions are
    /// resolved by `states_equal`, not relied on for correctness.
    fn hash_state(&self, state: &Self::State) -> u64;

    /// Whether two states are equivalent for the purposes of the search's memoization.
    fn states_equal(&self, a: &Self::State, b: &Self::State) -> bool;

    /// Applies the operation named by `key` to `state`, returning the resulting state and
    /// the value the method would have returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if no table entry exists for `key` — every operation key the
    /// history actually produces must be registered.
    fn apply(&self, state: &Self::State, key: OperationKey, args: &ValueBox) -> Result<(Self::State, ValueBox), ConfigError>;

    /// The method names this specification's table covers, independent of any particular
    /// state, argument, or [`OperationKind`].
    ///
    /// Lets a caller validate a target's registered methods against this table before any
    /// history is ever recorded, rather than discovering a missing entry only once `apply`
    /// is first called against a real round.
    fn known_methods(&self) -> &'static [&'static str];
}

/// A fatal mismatch between the history and the registered specification.
///
/// Unlike a linearizability violation, this can never be "the right answer" — it means the
/// specification is missing a table entry the target actually exercised, and the checker
/// run should be treated as misconfigured rather than as having found a counterexample.
#[derive(Debug, Clone, thiserror::Error)]
#[error("specification has no method table entry for {0:?}")]
pub struct ConfigError(pub OperationKey);
