use history::History;

/// A round's step budget ran out before every thread's program finished.
///
/// This is the one recoverable error kind in the whole engine: the round's history is
/// discarded, every live task is terminated, and the next round starts on a fresh target.
/// Parked tasks whose token is never unparked eventually hit this; that's expected, not a
/// bug.
#[derive(Debug, thiserror::Error)]
#[error("round aborted: step budget exhausted after {steps_taken} steps")]
pub struct RoundAborted {
    pub steps_taken: usize,
}

/// A target method panicked while a round was driving it.
///
/// Unlike [`RoundAborted`], this is not silently retried: the method under test itself
/// misbehaved (e.g. a failed assertion), so it's reported as a failure rather than folded
/// into the next round. `history` carries everything recorded up to the panicking call's
/// invoke, for display alongside the message.
#[derive(Debug, thiserror::Error)]
#[error("thread {thread} panicked in {method_name:?}: {message}")]
pub struct TargetPanicked {
    pub thread: usize,
    pub method_name: &'static str,
    pub message: String,
    pub history: History,
}

/// Everything [`crate::run_round`] can fail with.
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error(transparent)]
    Aborted(#[from] RoundAborted),
    #[error(transparent)]
    Panicked(#[from] TargetPanicked),
}
