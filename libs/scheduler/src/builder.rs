use std::rc::Rc;

use runtime::Task;

use crate::policy::SchedulePolicy;

/// A factory for one registered method, bound to a concrete target for the round.
///
/// The `build` closure takes the thread index the call is running on (so a method can,
/// e.g., pick a thread-distinct argument) and returns a fresh, not-yet-started [`Task`].
#[derive(Clone)]
pub struct MethodBuilder {
    /// The method's registered name, shared with the matching entry in the reference
    /// specification's method table.
    pub name: &'static str,
    /// Whether this method is rendered as a `RequestInvoke`/`RequestResponse` +
    /// `FollowUpInvoke`/`FollowUpResponse` dual pair rather than a plain `Invoke`/`Response`.
    ///
    /// By this project's convention a blocking method's task must yield exactly once (via
    /// `Ctx::yield_now`) at the boundary between being accepted and actually completing;
    /// the round runner treats that yield as the request/follow-up split.
    pub is_blocking: bool,
    /// Builds a fresh task for a call on the given thread index.
    pub build: Rc<dyn Fn(usize) -> Task>,
}

impl std::fmt::Debug for MethodBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodBuilder")
            .field("name", &self.name)
            .field("is_blocking", &self.is_blocking)
            .finish_non_exhaustive()
    }
}

/// One round's worth of work: a sequence of method calls to run on each logical thread.
///
/// A thread's program is consumed front-to-back: once its current stackful task returns,
/// the next builder in its program (if any) starts a fresh one. A thread with an empty
/// program is simply done for the round.
pub struct RoundSetup {
    pub programs: Vec<Vec<MethodBuilder>>,
}

/// Builds a fresh [`RoundSetup`] at the start of every round.
///
/// Recreating the target (and therefore every [`MethodBuilder`] that closes over it) fresh
/// each round is how "reset target state" (§4.7) is realized: there is no separate reset
/// operation, just a new target built from scratch. The policy is threaded through so a
/// factory that wants randomized per-thread programs can sample from a shared method
/// registry; factories that assign fixed, deterministic programs (as the end-to-end demo
/// scenarios do) simply ignore it.
pub type TargetFactory = Rc<dyn Fn(&mut dyn SchedulePolicy) -> RoundSetup>;

/// Samples `calls` method builders per thread, uniformly at random, from a shared registry.
///
/// A convenience for factories that want the general "randomized interleaving of any
/// registered method" behavior rather than a hand-assembled fixed program per thread.
#[must_use]
pub fn sample_programs(
    registry: &[MethodBuilder],
    threads: usize,
    calls: usize,
    policy: &mut dyn SchedulePolicy,
) -> Vec<Vec<MethodBuilder>> {
    assert!(!registry.is_empty(), "cannot sample programs from an empty method registry");

    (0..threads)
        .map(|_| {
            (0..calls)
                .map(|_| registry[policy.choose(registry.len())].clone())
                .collect()
        })
        .collect()
}
