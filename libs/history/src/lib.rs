//! The ordered invoke/response event log a checker run produces.
//!
//! A [`History`] is the only channel through which the scheduler hands anything to the
//! [linearizability checker](../checker/index.html): every method call becomes one (for
//! ordinary methods) or two (for blocking methods, see [`HistoryEvent`]) invoke/response
//! pairs, in the exact order the scheduler decided to run them.

use std::fmt;

use value_box::ValueBox;

/// Identifies one method invocation across its invoke and (if any) response events.
///
/// Distinct from the thread index: a thread runs many invocations over the course of a
/// round, and an invocation's id is what lets a response be matched back to its invoke
/// unambiguously even if another invocation on the same thread has started since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(usize);

/// The invoke half of a method call: the method name, its rendered arguments (for
/// display), and its typed argument payload (for the checker's method table).
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeEvent {
    pub invocation: InvocationId,
    pub thread: usize,
    pub name: &'static str,
    pub args: Vec<String>,
    pub value_args: ValueBox,
}

/// The response half of a method call: the value it returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEvent {
    pub invocation: InvocationId,
    pub thread: usize,
    pub name: &'static str,
    pub value: ValueBox,
}

/// One entry in a [`History`].
///
/// Non-blocking methods emit a single `Invoke`/`Response` pair. Blocking methods (see
/// `scheduler`'s `is_blocking` per-method flag) emit two pairs instead: `RequestInvoke`/
/// `RequestResponse` covers the method accepting the call, and the later
/// `FollowUpInvoke`/`FollowUpResponse` covers it actually completing — the checker
/// linearizes each pair as its own atomic step, with the follow-up constrained to occur
/// strictly after its request (see `checker`'s dual-operation handling).
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    Invoke(InvokeEvent),
    Response(ResponseEvent),
    RequestInvoke(InvokeEvent),
    RequestResponse(ResponseEvent),
    FollowUpInvoke(InvokeEvent),
    FollowUpResponse(ResponseEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenKind {
    Plain,
    Request,
    FollowUp,
}

enum Transition {
    Open(OpenKind, InvocationId, usize),
    Close(OpenKind, InvocationId, usize),
}

impl HistoryEvent {
    /// The thread index that emitted this event.
    #[must_use]
    pub fn thread(&self) -> usize {
        match self {
            HistoryEvent::Invoke(e) | HistoryEvent::RequestInvoke(e) | HistoryEvent::FollowUpInvoke(e) => e.thread,
            HistoryEvent::Response(e) | HistoryEvent::RequestResponse(e) | HistoryEvent::FollowUpResponse(e) => e.thread,
        }
    }

    /// The invocation this event belongs to.
    #[must_use]
    pub fn invocation(&self) -> InvocationId {
        match self {
            HistoryEvent::Invoke(e) | HistoryEvent::RequestInvoke(e) | HistoryEvent::FollowUpInvoke(e) => e.invocation,
            HistoryEvent::Response(e) | HistoryEvent::RequestResponse(e) | HistoryEvent::FollowUpResponse(e) => e.invocation,
        }
    }

    /// The method name of the originating invocation.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            HistoryEvent::Invoke(e) | HistoryEvent::RequestInvoke(e) | HistoryEvent::FollowUpInvoke(e) => e.name,
            HistoryEvent::Response(e) | HistoryEvent::RequestResponse(e) | HistoryEvent::FollowUpResponse(e) => e.name,
        }
    }

    /// Whether this is one of the three invoke-shaped variants.
    #[must_use]
    pub fn is_invoke(&self) -> bool {
        matches!(self, HistoryEvent::Invoke(_) | HistoryEvent::RequestInvoke(_) | HistoryEvent::FollowUpInvoke(_))
    }

    fn transition(&self) -> Transition {
        match self {
            HistoryEvent::Invoke(e) => Transition::Open(OpenKind::Plain, e.invocation, e.thread),
            HistoryEvent::Response(e) => Transition::Close(OpenKind::Plain, e.invocation, e.thread),
            HistoryEvent::RequestInvoke(e) => Transition::Open(OpenKind::Request, e.invocation, e.thread),
            HistoryEvent::RequestResponse(e) => Transition::Close(OpenKind::Request, e.invocation, e.thread),
            HistoryEvent::FollowUpInvoke(e) => Transition::Open(OpenKind::FollowUp, e.invocation, e.thread),
            HistoryEvent::FollowUpResponse(e) => Transition::Close(OpenKind::FollowUp, e.invocation, e.thread),
        }
    }

    fn write_line(&self, out: &mut String) {
        match self {
            HistoryEvent::Invoke(e) => write_invoke(out, "invoke", e),
            HistoryEvent::RequestInvoke(e) => write_invoke(out, "request_invoke", e),
            HistoryEvent::FollowUpInvoke(e) => write_invoke(out, "follow_up_invoke", e),
            HistoryEvent::Response(e) => write_response(out, "response", e),
            HistoryEvent::RequestResponse(e) => write_response(out, "request_response", e),
            HistoryEvent::FollowUpResponse(e) => write_response(out, "follow_up_response", e),
        }
    }
}

fn write_invoke(out: &mut String, kind: &str, e: &InvokeEvent) {
    use std::fmt::Write as _;
    let _ = write!(out, "{kind} thread={} task={} name={} args=[{}]", e.thread, e.invocation.0, e.name, e.args.join(", "));
}

fn write_response(out: &mut String, kind: &str, e: &ResponseEvent) {
    use std::fmt::Write as _;
    let _ = write!(
        out,
        "{kind} thread={} task={} name={} value={}",
        e.thread,
        e.invocation.0,
        e.name,
        e.value.render()
    );
}

/// The ordered, append-only log of invoke/response events for one checker round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    events: Vec<HistoryEvent>,
    next_invocation: usize,
}

impl History {
    /// An empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh invocation id for a new method call about to be invoked.
    pub fn next_invocation_id(&mut self) -> InvocationId {
        let id = InvocationId(self.next_invocation);
        self.next_invocation += 1;
        id
    }

    /// Records a non-blocking method's invoke event.
    pub fn record_invoke(
        &mut self,
        invocation: InvocationId,
        thread: usize,
        name: &'static str,
        args: Vec<String>,
        value_args: ValueBox,
    ) {
        self.events.push(HistoryEvent::Invoke(InvokeEvent { invocation, thread, name, args, value_args }));
    }

    /// Records a non-blocking method's response event.
    pub fn record_response(&mut self, invocation: InvocationId, thread: usize, name: &'static str, value: ValueBox) {
        self.events.push(HistoryEvent::Response(ResponseEvent { invocation, thread, name, value }));
    }

    /// Records the `RequestInvoke` half of a blocking method call.
    pub fn record_request_invoke(
        &mut self,
        invocation: InvocationId,
        thread: usize,
        name: &'static str,
        args: Vec<String>,
        value_args: ValueBox,
    ) {
        self.events.push(HistoryEvent::RequestInvoke(InvokeEvent { invocation, thread, name, args, value_args }));
    }

    /// Records the `RequestResponse` half of a blocking method call.
    ///
    /// Per `SPEC_FULL.md`'s resolution of the source's ambiguous dual-operation void
    /// rendering, the request half always carries [`ValueBox::void`]; the method's real
    /// return value is only observable on the follow-up response.
    pub fn record_request_response(&mut self, invocation: InvocationId, thread: usize, name: &'static str) {
        self.events.push(HistoryEvent::RequestResponse(ResponseEvent {
            invocation,
            thread,
            name,
            value: ValueBox::void(),
        }));
    }

    /// Records the `FollowUpInvoke` half of a blocking method call.
    pub fn record_follow_up_invoke(&mut self, invocation: InvocationId, thread: usize, name: &'static str) {
        self.events.push(HistoryEvent::FollowUpInvoke(InvokeEvent {
            invocation,
            thread,
            name,
            args: Vec::new(),
            value_args: ValueBox::void(),
        }));
    }

    /// Records the `FollowUpResponse` half of a blocking method call, carrying the
    /// method's real return value.
    pub fn record_follow_up_response(&mut self, invocation: InvocationId, thread: usize, name: &'static str, value: ValueBox) {
        self.events.push(HistoryEvent::FollowUpResponse(ResponseEvent { invocation, thread, name, value }));
    }

    /// The recorded events, in emission order.
    #[must_use]
    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    /// Checks the well-formedness invariants from the data model:
    /// - every response is preceded by a matching invoke on the same invocation,
    /// - per thread, events alternate invoke/response without interleaving a second open
    ///   invocation,
    /// - dual pairs are well-parenthesized (a `RequestResponse` must match the most
    ///   recently opened `RequestInvoke` on that thread, and likewise for follow-ups).
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let mut open: std::collections::HashMap<usize, (OpenKind, InvocationId)> = std::collections::HashMap::new();

        for event in &self.events {
            match event.transition() {
                Transition::Open(kind, id, thread) => {
                    if open.insert(thread, (kind, id)).is_some() {
                        return false;
                    }
                }
                Transition::Close(kind, id, thread) => match open.remove(&thread) {
                    Some((open_kind, open_id)) if open_kind == kind && open_id == id => {}
                    _ => return false,
                },
            }
        }

        true
    }

    /// Renders the history as a line-per-event report.
    #[must_use]
    pub fn write_lines(&self) -> String {
        let mut out = String::new();
        for event in &self.events {
            event.write_line(&mut out);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.write_lines())
    }
}

#[cfg(test)]
mod tests {
    use super::History;
    use value_box::ValueBox;

    #[test]
    fn a_matched_invoke_response_pair_is_well_formed() {
        let mut h = History::new();
        let id = h.next_invocation_id();
        h.record_invoke(id, 0, "add", vec!["1".to_string()], ValueBox::new(1_i32));
        h.record_response(id, 0, "add", ValueBox::void());
        assert!(h.is_well_formed());
    }

    #[test]
    fn two_open_invokes_on_one_thread_is_malformed() {
        let mut h = History::new();
        let a = h.next_invocation_id();
        let b = h.next_invocation_id();
        h.record_invoke(a, 0, "add", vec![], ValueBox::void());
        h.record_invoke(b, 0, "add", vec![], ValueBox::void());
        assert!(!h.is_well_formed());
    }

    #[test]
    fn a_response_without_a_matching_invoke_is_malformed() {
        let mut h = History::new();
        let id = h.next_invocation_id();
        h.record_response(id, 0, "add", ValueBox::void());
        assert!(!h.is_well_formed());
    }

    #[test]
    fn an_unanswered_trailing_invoke_is_still_well_formed() {
        let mut h = History::new();
        let id = h.next_invocation_id();
        h.record_invoke(id, 0, "add", vec![], ValueBox::void());
        assert!(h.is_well_formed());
    }

    #[test]
    fn dual_pairs_must_close_with_the_matching_kind() {
        let mut h = History::new();
        let id = h.next_invocation_id();
        h.record_request_invoke(id, 0, "enqueue", vec!["1".to_string()], ValueBox::new(1_i32));
        // Closing a RequestInvoke with a plain Response (instead of RequestResponse)
        // violates well-parenthesization.
        h.record_response(id, 0, "enqueue", ValueBox::void());
        assert!(!h.is_well_formed());
    }

    #[test]
    fn interleaved_other_thread_events_do_not_affect_well_formedness() {
        let mut h = History::new();
        let a = h.next_invocation_id();
        h.record_request_invoke(a, 0, "enqueue", vec!["1".to_string()], ValueBox::new(1_i32));

        let b = h.next_invocation_id();
        h.record_invoke(b, 1, "size", vec![], ValueBox::void());
        h.record_response(b, 1, "size", ValueBox::new(0_i32));

        h.record_request_response(a, 0, "enqueue");
        let follow_up = h.next_invocation_id();
        h.record_follow_up_invoke(follow_up, 0, "enqueue");
        h.record_follow_up_response(follow_up, 0, "enqueue", ValueBox::void());

        assert!(h.is_well_formed());
    }

    proptest::proptest! {
        /// Any program built by, per step, picking a thread and either completing a plain
        /// call or a full request/follow-up pair on it before moving on, is well-formed —
        /// no thread is ever left with two opens or a mismatched close.
        #[test]
        fn a_randomly_interleaved_program_is_well_formed(
            steps in proptest::collection::vec((0_usize..4, proptest::prelude::any::<bool>()), 0..50),
        ) {
            let mut h = History::new();
            for (thread, dual) in steps {
                if dual {
                    let id = h.next_invocation_id();
                    h.record_request_invoke(id, thread, "enqueue", vec![], ValueBox::void());
                    h.record_request_response(id, thread, "enqueue");
                    let follow_up = h.next_invocation_id();
                    h.record_follow_up_invoke(follow_up, thread, "enqueue");
                    h.record_follow_up_response(follow_up, thread, "enqueue", ValueBox::void());
                } else {
                    let id = h.next_invocation_id();
                    h.record_invoke(id, thread, "add", vec![], ValueBox::void());
                    h.record_response(id, thread, "add", ValueBox::void());
                }
            }
            proptest::prop_assert!(h.is_well_formed());
        }

        /// Appending a second, spurious response to an invocation this same program already
        /// closed must be caught: the thread has nothing open for it to match.
        #[test]
        fn a_duplicated_response_is_malformed(
            steps in proptest::collection::vec((0_usize..4, proptest::prelude::any::<bool>()), 1..50),
        ) {
            let mut h = History::new();
            let mut last = None;
            for (thread, dual) in steps {
                let id = h.next_invocation_id();
                if dual {
                    h.record_request_invoke(id, thread, "enqueue", vec![], ValueBox::void());
                    h.record_request_response(id, thread, "enqueue");
                } else {
                    h.record_invoke(id, thread, "add", vec![], ValueBox::void());
                    h.record_response(id, thread, "add", ValueBox::void());
                }
                last = Some((id, thread));
            }
            let (id, thread) = last.expect("at least one step was generated");
            h.record_response(id, thread, "add", ValueBox::void());
            proptest::prop_assert!(!h.is_well_formed());
        }
    }

    #[test]
    fn write_lines_renders_one_line_per_event() {
        let mut h = History::new();
        let id = h.next_invocation_id();
        h.record_invoke(id, 0, "add", vec!["1".to_string()], ValueBox::new(1_i32));
        h.record_response(id, 0, "add", ValueBox::void());

        let rendered = h.write_lines();
        assert_eq!(rendered.lines().count(), 2);
        assert!(rendered.contains("invoke thread=0 task=0 name=add args=[1]"));
        assert!(rendered.contains("response thread=0 task=0 name=add value=void"));
    }
}
