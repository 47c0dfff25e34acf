use std::collections::HashMap;

use history::{History, HistoryEvent};
use value_box::ValueBox;

use crate::spec::{OperationKey, OperationKind};

/// One linearizable unit extracted from a [`History`]: either a plain method call or one
/// half of a blocking method's dual-operation pair.
///
/// `invoke_index`/`response_index` are positions in the history's raw event list, used to
/// derive the real-time precedence order the search respects (an operation cannot be
/// linearized before any other, not-yet-linearized operation whose response precedes its
/// own invoke).
#[derive(Debug, Clone)]
pub(crate) struct Operation {
    pub key: OperationKey,
    pub args: ValueBox,
    pub response: Option<ValueBox>,
    pub invoke_index: usize,
    pub response_index: Option<usize>,
}

/// Pairs up every invoke with its matching response (if any) and assigns each pair its
/// [`OperationKind`].
///
/// Assumes `history` is well-formed (see `History::is_well_formed`); a malformed history
/// produces a meaningless but panic-free result, since callers are expected to reject
/// malformed histories before ever reaching the checker.
pub(crate) fn extract(history: &History) -> Vec<Operation> {
    let mut open: HashMap<usize, usize> = HashMap::new();
    let mut operations = Vec::new();

    for (event_index, event) in history.events().iter().enumerate() {
        match event {
            HistoryEvent::Invoke(e) => open_operation(&mut operations, &mut open, e.thread, OperationKind::Plain, e.name, e.value_args.clone(), event_index),
            HistoryEvent::RequestInvoke(e) => open_operation(&mut operations, &mut open, e.thread, OperationKind::Request, e.name, e.value_args.clone(), event_index),
            HistoryEvent::FollowUpInvoke(e) => open_operation(&mut operations, &mut open, e.thread, OperationKind::FollowUp, e.name, e.value_args.clone(), event_index),
            HistoryEvent::Response(e) | HistoryEvent::RequestResponse(e) | HistoryEvent::FollowUpResponse(e) => {
                if let Some(op_index) = open.remove(&e.thread) {
                    operations[op_index].response = Some(e.value.clone());
                    operations[op_index].response_index = Some(event_index);
                }
            }
        }
    }

    operations
}

fn open_operation(
    operations: &mut Vec<Operation>,
    open: &mut HashMap<usize, usize>,
    thread: usize,
    kind: OperationKind,
    name: &'static str,
    args: ValueBox,
    event_index: usize,
) {
    open.insert(thread, operations.len());
    operations.push(Operation {
        key: OperationKey::new(name, kind),
        args,
        response: None,
        invoke_index: event_index,
        response_index: None,
    });
}

#[cfg(test)]
mod tests {
    use value_box::ValueBox;

    use super::extract;
    use crate::spec::OperationKind;

    #[test]
    fn pairs_a_plain_invoke_with_its_response() {
        let mut h = history::History::new();
        let id = h.next_invocation_id();
        h.record_invoke(id, 0, "get", vec![], ValueBox::void());
        h.record_response(id, 0, "get", ValueBox::new(1_i32));

        let ops = extract(&h);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].key.kind, OperationKind::Plain);
        assert_eq!(ops[0].response.as_ref().unwrap().get::<i32>(), Some(&1));
    }

    #[test]
    fn splits_a_dual_pair_into_two_operations() {
        let mut h = history::History::new();
        let request = h.next_invocation_id();
        h.record_request_invoke(request, 0, "enqueue", vec!["1".to_string()], ValueBox::new(1_i32));
        h.record_request_response(request, 0, "enqueue");
        let follow_up = h.next_invocation_id();
        h.record_follow_up_invoke(follow_up, 0, "enqueue");
        h.record_follow_up_response(follow_up, 0, "enqueue", ValueBox::void());

        let ops = extract(&h);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].key.kind, OperationKind::Request);
        assert_eq!(ops[1].key.kind, OperationKind::FollowUp);
        assert!(ops[0].response_index.unwrap() < ops[1].invoke_index);
    }

    #[test]
    fn a_pending_invoke_has_no_response() {
        let mut h = history::History::new();
        let id = h.next_invocation_id();
        h.record_invoke(id, 0, "get", vec![], ValueBox::void());

        let ops = extract(&h);
        assert_eq!(ops.len(), 1);
        assert!(ops[0].response.is_none());
    }
}
