//! Outbound call batches
//!
//! Calls accumulate column-wise: target ids, method ids and argument lists
//! are parallel vectors, plus the call id counter value the batch started at.
//! On the wire a batch is the 4-element array
//! `[targetIds, methodIds, argsPerCall, nextCallId]`.

use crate::ids::{CallId, MethodId, TargetId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::mem;

/// Calls enqueued since the last flush.
///
/// Invariant: the three call columns always have equal length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutboundBatch {
    target_ids: Vec<TargetId>,
    method_ids: Vec<MethodId>,
    args: Vec<Vec<Value>>,
    next_call_id: CallId,
}

impl OutboundBatch {
    /// Empty batch whose first call will be numbered `next_call_id`.
    pub fn new(next_call_id: CallId) -> Self {
        Self {
            target_ids: Vec::new(),
            method_ids: Vec::new(),
            args: Vec::new(),
            next_call_id,
        }
    }

    pub(crate) fn push(&mut self, target: TargetId, method: MethodId, args: Vec<Value>) {
        self.target_ids.push(target);
        self.method_ids.push(method);
        self.args.push(args);
    }

    pub fn len(&self) -> usize {
        self.target_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target_ids.is_empty()
    }

    pub fn target_ids(&self) -> &[TargetId] {
        &self.target_ids
    }

    pub fn method_ids(&self) -> &[MethodId] {
        &self.method_ids
    }

    pub fn args(&self) -> &[Vec<Value>] {
        &self.args
    }

    /// Call id counter value at the time this batch was started.
    pub fn next_call_id(&self) -> CallId {
        self.next_call_id
    }

    /// Calls in enqueue order.
    pub fn calls(&self) -> impl Iterator<Item = (TargetId, MethodId, &[Value])> {
        self.target_ids
            .iter()
            .zip(&self.method_ids)
            .zip(&self.args)
            .map(|((&target, &method), args)| (target, method, args.as_slice()))
    }
}

impl Serialize for OutboundBatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.target_ids, &self.method_ids, &self.args, self.next_call_id).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OutboundBatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (target_ids, method_ids, args, next_call_id): (
            Vec<TargetId>,
            Vec<MethodId>,
            Vec<Vec<Value>>,
            CallId,
        ) = Deserialize::deserialize(deserializer)?;
        if target_ids.len() != method_ids.len() || target_ids.len() != args.len() {
            return Err(serde::de::Error::custom(format!(
                "batch columns differ in length ({} targets, {} methods, {} argument lists)",
                target_ids.len(),
                method_ids.len(),
                args.len()
            )));
        }
        Ok(Self {
            target_ids,
            method_ids,
            args,
            next_call_id,
        })
    }
}

/// The pending batch, swapped out whole on flush.
#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    batch: OutboundBatch,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, target: TargetId, method: MethodId, args: Vec<Value>) {
        self.batch.push(target, method, args);
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Hand out the current batch and start a fresh one at `next_call_id`.
    pub fn swap(&mut self, next_call_id: CallId) -> OutboundBatch {
        mem::replace(&mut self.batch, OutboundBatch::new(next_call_id))
    }

    /// Like `swap`, but an empty batch is reported as absent.
    pub fn take(&mut self, next_call_id: CallId) -> Option<OutboundBatch> {
        let batch = self.swap(next_call_id);
        (!batch.is_empty()).then_some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn calls_iterate_in_enqueue_order() {
        let mut queue = OutboundQueue::new();
        queue.push(3, 1, vec![json!("a")]);
        queue.push(4, 0, vec![]);
        let batch = queue.swap(CallId::new(2));

        let calls: Vec<_> = batch.calls().collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (3, 1, &[json!("a")][..]));
        assert_eq!(calls[1], (4, 0, &[][..]));
        assert_eq!(batch.next_call_id(), CallId::ZERO);
    }

    #[test]
    fn take_reports_empty_batches_as_absent() {
        let mut queue = OutboundQueue::new();
        assert!(queue.take(CallId::new(0)).is_none());

        queue.push(1, 1, vec![]);
        let batch = queue.take(CallId::new(1)).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.swap(CallId::new(1)).next_call_id(), CallId::new(1));
    }

    #[test]
    fn batch_serializes_as_four_element_array() {
        let mut batch = OutboundBatch::new(CallId::new(7));
        batch.push(3, 1, vec![json!("x"), json!(0), json!(1)]);

        let wire = serde_json::to_value(&batch).unwrap();
        assert_eq!(wire, json!([[3], [1], [["x", 0, 1]], 7]));

        let back: OutboundBatch = serde_json::from_value(wire).unwrap();
        assert_eq!(back, batch);
    }

    #[test]
    fn ragged_batches_are_rejected() {
        let result: Result<OutboundBatch, _> =
            serde_json::from_value(json!([[1, 2], [1], [[]], 0]));
        assert!(result.is_err());
    }
}
