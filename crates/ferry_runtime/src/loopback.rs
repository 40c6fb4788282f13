//! In-process stand-in for the host runtime.
//!
//! Owns a numbered module table, executes every batch the bridge hands it
//! and answers callback-carrying calls through the bridge's inbound entry
//! points.

use ferry_core::{Bridge, CallbackId, HostDrain, MethodId, OutboundBatch, TargetId};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const STORAGE: TargetId = 0;
pub const DEVICE: TargetId = 1;

pub const STORAGE_GET: MethodId = 0;
pub const STORAGE_SET: MethodId = 1;
pub const DEVICE_NOW: MethodId = 0;

/// Result of one host method: an answer for the success callback, an error
/// for the failure callback, or nothing for fire-and-forget calls.
type Outcome = Result<Option<Value>, String>;

/// Batches pushed through `HostDrain` while local code runs on its own.
#[derive(Default)]
pub struct Inbox {
    batches: RefCell<VecDeque<OutboundBatch>>,
}

impl HostDrain for Inbox {
    fn flush_queue_immediate(&self, batch: OutboundBatch) {
        tracing::debug!(calls = batch.len(), "host received pushed batch");
        self.batches.borrow_mut().push_back(batch);
    }
}

#[derive(Default)]
pub struct LoopbackHost {
    store: HashMap<String, Value>,
    inbox: Rc<Inbox>,
    executed: usize,
}

impl LoopbackHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the module table to the bridge and install the push path.
    pub fn attach(&self, bridge: &Bridge) {
        bridge.create_debug_lookup(STORAGE, "Storage", &["get".to_string(), "set".to_string()]);
        bridge.create_debug_lookup(DEVICE, "Device", &["now".to_string()]);
        let drain: Rc<dyn HostDrain> = self.inbox.clone();
        bridge.set_host_drain(Some(drain));
    }

    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Execute `batch`, then every batch it causes, until the bridge goes
    /// quiet.
    pub fn pump(&mut self, bridge: &Bridge, batch: Option<OutboundBatch>) {
        let mut pending: VecDeque<OutboundBatch> = batch.into_iter().collect();
        loop {
            pending.extend(self.inbox.batches.borrow_mut().drain(..));
            let Some(current) = pending.pop_front().or_else(|| bridge.flushed_queue()) else {
                break;
            };
            for (id, args) in self.execute(&current) {
                pending.extend(bridge.invoke_callback_and_return_flushed_queue(id, args));
            }
        }
    }

    fn execute(&mut self, batch: &OutboundBatch) -> Vec<(CallbackId, Vec<Value>)> {
        let mut answers = Vec::new();
        for (target, method, args) in batch.calls() {
            self.executed += 1;
            let (args, on_fail, on_succ) = split_callbacks(args);
            let outcome = self.dispatch(target, method, args);
            match (outcome, on_fail, on_succ) {
                (Ok(Some(value)), _, Some(on_succ)) => answers.push((on_succ, vec![value])),
                (Err(message), Some(on_fail), _) => answers.push((on_fail, vec![json!(message)])),
                (Err(message), None, _) => {
                    tracing::warn!(
                        target_id = target,
                        method_id = method,
                        "host call failed with no one listening: {message}"
                    );
                }
                _ => {}
            }
        }
        answers
    }

    fn dispatch(&mut self, target: TargetId, method: MethodId, args: &[Value]) -> Outcome {
        match (target, method) {
            (STORAGE, STORAGE_GET) => {
                let key = string_arg(args, 0)?;
                self.store
                    .get(key)
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| format!("no value stored under {key}"))
            }
            (STORAGE, STORAGE_SET) => {
                let key = string_arg(args, 0)?.to_string();
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                self.store.insert(key, value);
                Ok(Some(Value::Null))
            }
            (DEVICE, DEVICE_NOW) => {
                let millis = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_err(|err| err.to_string())?
                    .as_millis() as u64;
                Ok(Some(json!(millis)))
            }
            _ => Err(format!("no host method {target}.{method}")),
        }
    }
}

/// Peel trailing callback ids off a call's arguments.
///
/// The loopback host has no method metadata, so it relies on convention:
/// a callback-carrying call ends in a failure/success id pair sharing one
/// call id.
fn split_callbacks(args: &[Value]) -> (&[Value], Option<CallbackId>, Option<CallbackId>) {
    let id_at = |index: usize| args.get(index).and_then(Value::as_u64).map(CallbackId::from_bits);
    let len = args.len();
    if len >= 2 {
        if let (Some(fail), Some(succ)) = (id_at(len - 2), id_at(len - 1)) {
            if fail.call_id() == succ.call_id() && fail != succ {
                return (&args[..len - 2], Some(fail), Some(succ));
            }
        }
    }
    (args, None, None)
}

fn string_arg(args: &[Value], index: usize) -> Result<&str, String> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {index} must be a string"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::CallId;

    #[test]
    fn trailing_callback_pairs_are_split_off() {
        let call = CallId::new(4);
        let args = vec![json!("key"), call.failure().into(), call.success().into()];
        let (rest, fail, succ) = split_callbacks(&args);
        assert_eq!(rest, &[json!("key")]);
        assert_eq!(fail, Some(call.failure()));
        assert_eq!(succ, Some(call.success()));

        let args = vec![json!("key"), json!(1), json!(2)];
        let (rest, fail, succ) = split_callbacks(&args);
        assert_eq!(rest.len(), 3);
        assert!(fail.is_none() && succ.is_none());
    }

    #[test]
    fn storage_round_trips_values() {
        let mut host = LoopbackHost::new();
        assert!(host.dispatch(STORAGE, STORAGE_GET, &[json!("k")]).is_err());
        host.dispatch(STORAGE, STORAGE_SET, &[json!("k"), json!(7)]).unwrap();
        assert_eq!(
            host.dispatch(STORAGE, STORAGE_GET, &[json!("k")]).unwrap(),
            Some(json!(7))
        );
        assert!(host.dispatch(9, 0, &[]).is_err());
    }
}
