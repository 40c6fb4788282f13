//! Pending callbacks, keyed by the call id that registered them.

use crate::bridge::Bridge;
use crate::error::CallError;
use crate::ids::{CallId, CallbackId, CallbackKind};
use serde_json::Value;
use std::collections::HashMap;

/// A one-shot continuation for an outbound call.
pub type Callback = Box<dyn FnOnce(&Bridge, Vec<Value>) -> Result<(), CallError>>;

/// Box a closure as a `Callback`.
pub fn callback<F>(f: F) -> Callback
where
    F: FnOnce(&Bridge, Vec<Value>) -> Result<(), CallError> + 'static,
{
    Box::new(f)
}

/// Success and failure slots per call id.
///
/// Taking either half clears both, so at most one callback per call ever
/// runs. Entries the host never answers stay here for the bridge's lifetime.
#[derive(Default)]
pub(crate) struct PendingCallbackTable {
    success: HashMap<CallId, Callback>,
    failure: HashMap<CallId, Callback>,
}

impl PendingCallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, call: CallId, on_fail: Option<Callback>, on_succ: Option<Callback>) {
        if let Some(callback) = on_fail {
            self.failure.insert(call, callback);
        }
        if let Some(callback) = on_succ {
            self.success.insert(call, callback);
        }
    }

    /// Remove and return the callback `id` names, clearing its sibling too.
    /// Absent (never registered or already consumed) leaves the table as is.
    pub fn take(&mut self, id: CallbackId) -> Option<Callback> {
        let (call, kind) = id.decode();
        let callback = match kind {
            CallbackKind::Success => self.success.remove(&call),
            CallbackKind::Failure => self.failure.remove(&call),
        }?;
        self.success.remove(&call);
        self.failure.remove(&call);
        Some(callback)
    }

    pub fn contains(&self, id: CallbackId) -> bool {
        let (call, kind) = id.decode();
        match kind {
            CallbackKind::Success => self.success.contains_key(&call),
            CallbackKind::Failure => self.failure.contains_key(&call),
        }
    }

    /// Number of calls with at least one outstanding callback.
    pub fn pending_calls(&self) -> usize {
        self.success.len()
            + self
                .failure
                .keys()
                .filter(|call| !self.success.contains_key(call))
                .count()
    }
}
