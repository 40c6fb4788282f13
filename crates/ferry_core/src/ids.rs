//! Call and callback identifiers
//!
//! Calls are numbered in enqueue order. A call that carries callbacks hands
//! the host up to two callback ids derived from its call id; the host echoes
//! one of them back through `invoke_callback` when the call completes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host-side module index, assigned by the host's module table.
pub type TargetId = u32;

/// Method index within a host module.
pub type MethodId = u32;

/// Sequence number of one enqueued call, unique for the bridge's lifetime.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CallId(u64);

impl CallId {
    pub const ZERO: CallId = CallId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Callback id for the failure half of this call.
    pub fn failure(self) -> CallbackId {
        CallbackId::encode(self, CallbackKind::Failure)
    }

    /// Callback id for the success half of this call.
    pub fn success(self) -> CallbackId {
        CallbackId::encode(self, CallbackKind::Success)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which half of a callback pair an id refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Failure,
    Success,
}

/// Callback identity as exchanged with the host.
///
/// Format: `[call id | tag bit]`
/// - Upper bits: the originating `CallId` shifted left by one
/// - Lowest bit: 1 for the success callback, 0 for the failure callback
///
/// The host implements the same packing, so this layout is part of the wire
/// contract.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(u64);

impl CallbackId {
    pub fn encode(call: CallId, kind: CallbackKind) -> Self {
        let tag = match kind {
            CallbackKind::Failure => 0,
            CallbackKind::Success => 1,
        };
        Self((call.0 << 1) | tag)
    }

    pub fn decode(self) -> (CallId, CallbackKind) {
        let kind = if self.0 & 1 == 1 {
            CallbackKind::Success
        } else {
            CallbackKind::Failure
        };
        (CallId(self.0 >> 1), kind)
    }

    pub fn call_id(self) -> CallId {
        self.decode().0
    }

    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CallbackId> for serde_json::Value {
    fn from(id: CallbackId) -> Self {
        serde_json::Value::from(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_ids_pack_call_id_and_tag() {
        let call = CallId::new(0);
        assert_eq!(call.failure().to_bits(), 0);
        assert_eq!(call.success().to_bits(), 1);

        let call = CallId::new(21);
        assert_eq!(call.failure().to_bits(), 42);
        assert_eq!(call.success().to_bits(), 43);
    }

    #[test]
    fn decode_inverts_encode() {
        let (call, kind) = CallbackId::from_bits(43).decode();
        assert_eq!(call, CallId::new(21));
        assert_eq!(kind, CallbackKind::Success);

        let (call, kind) = CallbackId::from_bits(42).decode();
        assert_eq!(call, CallId::new(21));
        assert_eq!(kind, CallbackKind::Failure);
    }

    #[test]
    fn callback_id_is_a_plain_integer_on_the_wire() {
        let value: serde_json::Value = CallId::new(3).success().into();
        assert_eq!(value, serde_json::json!(7));
        let parsed: CallbackId = serde_json::from_value(serde_json::json!(6)).unwrap();
        assert_eq!(parsed.decode(), (CallId::new(3), CallbackKind::Failure));
    }
}
