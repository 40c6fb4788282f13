//! Ferry Core
//!
//! The local half of an asynchronous, batched call bridge:
//! - Outbound calls to host modules, queued into columnar batches
//! - Callback ids for the host to answer those calls
//! - Named callable modules the host invokes, with lazy construction
//! - Fault isolation, spying and debug metadata around every dispatch
//!
//! Everything runs on the thread that owns the `Bridge`. The host pulls
//! batches after each inbound call, or is pushed one through `HostDrain`
//! when local code enqueues work on its own schedule.

pub mod bridge;
pub mod callbacks;
pub mod clock;
pub mod config;
mod debug_info;
pub mod encoder;
pub mod error;
pub mod host;
pub mod ids;
pub mod queue;
pub mod registry;
pub mod spy;
pub mod value;

pub use bridge::{Bridge, Immediate, ScheduledWork};
pub use callbacks::{callback, Callback};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BridgeConfig;
pub use error::{ArgumentIssue, BridgeError, CallError, FatalError, UnserializableReason};
pub use host::{DiagnosticsSink, FatalErrorHandler, HostDrain, LogFatalErrors, PENDING_QUEUE_GAUGE};
pub use ids::{CallId, CallbackId, CallbackKind, MethodId, TargetId};
pub use queue::OutboundBatch;
pub use registry::{CallableModule, CallableModuleBuilder, CallableRegistry};
pub use spy::{Direction, Spy, SpyRecord, SpySetting};
pub use value::{ScriptArray, ScriptObject, ScriptValue};

/// Bridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
