//! Collaborators supplied by the host side of the bridge.

use crate::error::FatalError;
use crate::queue::OutboundBatch;
use ferry_metrics::Counter;
use std::cell::RefCell;

/// Gauge name for the number of calls waiting in the current batch.
pub const PENDING_QUEUE_GAUGE: &str = "pending_to_host_queue";

/// Push primitive: the host accepts a batch synchronously, outside its own
/// pull schedule.
pub trait HostDrain {
    fn flush_queue_immediate(&self, batch: OutboundBatch);
}

impl<F> HostDrain for F
where
    F: Fn(OutboundBatch),
{
    fn flush_queue_immediate(&self, batch: OutboundBatch) {
        self(batch)
    }
}

/// Receives every failure caught at the dispatch guard.
pub trait FatalErrorHandler {
    fn report_fatal_error(&self, error: &FatalError);
}

impl<F> FatalErrorHandler for F
where
    F: Fn(&FatalError),
{
    fn report_fatal_error(&self, error: &FatalError) {
        self(error)
    }
}

/// Default handler: log at `error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFatalErrors;

impl FatalErrorHandler for LogFatalErrors {
    fn report_fatal_error(&self, error: &FatalError) {
        tracing::error!(
            target: "ferry::bridge",
            call_site = error.call_site.as_deref().unwrap_or("<unknown>"),
            details = ?error.details(),
            "fatal error in bridge call: {}",
            error.error
        );
    }
}

/// Observability sink for queue gauges.
pub trait DiagnosticsSink {
    fn gauge(&self, name: &'static str, value: usize);
}

impl DiagnosticsSink for RefCell<Counter> {
    fn gauge(&self, name: &'static str, value: usize) {
        self.borrow_mut().set(name, value);
    }
}
