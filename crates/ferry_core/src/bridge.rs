//! The call bridge
//!
//! Owns the outbound batch, the call id counter and the pending callback
//! table. Every operation is synchronous and runs on the caller's thread;
//! results come back later as new inbound calls.
//!
//! ## Reentrancy
//!
//! No internal borrow is held while user code runs (callable methods,
//! callbacks, factories, the spy, the host drain, the diagnostics sink or the
//! scheduled-work hook).
//! User code may therefore call back into the bridge freely: calls enqueued
//! while a host call is being dispatched land in the batch returned by the
//! following flush.

use crate::callbacks::{Callback, PendingCallbackTable};
use crate::clock::{Clock, SystemClock};
use crate::config::BridgeConfig;
use crate::debug_info::DebugMetadata;
use crate::encoder::encode_arguments;
use crate::error::{BridgeError, CallError, FatalError};
use crate::host::{DiagnosticsSink, FatalErrorHandler, HostDrain, LogFatalErrors, PENDING_QUEUE_GAUGE};
use crate::ids::{CallId, CallbackId, MethodId, TargetId};
use crate::queue::{OutboundBatch, OutboundQueue};
use crate::registry::{CallableModule, CallableRegistry};
use crate::spy::{Direction, Spy, SpyRecord, SpySetting};
use crate::value::ScriptValue;
use ferry_metrics::{CallProfiler, SectionStats};
use serde_json::Value;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Work run once per flush before the batch is handed back to the host.
pub type ScheduledWork = Rc<dyn Fn(&Bridge) -> Result<(), CallError>>;

/// A one-shot task for the next flush.
pub type Immediate = Box<dyn FnOnce(&Bridge) -> Result<(), CallError>>;

const SCHEDULED_WORK: &str = "scheduled work";

pub struct Bridge {
    config: BridgeConfig,
    clock: Box<dyn Clock>,
    registry: CallableRegistry,
    queue: RefCell<OutboundQueue>,
    next_call_id: Cell<CallId>,
    callbacks: RefCell<PendingCallbackTable>,
    debug: RefCell<DebugMetadata>,
    spy: RefCell<Option<Spy>>,
    host_drain: RefCell<Option<Rc<dyn HostDrain>>>,
    fatal_handler: RefCell<Rc<dyn FatalErrorHandler>>,
    diagnostics: RefCell<Option<Rc<dyn DiagnosticsSink>>>,
    scheduled_work: RefCell<Option<ScheduledWork>>,
    immediates: RefCell<VecDeque<Immediate>>,
    profiler: RefCell<CallProfiler>,
    last_flush: Cell<Option<Instant>>,
    event_loop_start: Cell<Instant>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    pub fn with_clock(config: BridgeConfig, clock: impl Clock + 'static) -> Self {
        let now = clock.now();
        let debug = DebugMetadata::new(config.debug_metadata, config.debug_info_capacity);
        let spy = SpySetting::from(config.spy).into_spy();
        let fatal_handler: Rc<dyn FatalErrorHandler> = Rc::new(LogFatalErrors);
        Self {
            config,
            clock: Box::new(clock),
            registry: CallableRegistry::new(),
            queue: RefCell::new(OutboundQueue::new()),
            next_call_id: Cell::new(CallId::ZERO),
            callbacks: RefCell::new(PendingCallbackTable::new()),
            debug: RefCell::new(debug),
            spy: RefCell::new(spy),
            host_drain: RefCell::new(None),
            fatal_handler: RefCell::new(fatal_handler),
            diagnostics: RefCell::new(None),
            scheduled_work: RefCell::new(None),
            immediates: RefCell::new(VecDeque::new()),
            profiler: RefCell::new(CallProfiler::new()),
            last_flush: Cell::new(None),
            event_loop_start: Cell::new(now),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Collaborators
    // ------------------------------------------------------------------

    /// Install (or remove) the host's push primitive. Without one, batches
    /// wait until the host pulls them.
    pub fn set_host_drain(&self, drain: Option<Rc<dyn HostDrain>>) {
        *self.host_drain.borrow_mut() = drain;
    }

    pub fn set_fatal_error_handler(&self, handler: Rc<dyn FatalErrorHandler>) {
        *self.fatal_handler.borrow_mut() = handler;
    }

    pub fn set_diagnostics_sink(&self, sink: Option<Rc<dyn DiagnosticsSink>>) {
        *self.diagnostics.borrow_mut() = sink;
    }

    pub fn set_spy(&self, setting: impl Into<SpySetting>) {
        *self.spy.borrow_mut() = setting.into().into_spy();
    }

    /// Install the hook run at the start of every flush, replacing any
    /// previous one.
    pub fn set_scheduled_work<F>(&self, work: F)
    where
        F: Fn(&Bridge) -> Result<(), CallError> + 'static,
    {
        *self.scheduled_work.borrow_mut() = Some(Rc::new(work));
    }

    pub fn clear_scheduled_work(&self) {
        self.scheduled_work.borrow_mut().take();
    }

    /// Queue a task for the next flush. Tasks queued while draining run in
    /// the same drain.
    pub fn set_immediate<F>(&self, task: F)
    where
        F: FnOnce(&Bridge) -> Result<(), CallError> + 'static,
    {
        self.immediates.borrow_mut().push_back(Box::new(task));
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub fn register_callable(&self, name: impl Into<String>, module: CallableModule) {
        self.registry.register(name, module);
    }

    pub fn register_lazy_callable<F>(&self, name: impl Into<String>, factory: F)
    where
        F: FnOnce() -> CallableModule + 'static,
    {
        self.registry.register_lazy(name, factory);
    }

    pub fn get_callable(&self, name: &str) -> Option<Rc<CallableModule>> {
        self.registry.get(name)
    }

    /// Associate host module and method names with numeric ids for
    /// diagnostics. Does nothing unless debug metadata is enabled.
    pub fn create_debug_lookup(&self, target: TargetId, name: &str, methods: &[String]) {
        self.debug.borrow_mut().create_lookup(target, name, methods);
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Queue a call to host method `target.method`.
    ///
    /// Callback ids for the supplied callbacks are appended to the
    /// arguments, failure before success. Arguments that cannot cross the
    /// bridge drop the whole call: nothing is queued, no callback is kept
    /// and the call id counter does not move.
    pub fn enqueue_call(
        &self,
        target: TargetId,
        method: MethodId,
        args: Vec<ScriptValue>,
        on_fail: Option<Callback>,
        on_succ: Option<Callback>,
    ) -> Result<CallId, BridgeError> {
        let mut wire = match encode_arguments(&args) {
            Ok(wire) => wire,
            Err(err) => {
                tracing::warn!(
                    target: "ferry::bridge",
                    call = %self.debug.borrow().describe(target, method),
                    "dropping host call with arguments that cannot be serialized"
                );
                return Err(err);
            }
        };

        let call = self.next_call_id.get();
        if on_fail.is_some() || on_succ.is_some() {
            self.debug.borrow_mut().record_call(call, target, method);
            if on_fail.is_some() {
                wire.push(call.failure().into());
            }
            if on_succ.is_some() {
                wire.push(call.success().into());
            }
            self.callbacks.borrow_mut().register(call, on_fail, on_succ);
            tracing::trace!(target: "ferry::bridge", call_id = call.raw(), "async flow begin");
        }

        self.emit_outbound_spy(target, method, &wire);

        self.next_call_id.set(call.next());
        self.queue.borrow_mut().push(target, method, wire);
        self.maybe_flush_immediately();
        self.report_queue_length();

        Ok(call)
    }

    /// Swap out the pending batch. Returns `None` when nothing was queued.
    pub fn take_queue(&self) -> Option<OutboundBatch> {
        let batch = self.queue.borrow_mut().take(self.next_call_id.get());
        self.report_queue_length();
        if let Some(batch) = &batch {
            tracing::debug!(target: "ferry::bridge", calls = batch.len(), "batch taken by host");
        }
        batch
    }

    /// Run scheduled work, then swap out the pending batch.
    pub fn flushed_queue(&self) -> Option<OutboundBatch> {
        self.guard(SCHEDULED_WORK, None, || self.drain_scheduled_work());
        self.take_queue()
    }

    fn maybe_flush_immediately(&self) {
        let drain = self.host_drain.borrow().clone();
        let Some(drain) = drain else {
            return;
        };
        let now = self.clock.now();
        let due = self.last_flush.get().map_or(true, |last| {
            now.saturating_duration_since(last) >= self.config.min_flush_interval()
        });
        if !due {
            return;
        }
        let batch = self.queue.borrow_mut().swap(self.next_call_id.get());
        self.last_flush.set(Some(now));
        tracing::debug!(target: "ferry::bridge", calls = batch.len(), "flushing batch to host immediately");
        drain.flush_queue_immediate(batch);
    }

    fn report_queue_length(&self) {
        let sink = self.diagnostics.borrow().clone();
        if let Some(sink) = sink {
            let len = self.queue.borrow().len();
            sink.gauge(PENDING_QUEUE_GAUGE, len);
        }
    }

    fn emit_outbound_spy(&self, target: TargetId, method: MethodId, args: &[Value]) {
        let spy = self.spy.borrow().clone();
        let Some(spy) = spy else {
            return;
        };
        let (module, method) = {
            let debug = self.debug.borrow();
            let module = debug
                .module_name(target)
                .map(str::to_string)
                .unwrap_or_else(|| target.to_string());
            let method = debug
                .method_name(target, method)
                .map(str::to_string)
                .unwrap_or_else(|| method.to_string());
            (module, method)
        };
        spy(&SpyRecord {
            direction: Direction::ToHost,
            module: Some(&module),
            method: &method,
            args,
        });
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Host entry point: run `module.method(args)`, then flush.
    pub fn call_function_return_flushed_queue(
        &self,
        module: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Option<OutboundBatch> {
        self.invoke(module, method, args);
        self.flushed_queue()
    }

    /// Host entry point: run `module.method(args)`, then flush, returning
    /// the call's result alongside the batch.
    pub fn call_function_return_result_and_flushed_queue(
        &self,
        module: &str,
        method: &str,
        args: Vec<Value>,
    ) -> (Option<Value>, Option<OutboundBatch>) {
        let result = self.invoke(module, method, args);
        (result, self.flushed_queue())
    }

    /// Host entry point: run a pending callback, then flush.
    pub fn invoke_callback_and_return_flushed_queue(
        &self,
        id: CallbackId,
        args: Vec<Value>,
    ) -> Option<OutboundBatch> {
        self.invoke_callback(id, args);
        self.flushed_queue()
    }

    /// Run a registered method under the dispatch guard. Failures go to the
    /// fatal error handler and yield `None`.
    pub fn invoke(&self, module: &str, method: &str, args: Vec<Value>) -> Option<Value> {
        let site = format!("{module}.{method}");
        self.guard(&site, Some(site.clone()), || {
            self.call_function(module, method, args)
        })
    }

    /// Run the callback `id` names under the dispatch guard. Returns whether
    /// a callback ran to completion; an unknown or already consumed id is a
    /// logged no-op.
    pub fn invoke_callback(&self, id: CallbackId, args: Vec<Value>) -> bool {
        let site = self.debug.borrow().call_site(id.call_id());
        self.guard("callback", site, || self.call_callback(id, args))
            .unwrap_or(false)
    }

    fn call_function(&self, module: &str, method: &str, args: Vec<Value>) -> Result<Value, BridgeError> {
        self.mark_inbound_activity();
        let _span = tracing::trace_span!(target: "ferry::bridge", "bridge.invoke", module, method).entered();

        let spy = self.spy.borrow().clone();
        if let Some(spy) = spy {
            spy(&SpyRecord {
                direction: Direction::ToLocal,
                module: Some(module),
                method,
                args: &args,
            });
        }

        let callable = self.registry.get(module).ok_or_else(|| BridgeError::UnknownModule {
            module: module.to_string(),
            method: method.to_string(),
        })?;
        let function = callable.method(method).ok_or_else(|| BridgeError::UnknownMethod {
            module: module.to_string(),
            method: method.to_string(),
        })?;

        let label = format!("{module}.{method}()");
        let started = Instant::now();
        let result = function(self, args);
        self.profiler.borrow_mut().record(&label, started.elapsed());
        result.map_err(|source| BridgeError::Callee {
            context: label,
            source,
        })
    }

    fn call_callback(&self, id: CallbackId, args: Vec<Value>) -> Result<bool, BridgeError> {
        self.mark_inbound_activity();

        let label = self.debug.borrow().callback_label(id);
        let callback = self.callbacks.borrow_mut().take(id);
        let Some(callback) = callback else {
            let error = BridgeError::MissingCallback {
                callback_id: id,
                message: self.debug.borrow().missing_callback_message(id),
            };
            tracing::warn!(target: "ferry::bridge", callback_id = id.to_bits(), "{error}");
            return Ok(false);
        };

        let _span = tracing::trace_span!(target: "ferry::bridge", "bridge.callback", label = %label).entered();
        let spy = self.spy.borrow().clone();
        if let Some(spy) = spy {
            spy(&SpyRecord {
                direction: Direction::ToLocal,
                module: None,
                method: &label,
                args: &args,
            });
        }

        let started = Instant::now();
        let result = callback(self, args);
        self.profiler.borrow_mut().record(&label, started.elapsed());
        result.map_err(|source| BridgeError::Callee {
            context: label,
            source,
        })?;
        Ok(true)
    }

    fn drain_scheduled_work(&self) -> Result<(), BridgeError> {
        let _span = tracing::trace_span!(target: "ferry::bridge", "bridge.scheduled_work").entered();
        let started = Instant::now();
        let result = self.run_scheduled_work();
        self.profiler
            .borrow_mut()
            .record(SCHEDULED_WORK, started.elapsed());
        result.map_err(|source| BridgeError::Callee {
            context: SCHEDULED_WORK.to_string(),
            source,
        })
    }

    fn run_scheduled_work(&self) -> Result<(), CallError> {
        let hook = self.scheduled_work.borrow().clone();
        if let Some(hook) = hook {
            hook(self)?;
        }
        loop {
            let next = self.immediates.borrow_mut().pop_front();
            match next {
                Some(task) => task(self)?,
                None => return Ok(()),
            }
        }
    }

    fn mark_inbound_activity(&self) {
        let now = self.clock.now();
        self.last_flush.set(Some(now));
        self.event_loop_start.set(now);
    }

    // ------------------------------------------------------------------
    // Fault isolation
    // ------------------------------------------------------------------

    /// Run `f`, handing any error or panic to the fatal error handler.
    ///
    /// With `pause_on_throw` set, panics are not caught and unwind into the
    /// host so an attached debugger stops at the original site.
    fn guard<T, F>(&self, context: &str, call_site: Option<String>, f: F) -> Option<T>
    where
        F: FnOnce() -> Result<T, BridgeError>,
    {
        let outcome = if self.config.pause_on_throw {
            f()
        } else {
            match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(outcome) => outcome,
                Err(payload) => Err(BridgeError::Panicked {
                    context: context.to_string(),
                    message: panic_message(payload.as_ref()),
                }),
            }
        };

        match outcome {
            Ok(value) => Some(value),
            Err(error) => {
                self.report_fatal(FatalError { error, call_site });
                None
            }
        }
    }

    fn report_fatal(&self, error: FatalError) {
        let handler = Rc::clone(&*self.fatal_handler.borrow());
        handler.report_fatal_error(&error);
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Time since the first inbound call after the previous flush (or since
    /// the bridge was created).
    pub fn event_loop_running_time(&self) -> Duration {
        self.clock
            .now()
            .saturating_duration_since(self.event_loop_start.get())
    }

    /// Id the next enqueued call will receive.
    pub fn next_call_id(&self) -> CallId {
        self.next_call_id.get()
    }

    /// Calls waiting in the current batch.
    pub fn queued_calls(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Calls with at least one callback the host has not answered yet.
    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.borrow().pending_calls()
    }

    pub fn has_pending_callback(&self, id: CallbackId) -> bool {
        self.callbacks.borrow().contains(id)
    }

    /// Accumulated timing for one profiled section, e.g. `"Logger.log()"`.
    pub fn section_stats(&self, name: &str) -> SectionStats {
        self.profiler.borrow().stats(name)
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
