//! Human-readable names for host modules and recent calls.
//!
//! Only populated when `BridgeConfig::debug_metadata` is set. Lookups fall
//! back to raw numeric ids, so diagnostics degrade rather than fail.

use crate::ids::{CallId, CallbackId, MethodId, TargetId};
use ferry_metrics::RingBuffer;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CallSite {
    call: CallId,
    target: TargetId,
    method: MethodId,
}

#[derive(Debug)]
struct HostModuleNames {
    name: String,
    methods: Vec<String>,
}

pub(crate) struct DebugMetadata {
    enabled: bool,
    modules: HashMap<TargetId, HostModuleNames>,
    recent_calls: RingBuffer<CallSite>,
}

impl DebugMetadata {
    pub fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            enabled,
            modules: HashMap::new(),
            recent_calls: RingBuffer::new(if enabled { capacity } else { 0 }),
        }
    }

    pub fn create_lookup(&mut self, target: TargetId, name: &str, methods: &[String]) {
        if !self.enabled {
            return;
        }
        let entry = HostModuleNames {
            name: name.to_string(),
            methods: methods.to_vec(),
        };
        if let Some(previous) = self.modules.insert(target, entry) {
            if previous.name != name {
                tracing::warn!(
                    target: "ferry::bridge",
                    target_id = target,
                    previous = %previous.name,
                    name,
                    "host module id reassigned to a different name"
                );
            }
        }
    }

    pub fn record_call(&mut self, call: CallId, target: TargetId, method: MethodId) {
        if self.enabled {
            self.recent_calls.push(CallSite {
                call,
                target,
                method,
            });
        }
    }

    pub fn module_name(&self, target: TargetId) -> Option<&str> {
        self.modules.get(&target).map(|module| module.name.as_str())
    }

    pub fn method_name(&self, target: TargetId, method: MethodId) -> Option<&str> {
        self.modules
            .get(&target)?
            .methods
            .get(method as usize)
            .map(String::as_str)
    }

    /// `Module.method` for a call still in the recent-call ring.
    pub fn call_site(&self, call: CallId) -> Option<String> {
        let site = self.recent_calls.find_latest(|site| site.call == call)?;
        Some(self.describe(site.target, site.method))
    }

    /// `Module.method`, with raw ids standing in for unknown names.
    pub fn describe(&self, target: TargetId, method: MethodId) -> String {
        let module = self
            .module_name(target)
            .map(str::to_string)
            .unwrap_or_else(|| target.to_string());
        let method = self
            .method_name(target, method)
            .map(str::to_string)
            .unwrap_or_else(|| method.to_string());
        format!("{module}.{method}")
    }

    /// Label used for spy records and trace spans around a callback.
    pub fn callback_label(&self, id: CallbackId) -> String {
        match self.call_site(id.call_id()) {
            Some(site) => format!("<callback for {site}>"),
            None => id.to_string(),
        }
    }

    pub fn missing_callback_message(&self, id: CallbackId) -> String {
        let Some(site) = self
            .recent_calls
            .find_latest(|site| site.call == id.call_id())
        else {
            return format!("Callback with id {id}: not found");
        };
        let module = self.module_name(site.target);
        let method = self.method_name(site.target, site.method);
        match (module, method) {
            (Some(module), Some(method)) => format!(
                "The callback {method}() exists in module {module}, but only one callback \
                 may be registered to a function in a host module."
            ),
            _ => format!(
                "Callback with id {id}: {}() not found",
                self.describe(site.target, site.method)
            ),
        }
    }
}
