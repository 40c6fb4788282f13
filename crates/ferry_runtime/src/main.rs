//! Ferry Runtime
//!
//! Minimal binary that boots logging, wires a loopback host to a bridge and
//! runs a short session through it.
//!
//! Usage: `ferry [config.json]`. Log output follows `RUST_LOG`.

mod loopback;

use anyhow::{Context, Result};
use ferry_core::{
    callback, Bridge, BridgeConfig, BridgeError, CallError, CallableModule, DiagnosticsSink,
    PENDING_QUEUE_GAUGE,
};
use ferry_metrics::Counter;
use loopback::{LoopbackHost, DEVICE, DEVICE_NOW, STORAGE, STORAGE_GET, STORAGE_SET};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Ferry v{}", ferry_core::VERSION);

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path))?,
        None => BridgeConfig::default(),
    };
    tracing::debug!(?config, "bridge configuration");

    let bridge = Bridge::new(config);
    let gauges = Rc::new(RefCell::new(Counter::new()));
    let sink: Rc<dyn DiagnosticsSink> = gauges.clone();
    bridge.set_diagnostics_sink(Some(sink));
    bridge.register_callable("App", app_module());

    let mut host = LoopbackHost::new();
    host.attach(&bridge);

    // Nothing has flushed yet, so this call is pushed to the host at once.
    bridge
        .enqueue_call(STORAGE, STORAGE_SET, vec!["session".into(), "boot".into()], None, None)
        .context("enqueueing boot marker")?;
    host.pump(&bridge, None);

    let batch = bridge.call_function_return_flushed_queue("App", "start", vec![json!("ferry")]);
    host.pump(&bridge, batch);

    tracing::info!(
        host_calls = host.executed(),
        pending_callbacks = bridge.pending_callbacks(),
        queue_high_water = gauges.borrow().high_water(PENDING_QUEUE_GAUGE),
        "session finished"
    );
    for (name, value) in gauges.borrow().iter() {
        tracing::debug!(gauge = %name, value, "final gauge");
    }
    let start = bridge.section_stats("App.start()");
    tracing::info!(calls = start.calls, total = ?start.total, "App.start() timing");

    Ok(())
}

fn load_config(path: &Path) -> Result<BridgeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn to_call_error(err: BridgeError) -> CallError {
    CallError::new(err.to_string())
}

/// Local module the host starts the session through.
fn app_module() -> CallableModule {
    CallableModule::builder("App")
        .method_with("start", |bridge, (user,): (String,)| {
            bridge
                .enqueue_call(
                    STORAGE,
                    STORAGE_SET,
                    vec!["user".into(), user.into()],
                    None,
                    None,
                )
                .map_err(to_call_error)?;

            bridge
                .enqueue_call(
                    STORAGE,
                    STORAGE_GET,
                    vec!["user".into()],
                    Some(callback(|_bridge, args| {
                        Err(CallError::new("stored user vanished").with_details(Value::Array(args)))
                    })),
                    Some(callback(|bridge, args| {
                        tracing::info!("hello, {}", args.first().unwrap_or(&serde_json::Value::Null));
                        ask_for_time(bridge).map_err(to_call_error)
                    })),
                )
                .map_err(to_call_error)?;

            bridge
                .enqueue_call(
                    STORAGE,
                    STORAGE_GET,
                    vec!["theme".into()],
                    Some(callback(|_bridge, args| {
                        let reason = args.first().unwrap_or(&Value::Null);
                        tracing::info!("no theme stored ({reason}), using defaults");
                        Ok(())
                    })),
                    Some(callback(|_bridge, args| {
                        tracing::info!("theme: {}", args.first().unwrap_or(&serde_json::Value::Null));
                        Ok(())
                    })),
                )
                .map_err(to_call_error)?;
            Ok(())
        })
        .build()
}

fn ask_for_time(bridge: &Bridge) -> Result<(), BridgeError> {
    bridge.enqueue_call(
        DEVICE,
        DEVICE_NOW,
        vec![],
        Some(callback(|_bridge, args| {
            Err(CallError::new("device clock unavailable").with_details(Value::Array(args)))
        })),
        Some(callback(|_bridge, args| {
            tracing::info!(now = %args.first().unwrap_or(&serde_json::Value::Null), "device time");
            Ok(())
        })),
    )?;
    Ok(())
}
