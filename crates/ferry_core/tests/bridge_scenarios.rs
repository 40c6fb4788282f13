//! End-to-end bridge scenarios driven by a loopback host.
//!
//! The host side here is a tiny in-process module table: it executes each
//! batch it receives and answers callbacks through the bridge's inbound entry
//! points, the same way a real host would across a runtime boundary.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use ferry_core::{
    callback, Bridge, BridgeConfig, CallError, CallId, CallableModule, CallbackId, FatalError,
    OutboundBatch, ScriptValue,
};
use proptest::prelude::*;
use serde_json::{json, Value};

const STORAGE: u32 = 0;
const GET: u32 = 0;
const SET: u32 = 1;

/// Host-side key/value module answering through callbacks.
#[derive(Default)]
struct LoopbackHost {
    store: HashMap<String, Value>,
}

impl LoopbackHost {
    /// Execute every call in `batch` and return the callbacks to fire.
    fn execute(&mut self, batch: &OutboundBatch) -> Vec<(CallbackId, Vec<Value>)> {
        let mut answers = Vec::new();
        for (target, method, args) in batch.calls() {
            assert_eq!(target, STORAGE);
            match method {
                GET => {
                    let key = args[0].as_str().unwrap_or_default();
                    let on_fail = CallbackId::from_bits(args[1].as_u64().unwrap());
                    let on_succ = CallbackId::from_bits(args[2].as_u64().unwrap());
                    match self.store.get(key) {
                        Some(value) => answers.push((on_succ, vec![value.clone()])),
                        None => answers.push((on_fail, vec![json!(format!("no key {key}"))])),
                    }
                }
                SET => {
                    let key = args[0].as_str().unwrap_or_default().to_string();
                    self.store.insert(key, args[1].clone());
                }
                other => panic!("unexpected method {other}"),
            }
        }
        answers
    }

    /// Pump batches until the bridge has nothing left to send.
    fn run(&mut self, bridge: &Bridge, batch: Option<OutboundBatch>) {
        let mut pending: VecDeque<OutboundBatch> = batch.into_iter().collect();
        while let Some(current) = pending.pop_front() {
            for (id, args) in self.execute(&current) {
                pending.extend(bridge.invoke_callback_and_return_flushed_queue(id, args));
            }
        }
    }
}

fn collecting_bridge() -> (Bridge, Rc<RefCell<Vec<String>>>) {
    let bridge = Bridge::new(BridgeConfig {
        debug_metadata: true,
        ..BridgeConfig::default()
    });
    bridge.create_debug_lookup(STORAGE, "Storage", &["get".to_string(), "set".to_string()]);
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    bridge.set_fatal_error_handler(Rc::new(move |error: &FatalError| {
        sink.borrow_mut().push(error.to_string());
    }));
    (bridge, errors)
}

fn to_call_error(err: ferry_core::BridgeError) -> CallError {
    CallError::new(err.to_string())
}

#[test]
fn round_trip_through_a_loopback_host() {
    let (bridge, errors) = collecting_bridge();
    let results = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&results);
    bridge.register_callable(
        "App",
        CallableModule::builder("App")
            .method_with("start", move |bridge, (key, value): (String, Value)| {
                bridge
                    .enqueue_call(
                        STORAGE,
                        SET,
                        vec![key.as_str().into(), ScriptValue::from(value)],
                        None,
                        None,
                    )
                    .map_err(to_call_error)?;

                for lookup in [key, "missing".to_string()] {
                    let found = Rc::clone(&sink);
                    let lost = Rc::clone(&sink);
                    bridge
                        .enqueue_call(
                            STORAGE,
                            GET,
                            vec![lookup.into()],
                            Some(callback(move |_bridge, args| {
                                lost.borrow_mut().push(format!("error: {}", args[0]));
                                Ok(())
                            })),
                            Some(callback(move |_bridge, args| {
                                found.borrow_mut().push(format!("value: {}", args[0]));
                                Ok(())
                            })),
                        )
                        .map_err(to_call_error)?;
                }
                Ok(())
            })
            .build(),
    );

    let first = bridge.call_function_return_flushed_queue("App", "start", vec![json!("theme"), json!("dark")]);
    let first_batch = first.clone().unwrap();
    assert_eq!(first_batch.len(), 3);
    assert_eq!(first_batch.method_ids(), &[SET, GET, GET]);
    assert_eq!(first_batch.next_call_id(), CallId::ZERO);
    assert_eq!(bridge.next_call_id(), CallId::new(3));

    let mut host = LoopbackHost::default();
    host.run(&bridge, first);

    assert_eq!(
        *results.borrow(),
        vec![
            r#"value: "dark""#.to_string(),
            r#"error: "no key missing""#.to_string(),
        ]
    );
    assert_eq!(bridge.pending_callbacks(), 0);
    assert!(errors.borrow().is_empty());
}

#[test]
fn callbacks_can_chain_further_calls() {
    let (bridge, errors) = collecting_bridge();
    let mut host = LoopbackHost::default();
    host.store.insert("count".to_string(), json!(1));
    let last_seen = Rc::new(RefCell::new(None));

    fn read_and_bump(bridge: &Bridge, remaining: u32, seen: Rc<RefCell<Option<Value>>>) -> Result<(), CallError> {
        bridge
            .enqueue_call(
                STORAGE,
                GET,
                vec!["count".into()],
                Some(callback(|_bridge, args| Err(CallError::new(args[0].to_string())))),
                Some(callback(move |bridge, args| {
                    let count = args[0].as_i64().unwrap_or_default();
                    *seen.borrow_mut() = Some(json!(count));
                    if remaining == 0 {
                        return Ok(());
                    }
                    bridge
                        .enqueue_call(
                            STORAGE,
                            SET,
                            vec!["count".into(), ScriptValue::from(count + 1)],
                            None,
                            None,
                        )
                        .map_err(to_call_error)?;
                    read_and_bump(bridge, remaining - 1, seen)
                })),
            )
            .map(|_| ())
            .map_err(to_call_error)
    }

    read_and_bump(&bridge, 3, Rc::clone(&last_seen)).unwrap();
    let batch = bridge.take_queue();
    host.run(&bridge, batch);

    assert_eq!(*last_seen.borrow(), Some(json!(4)));
    assert_eq!(host.store.get("count"), Some(&json!(4)));
    assert!(errors.borrow().is_empty());
}

#[test]
fn batches_serialize_as_four_columns() {
    let bridge = Bridge::default();
    bridge.enqueue_call(2, 5, vec!["a".into()], None, None).unwrap();
    bridge
        .enqueue_call(3, 0, vec![], None, Some(callback(|_bridge, _args| Ok(()))))
        .unwrap();

    let batch = bridge.take_queue().unwrap();
    let wire = serde_json::to_value(&batch).unwrap();
    assert_eq!(wire, json!([[2, 3], [5, 0], [["a"], [3]], 0]));

    // The next batch starts where the counter stands.
    bridge.enqueue_call(2, 5, vec![], None, None).unwrap();
    let next = serde_json::to_value(bridge.take_queue().unwrap()).unwrap();
    assert_eq!(next, json!([[2], [5], [[]], 2]));

    let parsed: OutboundBatch = serde_json::from_value(wire).unwrap();
    assert_eq!(parsed, batch);
}

#[derive(Debug, Clone)]
enum Op {
    Enqueue { with_fail: bool, with_succ: bool },
    Take,
    Answer { pick: usize, success: bool },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<bool>(), any::<bool>())
            .prop_map(|(with_fail, with_succ)| Op::Enqueue { with_fail, with_succ }),
        1 => Just(Op::Take),
        2 => (0usize..64, any::<bool>()).prop_map(|(pick, success)| Op::Answer { pick, success }),
    ]
}

proptest! {
    /// Calls come out in the order they went in, ids never repeat, and no
    /// call ever runs more than one callback however the host answers.
    #[test]
    fn batches_preserve_order_and_callbacks_fire_at_most_once(ops in prop::collection::vec(op(), 1..80)) {
        let bridge = Bridge::default();
        let fired: Rc<RefCell<HashMap<u64, u32>>> = Rc::default();
        let mut sent = Vec::new();
        let mut received = Vec::new();
        let mut issued: Vec<CallbackId> = Vec::new();

        for op in ops {
            match op {
                Op::Enqueue { with_fail, with_succ } => {
                    let make = |enabled: bool| {
                        enabled.then(|| {
                            let fired = Rc::clone(&fired);
                            let next = bridge.next_call_id().raw();
                            callback(move |_bridge, _args| {
                                *fired.borrow_mut().entry(next).or_default() += 1;
                                Ok(())
                            })
                        })
                    };
                    let call = bridge
                        .enqueue_call(1, sent.len() as u32, vec![], make(with_fail), make(with_succ))
                        .unwrap();
                    prop_assert_eq!(call.raw(), sent.len() as u64);
                    sent.push(call.raw());
                    if with_fail {
                        issued.push(call.failure());
                    }
                    if with_succ {
                        issued.push(call.success());
                    }
                }
                Op::Take => {
                    if let Some(batch) = bridge.take_queue() {
                        prop_assert_eq!(batch.next_call_id().raw(), received.len() as u64);
                        received.extend(batch.method_ids().iter().map(|&m| m as u64));
                    }
                }
                Op::Answer { pick, success } => {
                    if issued.is_empty() {
                        continue;
                    }
                    let id = issued[pick % issued.len()];
                    let (call, _) = id.decode();
                    let id = if success { call.success() } else { call.failure() };
                    bridge.invoke_callback(id, vec![]);
                }
            }
        }

        if let Some(batch) = bridge.take_queue() {
            prop_assert_eq!(batch.next_call_id().raw(), received.len() as u64);
            received.extend(batch.method_ids().iter().map(|&m| m as u64));
        }
        prop_assert_eq!(received, sent);
        prop_assert!(fired.borrow().values().all(|&count| count == 1));
    }
}
