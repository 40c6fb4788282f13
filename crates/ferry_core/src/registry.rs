//! Callable modules: the local functions the host may invoke by name.
//!
//! A module is a name plus a table of methods sharing one uniform signature.
//! Concrete modules are adapted into that shape with `CallableModuleBuilder`
//! rather than discovered by reflection.

use crate::bridge::Bridge;
use crate::error::CallError;
use once_cell::unsync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Uniform method signature. Arguments arrive positionally as sent by the host.
pub type MethodFn = dyn Fn(&Bridge, Vec<Value>) -> Result<Value, CallError>;

/// Deferred module constructor, run at most once.
pub type ModuleFactory = Box<dyn FnOnce() -> CallableModule>;

pub struct CallableModule {
    name: String,
    methods: HashMap<String, Box<MethodFn>>,
}

impl CallableModule {
    pub fn builder(name: impl Into<String>) -> CallableModuleBuilder {
        CallableModuleBuilder {
            module: CallableModule {
                name: name.into(),
                methods: HashMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<&MethodFn> {
        self.methods.get(name).map(|method| method.as_ref())
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Method names in sorted order.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CallableModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableModule")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Builder-style adapter from closures to a `CallableModule`.
///
/// # Example
/// ```ignore
/// let logger = CallableModule::builder("Logger")
///     .method_with("log", |_bridge, (line,): (String,)| {
///         tracing::info!("{line}");
///         Ok(())
///     })
///     .build();
/// ```
pub struct CallableModuleBuilder {
    module: CallableModule,
}

impl CallableModuleBuilder {
    /// Add a method taking the raw positional argument list.
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Bridge, Vec<Value>) -> Result<Value, CallError> + 'static,
    {
        let name = name.into();
        if self.module.methods.insert(name.clone(), Box::new(f)).is_some() {
            tracing::warn!(
                target: "ferry::bridge",
                module = %self.module.name,
                method = %name,
                "method defined twice; the later definition wins"
            );
        }
        self
    }

    /// Add a method whose positional arguments deserialize into `A`
    /// (typically a tuple) and whose result serializes from `R`.
    pub fn method_with<A, R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(&Bridge, A) -> Result<R, CallError> + 'static,
    {
        let name = name.into();
        let label = format!("{}.{}", self.module.name, name);
        self.method(name, move |bridge, args| {
            let parsed: A = serde_json::from_value(Value::Array(args)).map_err(|err| {
                CallError::new(format!("invalid arguments for {label}(): {err}"))
            })?;
            let result = f(bridge, parsed)?;
            serde_json::to_value(result)
                .map_err(|err| CallError::new(format!("{label}() returned an unencodable value: {err}")))
        })
    }

    pub fn build(self) -> CallableModule {
        self.module
    }
}

struct ModuleSlot {
    module: OnceCell<Rc<CallableModule>>,
    factory: RefCell<Option<ModuleFactory>>,
}

impl ModuleSlot {
    fn ready(module: CallableModule) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Rc::new(module));
        Self {
            module: cell,
            factory: RefCell::new(None),
        }
    }

    fn lazy(factory: ModuleFactory) -> Self {
        Self {
            module: OnceCell::new(),
            factory: RefCell::new(Some(factory)),
        }
    }

    /// Runs the factory on first use and drops it afterwards. No borrow is
    /// held while the factory runs, so it may itself reach into the bridge.
    fn resolve(&self) -> Option<Rc<CallableModule>> {
        if let Some(module) = self.module.get() {
            return Some(Rc::clone(module));
        }
        let factory = self.factory.borrow_mut().take()?;
        // A lookup of this module from inside its own factory resolves to
        // absent: the factory has already been taken.
        let module = Rc::new(factory());
        let _ = self.module.set(Rc::clone(&module));
        Some(module)
    }
}

/// Name → module table with lazy construction.
#[derive(Default)]
pub struct CallableRegistry {
    slots: RefCell<HashMap<String, Rc<ModuleSlot>>>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, module: CallableModule) {
        self.install(name.into(), ModuleSlot::ready(module));
    }

    pub fn register_lazy<F>(&self, name: impl Into<String>, factory: F)
    where
        F: FnOnce() -> CallableModule + 'static,
    {
        self.install(name.into(), ModuleSlot::lazy(Box::new(factory)));
    }

    /// Look up a module, constructing it if it was registered lazily.
    pub fn get(&self, name: &str) -> Option<Rc<CallableModule>> {
        let slot = self.slots.borrow().get(name).cloned()?;
        slot.resolve()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.borrow().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    fn install(&self, name: String, slot: ModuleSlot) {
        let previous = self.slots.borrow_mut().insert(name.clone(), Rc::new(slot));
        if previous.is_some() {
            tracing::warn!(
                target: "ferry::bridge",
                module = %name,
                "callable module registered twice; the previous registration is shadowed"
            );
        }
    }
}
