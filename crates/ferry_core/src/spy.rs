//! Observer hook for calls crossing the bridge in either direction.
//!
//! Records are only built when a spy is installed: building one may clone
//! names and walk the argument list, which the hot path must not pay for.

use serde_json::Value;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local code calling into the host (an enqueued call).
    ToHost,
    /// The host calling local code (an invoke or callback).
    ToLocal,
}

/// One observed call.
#[derive(Debug, Clone, Copy)]
pub struct SpyRecord<'a> {
    pub direction: Direction,
    /// Module name, or the numeric target id when no name is known.
    /// Absent for callbacks.
    pub module: Option<&'a str>,
    /// Method name, numeric method id, or callback label.
    pub method: &'a str,
    pub args: &'a [Value],
}

impl fmt::Display for SpyRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            Direction::ToLocal => "host->local",
            Direction::ToHost => "local->host",
        };
        write!(f, "{arrow} : ")?;
        if let Some(module) = self.module {
            write!(f, "{module}.")?;
        }
        let args = serde_json::to_string(self.args).map_err(|_| fmt::Error)?;
        write!(f, "{}({args})", self.method)
    }
}

pub type Spy = Rc<dyn Fn(&SpyRecord<'_>)>;

/// What `Bridge::set_spy` installs.
#[derive(Clone)]
pub enum SpySetting {
    Off,
    /// Log every record at `info` under the `ferry::spy` target.
    Logging,
    Custom(Spy),
}

impl SpySetting {
    pub fn custom<F>(spy: F) -> Self
    where
        F: Fn(&SpyRecord<'_>) + 'static,
    {
        SpySetting::Custom(Rc::new(spy))
    }

    pub(crate) fn into_spy(self) -> Option<Spy> {
        match self {
            SpySetting::Off => None,
            SpySetting::Logging => Some(Rc::new(log_record)),
            SpySetting::Custom(spy) => Some(spy),
        }
    }
}

impl From<bool> for SpySetting {
    fn from(enabled: bool) -> Self {
        if enabled {
            SpySetting::Logging
        } else {
            SpySetting::Off
        }
    }
}

impl From<Option<Spy>> for SpySetting {
    fn from(spy: Option<Spy>) -> Self {
        spy.map_or(SpySetting::Off, SpySetting::Custom)
    }
}

fn log_record(record: &SpyRecord<'_>) {
    tracing::info!(target: "ferry::spy", "{record}");
}
