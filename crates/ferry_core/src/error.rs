use crate::ids::CallbackId;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Failure returned by a callable method or a callback.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CallError {
    message: String,
    details: Option<Value>,
}

impl CallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }
}

/// Why a script value cannot cross the bridge.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnserializableReason {
    #[error("cannot serialize a function ({name})")]
    Function { name: String },

    #[error("cannot serialize a symbol ({description})")]
    Symbol { description: String },

    #[error("cannot serialize a bigint")]
    BigInt,

    #[error("cannot serialize an infinite number ({value})")]
    NonFinite { value: f64 },

    #[error("cannot serialize the same object twice")]
    Aliased,
}

/// One offending location inside an argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentIssue {
    pub path: String,
    pub reason: UnserializableReason,
}

impl fmt::Display for ArgumentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (found at {})", self.reason, self.path)
    }
}

/// Errors surfaced by the bridge, either to the caller (encoding, mutation)
/// or to the fatal error handler (everything raised while dispatching).
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("module {module} is not a registered callable module (calling {method})")]
    UnknownModule { module: String, method: String },

    #[error("method {method} does not exist on module {module}")]
    UnknownMethod { module: String, method: String },

    #[error("call arguments cannot be serialized: {}", summarize(.issues))]
    UnserializableArgument { issues: Vec<ArgumentIssue> },

    #[error("{message}")]
    MissingCallback {
        callback_id: CallbackId,
        message: String,
    },

    #[error("attempted to mutate {what} after it was enqueued")]
    MutationAfterEnqueue { what: String },

    #[error("{context} failed: {source}")]
    Callee {
        context: String,
        #[source]
        source: CallError,
    },

    #[error("{context} panicked: {message}")]
    Panicked { context: String, message: String },
}

fn summarize(issues: &[ArgumentIssue]) -> String {
    match issues {
        [] => "no issues recorded".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} and {} more", rest.len()),
    }
}

/// A dispatch failure as handed to the fatal error handler.
#[derive(Debug)]
pub struct FatalError {
    pub error: BridgeError,
    /// `Module.method` of the call that was running, when known.
    pub call_site: Option<String>,
}

impl FatalError {
    /// Structured payload attached by a failing callee, if any.
    pub fn details(&self) -> Option<&Value> {
        match &self.error {
            BridgeError::Callee { source, .. } => source.details(),
            _ => None,
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.call_site {
            Some(site) => write!(f, "{} [in {site}]", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for FatalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unserializable_message_mentions_first_issue_and_count() {
        let error = BridgeError::UnserializableArgument {
            issues: vec![
                ArgumentIssue {
                    path: "args[0].onPress".to_string(),
                    reason: UnserializableReason::Function {
                        name: "handler".to_string(),
                    },
                },
                ArgumentIssue {
                    path: "args[1]".to_string(),
                    reason: UnserializableReason::BigInt,
                },
            ],
        };
        let text = error.to_string();
        assert!(text.contains("cannot serialize a function (handler)"));
        assert!(text.contains("args[0].onPress"));
        assert!(text.ends_with("and 1 more"));
    }

    #[test]
    fn fatal_error_names_call_site() {
        let fatal = FatalError {
            error: BridgeError::Callee {
                context: "Logger.log()".to_string(),
                source: CallError::new("disk full"),
            },
            call_site: Some("Logger.log".to_string()),
        };
        assert_eq!(
            fatal.to_string(),
            "Logger.log() failed: disk full [in Logger.log]"
        );
        assert!(fatal.details().is_none());
    }

    #[test]
    fn fatal_error_exposes_callee_details() {
        let fatal = FatalError {
            error: BridgeError::Callee {
                context: "<callback for Storage.get>".to_string(),
                source: CallError::new("missing").with_details(serde_json::json!(["user"])),
            },
            call_site: None,
        };
        assert_eq!(fatal.details(), Some(&serde_json::json!(["user"])));
    }
}
