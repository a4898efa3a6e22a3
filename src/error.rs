use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ScrivError {
    /// Configuration-time failure. Aborts the run before any file is read.
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    /// Zero candidates of one kind survived negotiation.
    #[error("No matching `{0}` action found")]
    NoMatchingAction(String),
    /// More than one candidate of one kind survived negotiation.
    #[error("Multiple matching `{0}` actions found")]
    AmbiguousAction(String),
    /// A consumer requirement the provider's terms cannot satisfy.
    #[error("Negotiation failed: {0}")]
    Negotiation(String),
    /// Runtime data violated a negotiated contract.
    #[error("Contract violation: {0}")]
    Contract(String),
    /// An action record names an entry point no runner registered.
    #[error("No `run` entry point registered for action `{0}`")]
    MissingEntryPoint(String),
    #[error("Hook error: {0}")]
    Hook(String),
    #[error("Hook `{event}` timed out after {millis}ms")]
    HookTimeout { event: String, millis: u64 },
}

impl ScrivError {
    /// Whether this error aborts the whole run rather than a single file.
    ///
    /// Configuration-time errors are surfaced once, before any file is
    /// touched. Everything else is captured per file in the conveyor's
    /// errored bucket.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScrivError::Config(_)
                | ScrivError::NoMatchingAction(_)
                | ScrivError::AmbiguousAction(_)
                | ScrivError::MissingEntryPoint(_)
        )
    }
}

impl From<io::Error> for ScrivError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => ScrivError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => ScrivError::PermissionDenied,
            _ => ScrivError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<YamlError> for ScrivError {
    fn from(src: YamlError) -> ScrivError {
        ScrivError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<JsonError> for ScrivError {
    fn from(src: JsonError) -> ScrivError {
        ScrivError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}
