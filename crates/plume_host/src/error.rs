//! Error types for the script host

use crate::handle::{InstanceKey, MethodId};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Result type for script host operations
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Errors that can occur in the script host
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Module file missing, unreadable, or not a valid module image
    #[error("Failed to load module '{path}': {message}")]
    LoadError {
        path: PathBuf,
        message: String,
    },

    /// No loaded module defines the type
    #[error("Type '{0}' not found")]
    TypeNotFound(String),

    /// Type has no zero-argument constructor, or construction failed
    #[error("Failed to construct '{type_name}': {message}")]
    ConstructionError {
        type_name: String,
        message: String,
    },

    #[error("Instance {0} not found")]
    InstanceNotFound(InstanceKey),

    #[error("Instance {0} already exists")]
    DuplicateInstance(Uuid),

    #[error("Signature {0} not registered")]
    SignatureNotRegistered(i32),

    #[error("Signature {0} is already registered")]
    SignatureAlreadyRegistered(i32),

    /// A type name in a signature could not be resolved
    #[error("Unknown type '{0}'")]
    UnknownType(String),

    /// No method with the requested name and parameter types, or a stale method handle
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Method '{type_name}.{method}' is not static")]
    NotStatic {
        type_name: String,
        method: String,
    },

    #[error("Signature mismatch for '{method}': expected {expected}, found {found}")]
    SignatureMismatch {
        method: String,
        expected: String,
        found: String,
    },

    #[error("Argument count mismatch: expected {expected}, got {actual}")]
    ArityMismatch {
        expected: usize,
        actual: i32,
    },

    #[error("Return buffer must be non-null for a '{0}' return")]
    NullReturnBuffer(String),

    #[error("No module loaded")]
    NoModuleLoaded,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The plugin reported a failure or returned a malformed value
    #[error("Invocation of '{method}' failed: {message}")]
    InvocationFailed {
        method: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    /// Create a load error
    pub fn load_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ScriptError::LoadError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a construction error
    pub fn construction_error(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptError::ConstructionError {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Create an invocation failure
    pub fn invocation_failed(method: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptError::InvocationFailed {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Stale or unknown method handle
    pub fn stale_method(id: MethodId) -> Self {
        ScriptError::MethodNotFound(format!("no bound method with handle {}", id))
    }
}
