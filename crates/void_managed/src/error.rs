//! Error types for the managed scripting runtime

use crate::value::FieldType;
use std::path::PathBuf;
use thiserror::Error;
use void_core::{EntityId, HandleError};

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Errors that can occur in the managed scripting runtime
///
/// Only [`ScriptError::LoadFailed`] aborts a whole batch (the restore phase
/// of a reload). Every other variant is local to one entity or one field.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Unknown class name at create/restore time
    #[error("Class '{0}' not registered")]
    ClassNotFound(String),

    /// Construction or creation hook faulted
    #[error("Failed to instantiate '{class_name}' for entity {entity}: {message}")]
    InstantiationFailed {
        class_name: String,
        entity: EntityId,
        message: String,
    },

    /// Zero, unallocated, released or orphaned handle
    #[error("Invalid handle {bits:#x}: {reason}")]
    InvalidHandle { bits: u64, reason: HandleError },

    /// Handle refers to an instance whose module has been unloaded
    #[error("Handle {0:#x} refers to an instance of an unloaded module")]
    OrphanedHandle(u64),

    /// Class has no public field with that name
    #[error("Class '{class_name}' has no field '{field}'")]
    FieldNotFound { class_name: String, field: String },

    /// Field exists but its declared type differs from the requested one
    #[error("Field '{field}' is declared as {declared}, not {requested}")]
    FieldTypeMismatch {
        field: String,
        declared: FieldType,
        requested: FieldType,
    },

    /// Module file missing or corrupt
    #[error("Failed to load module '{path}': {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Module does not export a required symbol
    #[error("Symbol '{symbol}' not found in module '{module}'")]
    SymbolNotFound { module: String, symbol: String },

    /// Module was built against an incompatible runtime API
    #[error("Module API version mismatch: module targets {module_version}, runtime provides {runtime_version}")]
    ApiVersionMismatch {
        module_version: String,
        runtime_version: String,
    },

    /// One field's stored value could not be converted
    #[error("Field '{field}' could not be restored as {expected}: {message}")]
    SerializationField {
        field: String,
        expected: FieldType,
        message: String,
    },

    /// A lifecycle hook returned an error or panicked
    #[error("{hook} failed for entity {entity}: {message}")]
    HookFailed {
        hook: &'static str,
        entity: EntityId,
        message: String,
    },

    /// Class description rejected while scanning a module
    #[error("Type '{type_name}' could not be introspected: {message}")]
    Introspection { type_name: String, message: String },

    /// Flat document is not a one-level object
    #[error("Malformed field document: {0}")]
    Document(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File watcher error
    #[cfg(feature = "hot-reload")]
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl ScriptError {
    /// Create a load error
    pub fn load_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ScriptError::LoadFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a symbol not found error
    pub fn symbol_not_found(module: impl Into<String>, symbol: impl Into<String>) -> Self {
        ScriptError::SymbolNotFound {
            module: module.into(),
            symbol: symbol.into(),
        }
    }

    /// Create a field not found error
    pub fn field_not_found(class_name: impl Into<String>, field: impl Into<String>) -> Self {
        ScriptError::FieldNotFound {
            class_name: class_name.into(),
            field: field.into(),
        }
    }
}
