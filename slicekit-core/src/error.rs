//! Error Types
//!
//! Errors fall into two groups. Configuration and usage errors describe a
//! structural bug in how slices are registered or how a loop declares its
//! hooks; they are returned synchronously to the caller that broke the
//! contract. Computation and subscriber failures happen inside a flush; the
//! scheduler logs them and keeps running.

use thiserror::Error;

use crate::reactive::HookKind;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Registration and restore errors. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A slice with this name is already registered (or already present in
    /// the store when its first commit is dispatched).
    #[error("slice `{0}` already exists")]
    DuplicateSlice(String),

    /// The name cannot be encoded in an action type.
    #[error("invalid slice name `{0}`: names must be non-empty and contain neither `::` nor `|`")]
    InvalidSliceName(String),

    /// `set_hook_states` received a different number of values than the
    /// slice has state cells.
    #[error("slice `{slice}` has {expected} state cells, got {actual} values to restore")]
    HookStateCount {
        slice: String,
        expected: usize,
        actual: usize,
    },
}

/// Hook misuse inside (or outside) a loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("hooks must be declared inside a running slice computation")]
    NotInHookContext,

    /// Another slice's computation is already current.
    #[error("cannot enter slice `{requested}` while slice `{running}` is running")]
    NestedHookContext { running: String, requested: String },

    #[error("slice `{slice}` hook #{index}: dependency list length changed from {previous} to {current}")]
    DepsLengthChanged {
        slice: String,
        index: usize,
        previous: usize,
        current: usize,
    },

    #[error("slice `{slice}` hook #{index}: declared as {found}, previously {expected}")]
    HookKindMismatch {
        slice: String,
        index: usize,
        expected: HookKind,
        found: HookKind,
    },

    #[error("slice `{slice}` declared {found} hooks, previously {expected}")]
    HookCountChanged {
        slice: String,
        expected: usize,
        found: usize,
    },
}

/// Every error surfaced by the runtime.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    /// The slice has no loop bound yet, or has never committed state.
    #[error("slice `{0}` is not ready")]
    NotReady(String),

    /// A store action carried a payload that is not a JSON object.
    #[error("action `{0}` carries a non-object payload")]
    InvalidPayload(String),

    #[error("slice `{slice}` exposes no callback named `{key}`")]
    MissingCallback { slice: String, key: String },

    /// The executor was asked to run while it was already running.
    #[error("executor is already running")]
    Reentrant,

    /// Failure raised by user code: a loop, a subscriber or a creator.
    #[error("{0}")]
    Custom(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Encode(#[from] rmp_serde::encode::Error),

    #[error(transparent)]
    Decode(#[from] rmp_serde::decode::Error),
}

impl Error {
    /// Build an error from user code.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_nested_errors() {
        let err: Error = ConfigurationError::DuplicateSlice("counter".into()).into();
        assert!(err.is_configuration());
        assert!(!err.is_usage());
        assert_eq!(err.to_string(), "slice `counter` already exists");

        let err: Error = UsageError::NotInHookContext.into();
        assert!(err.is_usage());
    }

    #[test]
    fn kind_mismatch_message_names_both_kinds() {
        let err = UsageError::HookKindMismatch {
            slice: "todos".into(),
            index: 2,
            expected: HookKind::State,
            found: HookKind::Memo,
        };
        assert_eq!(
            err.to_string(),
            "slice `todos` hook #2: declared as memo, previously state"
        );
    }
}
