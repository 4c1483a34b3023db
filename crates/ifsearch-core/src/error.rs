//! Error types for the core data model.

use thiserror::Error;

use crate::model::VariableId;

/// Errors raised while building or mutating the core model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A variable id does not belong to the model it was used with.
    #[error("unknown variable {0:?}")]
    UnknownVariable(VariableId),

    /// A value was used with a variable it does not belong to.
    #[error("value belongs to variable {actual:?}, expected {expected:?}")]
    ForeignValue {
        expected: VariableId,
        actual: VariableId,
    },

    /// A committed variable was targeted by a search-time mutation.
    #[error("variable {0:?} is committed and cannot be changed")]
    CommittedVariable(VariableId),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
