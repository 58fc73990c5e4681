//! Error taxonomy for the workflow and reputation engines
//!
//! Business-rule violations are recoverable by the caller and carry enough
//! context to be reported back. Storage outages surface as `Internal`.

use thiserror::Error;

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed or under-length input
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Missing engagement, review, farmer or user record
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Wrong actor for the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Record is not in the source state the transition requires
    #[error("Invalid state transition for {entity} {id}: expected {expected}, found {actual}")]
    InvalidStateTransition {
        entity: &'static str,
        id: String,
        expected: String,
        actual: String,
    },

    /// A concurrent transition won the conditional write
    #[error("Conflict on {entity} {id}: record changed concurrently")]
    Conflict { entity: &'static str, id: String },

    /// Storage or other collaborator failure
    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        WorkflowError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        id: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        WorkflowError::InvalidStateTransition {
            entity,
            id: id.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    pub fn conflict(entity: &'static str, id: impl Into<String>) -> Self {
        WorkflowError::Conflict {
            entity,
            id: id.into(),
        }
    }

    /// True for errors caused by the caller rather than a collaborator outage
    pub fn is_business_rule(&self) -> bool {
        !matches!(self, WorkflowError::Internal(_))
    }
}
