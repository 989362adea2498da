//! Error taxonomy for workflow construction and step execution.
//!
//! Every variant except `Upload` and `Io` is a construction-time failure that
//! aborts building the workflow before anything is submitted.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalaxyError {
    /// Malformed work unit shape (untagged or multiply-tagged fields, mutable input shape)
    #[error("Invalid shape '{shape}': {reason}")]
    Schema { shape: String, reason: String },

    /// Work unit does not declare exactly one input parameter
    #[error("Work unit '{unit}' must declare exactly one parameter, found {found}")]
    Signature { unit: String, found: usize },

    /// Missing, extra or ill-typed step bindings
    #[error("Invalid bindings for step '{step}': {reason}")]
    Binding { step: String, reason: String },

    /// Artifact reference could not be resolved or uploaded
    #[error("Failed to resolve artifact '{name}': {reason}")]
    ArtifactResolution { name: String, reason: String },

    /// Chunk index outside of `[0, count)`
    #[error("Chunk index {index} is out of range [0, {count})")]
    Range { index: usize, count: usize },

    /// Object store write failed after exhausting retries
    #[error("Upload of '{key}' failed after {attempts} attempt(s): {reason}")]
    Upload {
        key: String,
        attempts: u32,
        reason: String,
    },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Template error: {0}")]
    Template(String),

    /// Second-stage payload or args file could not be decoded
    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("Handler '{handler}' failed: {reason}")]
    Handler { handler: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GalaxyError {
    pub(crate) fn schema(shape: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            shape: shape.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn binding(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Binding {
            step: step.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn artifact(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArtifactResolution {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn payload(reason: impl Into<String>) -> Self {
        Self::Payload(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, GalaxyError>;
