//! Crate-wide error type.
//!
//! Every public operation returns `Result<T>`. Errors propagate to the
//! caller of the public operation; nothing is retried and no partition is
//! partially committed.

use std::fmt::Debug;
use std::io;

use thiserror::Error;

use crate::fingerprint::Fingerprint;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid Producer/Artifact/Type/Storage declaration, detected at
    /// construction or sealing.
    #[error("Definition error: {0}")]
    Definition(String),

    /// A value violates a model invariant.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The graph could not be resolved into a buildable DAG.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Data expected to exist was not found.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// `validate_outputs` rejected a built partition. Nothing was persisted.
    #[error("{producer} build for ({keys}) with input fingerprint {input_fingerprint} failed validation: {message}")]
    BuildValidation {
        producer: String,
        keys: String,
        input_fingerprint: Fingerprint,
        message: String,
    },

    /// No registered IO handler for the requested combination.
    #[error("No {operation} handler registered for type {type_}, format {format}, storage {storage}, view {view}")]
    Dispatch {
        operation: &'static str,
        type_: String,
        format: String,
        storage: String,
        view: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl<T: Debug> From<daggy::WouldCycle<T>> for Error {
    fn from(_e: daggy::WouldCycle<T>) -> Self {
        Error::Resolution("Graph contains a dependency cycle".into())
    }
}
