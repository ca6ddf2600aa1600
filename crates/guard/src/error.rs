//! Guard error types

use thiserror::Error;

/// Failure reported by a [`NetworkControl`](crate::NetworkControl) implementation
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to launch network helper '{helper}': {source}")]
    Spawn {
        helper: String,
        #[source]
        source: std::io::Error,
    },

    #[error("network helper exited with {status} for module '{module}'")]
    HelperFailed { module: String, status: String },

    #[error("network control error: {0}")]
    Other(String),
}

/// Failure surfaced by a guard operation
///
/// External action failures are recoverable: the guard state is left
/// unchanged, so a later event retries the transition.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error(transparent)]
    Control(#[from] ControlError),
}

pub type Result<T> = std::result::Result<T, GuardError>;
