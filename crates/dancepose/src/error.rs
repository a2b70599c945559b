//! Error type returned by session and marking operations.

use crate::target::TargetId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The camera could not be opened, for example because permission was denied.
    #[error("camera unavailable: {0:#}")]
    DeviceAccess(anyhow::Error),

    /// A pose detector instance could not be constructed.
    #[error("failed to create pose detector: {0:#}")]
    DetectorInit(anyhow::Error),

    /// A photo batch did not contain the required number of photos.
    #[error("expected exactly {expected} photos, got {actual}")]
    InputCardinality { expected: usize, actual: usize },

    /// The operation is not allowed in the current state. Nothing was changed.
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    /// The reference video has no decodable frame at its current position.
    #[error("reference video is not ready")]
    SourceNotReady,

    /// Practice was requested, but no target with detected landmarks is available.
    #[error("no target pose with detected landmarks to practice against")]
    NoPracticeTargets,

    /// The target does not exist or its pose was not detected, so it cannot be selected.
    #[error("target {0} is not available for practice")]
    TargetUnavailable(TargetId),
}

impl Error {
    pub(crate) fn invalid(operation: &'static str, state: &'static str) -> Self {
        Self::InvalidTransition { operation, state }
    }
}
