use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// The step a sync (or a preview read) was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStep {
    ReadMarker,
    Sample,
    Serialize,
    WriteDatabase,
    Verify,
    WriteMarker,
    Preview,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::ReadMarker => "read version marker",
            SyncStep::Sample => "sample content",
            SyncStep::Serialize => "serialize database",
            SyncStep::WriteDatabase => "write database",
            SyncStep::Verify => "verify database",
            SyncStep::WriteMarker => "write version marker",
            SyncStep::Preview => "read database for preview",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("shared store unavailable ({step}): {reason}")]
    StoreUnavailable { step: SyncStep, reason: String },

    #[error("store request timed out ({step}): {source}")]
    Timeout {
        step: SyncStep,
        #[source]
        source: StoreError,
    },

    #[error("write failed ({step}): {source}")]
    WriteFailed {
        step: SyncStep,
        #[source]
        source: StoreError,
    },

    #[error("read failed ({step}): {source}")]
    ReadFailed {
        step: SyncStep,
        #[source]
        source: StoreError,
    },

    #[error("verification failed: {reason}")]
    VerifyFailed { reason: String },

    #[error("serialization failed ({step}): {source}")]
    SerializationFailed {
        step: SyncStep,
        #[source]
        source: serde_json::Error,
    },

    #[error("content source is empty; nothing to sync")]
    EmptySource,
}

impl SyncError {
    pub fn from_read(step: SyncStep, err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => SyncError::StoreUnavailable { step, reason },
            err @ StoreError::Timeout { .. } => SyncError::Timeout { step, source: err },
            err => SyncError::ReadFailed { step, source: err },
        }
    }

    pub fn from_write(step: SyncStep, err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => SyncError::StoreUnavailable { step, reason },
            err @ StoreError::Timeout { .. } => SyncError::Timeout { step, source: err },
            err => SyncError::WriteFailed { step, source: err },
        }
    }

    pub fn step(&self) -> SyncStep {
        match self {
            SyncError::StoreUnavailable { step, .. }
            | SyncError::Timeout { step, .. }
            | SyncError::WriteFailed { step, .. }
            | SyncError::ReadFailed { step, .. }
            | SyncError::SerializationFailed { step, .. } => *step,
            SyncError::VerifyFailed { .. } => SyncStep::Verify,
            SyncError::EmptySource => SyncStep::Sample,
        }
    }

    /// Missing platform capability; retrying without user action is pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::StoreUnavailable { .. })
    }

    /// The single alert shown to the user when a sync fails.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::StoreUnavailable { .. } => {
                "Widget storage is not available on this device. Reinstall the app or check that widgets are enabled.".to_string()
            }
            SyncError::Timeout { .. } => {
                "Updating the widget took too long. Please try again.".to_string()
            }
            SyncError::WriteFailed { .. } | SyncError::VerifyFailed { .. } => {
                "The widget could not be updated. Please try syncing again.".to_string()
            }
            SyncError::ReadFailed { .. } => {
                "Widget data could not be read. Please try syncing again.".to_string()
            }
            SyncError::SerializationFailed { .. } => {
                "Widget data could not be prepared. Please try syncing again.".to_string()
            }
            SyncError::EmptySource => "There is no content to send to the widget yet.".to_string(),
        }
    }
}
