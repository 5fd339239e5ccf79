// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the acquisition pipeline.
//!
//! Lower components never retry on their own. They return a classified
//! error and the orchestrator decides whether the job moves to `Retrying`
//! or `Failed`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Longest error message carried to callers and notification receivers.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Whether a failure may succeed under a different strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Retry with the next strategy in the catalog.
    Transient,
    /// Fail the job immediately.
    NonRetryable,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::NonRetryable => write!(f, "non-retryable"),
        }
    }
}

/// Failure of a single extraction attempt.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExtractionError {
    pub class: ErrorClass,
    pub message: String,
}

impl ExtractionError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::NonRetryable,
            message: message.into(),
        }
    }
}

/// The extractor reported success but no output file could be resolved.
#[derive(thiserror::Error, Debug)]
pub enum LocateError {
    #[error("no artifact found in {dir} ({candidates} candidate files)")]
    NotFound { dir: PathBuf, candidates: usize },

    #[error("failed to scan {dir}: {source}")]
    Io {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Upload of an already-produced artifact failed. Always terminal.
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("storage backend rejected upload of {key}: HTTP {status}: {body}")]
    Rejected {
        key: String,
        status: u16,
        body: String,
    },

    #[error("storage backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to read artifact {path}: {source}")]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("public URL lookup for {key} failed: {reason}")]
    PublicUrl { key: String, reason: String },

    #[error("cannot build storage endpoint from base URL {0}")]
    Endpoint(String),
}

/// Webhook delivery failure. Logged by the notifier, never propagated.
#[derive(thiserror::Error, Debug)]
pub enum NotificationError {
    #[error("receiver answered HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Every way a job can end up in `Failed`.
#[derive(thiserror::Error, Debug)]
pub enum AcquireError {
    #[error("extraction failed: {0}")]
    TransientExtraction(ExtractionError),

    #[error("extraction failed: {0}")]
    NonRetryableExtraction(ExtractionError),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(#[from] LocateError),

    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("job cancelled: {0}")]
    Cancelled(String),

    #[error("failed to prepare work directory: {0}")]
    WorkDir(#[source] std::io::Error),
}

impl From<ExtractionError> for AcquireError {
    fn from(e: ExtractionError) -> Self {
        match e.class {
            ErrorClass::Transient => AcquireError::TransientExtraction(e),
            ErrorClass::NonRetryable => AcquireError::NonRetryableExtraction(e),
        }
    }
}

impl AcquireError {
    /// Only transient extraction failures keep a job alive.
    pub fn class(&self) -> ErrorClass {
        match self {
            AcquireError::TransientExtraction(_) => ErrorClass::Transient,
            _ => ErrorClass::NonRetryable,
        }
    }

    /// Short machine-readable tag, used in logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            AcquireError::TransientExtraction(_) => "transient_extraction",
            AcquireError::NonRetryableExtraction(_) => "non_retryable_extraction",
            AcquireError::ArtifactNotFound(_) => "artifact_not_found",
            AcquireError::Delivery(_) => "delivery",
            AcquireError::Cancelled(_) => "cancelled",
            AcquireError::WorkDir(_) => "work_dir",
        }
    }

    /// Caller-visible message, capped at [`MAX_ERROR_MESSAGE_CHARS`].
    pub fn public_message(&self) -> String {
        truncate_message(&self.to_string(), MAX_ERROR_MESSAGE_CHARS)
    }
}

/// Cut `message` to at most `max_chars` characters on a char boundary.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
