// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Extractor Adapter: one attempt with one strategy in one work directory.
//!
//! An adapter applies the strategy it is given verbatim and never falls back
//! to another profile on its own. Failures come back classified; retrying is
//! the orchestrator's call.

pub mod classify;
pub mod ytdlp;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::job::{MediaKind, MediaMetadata, QualityHints};
use crate::strategy::Strategy;

pub use classify::classify_failure;
pub use ytdlp::YtDlpExtractor;

/// Everything an adapter needs for a single attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptSpec<'a> {
    pub url: &'a str,
    pub media_kind: MediaKind,
    pub quality: QualityHints,
    /// Stem the output file should be named after.
    pub output_stem: &'a str,
    pub work_dir: &'a Path,
}

/// Successful attempt.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub metadata: MediaMetadata,
    /// Path the tool claims it wrote, if it said so. The locator has the
    /// final word.
    pub reported_path: Option<PathBuf>,
}

/// The black-box extraction capability.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write at most one media file beneath `spec.work_dir`.
    async fn attempt(
        &self,
        spec: AttemptSpec<'_>,
        strategy: &Strategy,
    ) -> Result<Extraction, ExtractionError>;
}

/// Reject input the extractor can never handle, before any attempt.
pub fn validate_source_url(raw: &str) -> Result<url::Url, ExtractionError> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| ExtractionError::non_retryable(format!("malformed source URL {raw:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        scheme => Err(ExtractionError::non_retryable(format!(
            "unsupported source URL scheme {scheme:?} in {raw:?}"
        ))),
    }
}
