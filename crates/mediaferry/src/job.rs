// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Job data model and lifecycle state machine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorClass;

/// Requested media kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

impl MediaKind {
    /// Container extension the pipeline always produces for this kind.
    pub fn canonical_extension(self) -> &'static str {
        match self {
            MediaKind::Audio => "mp3",
            MediaKind::Video => "mp4",
        }
    }

    /// Content type sent with the upload.
    pub fn content_type(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio/mp3",
            MediaKind::Video => "video/mp4",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// Target quality hints handed to the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityHints {
    /// Upper bound on video height in pixels.
    pub max_video_height: u32,
    /// Audio bitrate for transcoded audio, in kbps.
    pub audio_bitrate_kbps: u32,
}

impl Default for QualityHints {
    fn default() -> Self {
        Self {
            max_video_height: 720,
            audio_bitrate_kbps: 192,
        }
    }
}

/// Inbound job submission, already authenticated by the front door.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: String,
    pub owner_id: String,
    pub url: String,
    pub media_kind: MediaKind,
    #[serde(default)]
    pub quality: QualityHints,
    pub callback_url: Option<String>,
    /// Propagated unchanged into outbound notifications.
    pub shared_secret: Option<String>,
}

/// Lifecycle phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Attempting,
    Retrying,
    Succeeded,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Succeeded | JobPhase::Failed)
    }

    /// Allowed edges of the state machine. `Retrying -> Attempting` is the
    /// only way back into an earlier phase.
    pub fn can_transition_to(self, next: JobPhase) -> bool {
        use JobPhase::*;
        matches!(
            (self, next),
            (Queued, Attempting)
                | (Queued, Failed)
                | (Attempting, Succeeded)
                | (Attempting, Retrying)
                | (Attempting, Failed)
                | (Retrying, Attempting)
                | (Retrying, Failed)
        )
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobPhase::Queued => "queued",
            JobPhase::Attempting => "attempting",
            JobPhase::Retrying => "retrying",
            JobPhase::Succeeded => "succeeded",
            JobPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobPhase,
    pub to: JobPhase,
}

/// Last classified error recorded on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: String,
    pub class: ErrorClass,
    pub message: String,
}

/// Metadata reported by the extractor. Both fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub duration_seconds: Option<u64>,
}

/// The file produced by one successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Only valid while the job's work directory exists.
    pub path: PathBuf,
    pub extension: String,
    pub byte_len: u64,
    pub media_kind: MediaKind,
}

/// Populated once a job succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub byte_size: u64,
    pub duration_seconds: Option<u64>,
    pub title: Option<String>,
    pub storage_key: String,
    pub public_url: String,
}

/// The unit of work driven by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub request: JobRequest,
    pub phase: JobPhase,
    pub last_error: Option<JobError>,
    /// Catalog index of the strategy in use, or last used.
    pub strategy_index: Option<usize>,
    /// Catalog indices already tried, in order.
    pub attempted: Vec<usize>,
    pub output: Option<JobOutput>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(request: JobRequest) -> Self {
        Self {
            request,
            phase: JobPhase::Queued,
            last_error: None,
            strategy_index: None,
            attempted: Vec::new(),
            output: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.request.job_id
    }

    pub fn attempt_count(&self) -> usize {
        self.attempted.len()
    }

    /// Move to `next`, rejecting edges the state machine does not allow.
    pub fn transition(&mut self, next: JobPhase) -> Result<(), TransitionError> {
        if !self.phase.can_transition_to(next) {
            return Err(TransitionError {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(job_id = %self.request.job_id, from = %self.phase, to = %next, "job transition");
        self.phase = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Enter `Attempting` with the given catalog entry.
    pub fn begin_attempt(&mut self, strategy_index: usize) -> Result<(), TransitionError> {
        self.transition(JobPhase::Attempting)?;
        self.strategy_index = Some(strategy_index);
        self.attempted.push(strategy_index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> JobRequest {
        JobRequest {
            job_id: "asset-1".into(),
            owner_id: "artist-1".into(),
            url: "https://example.com/watch?v=abc".into(),
            media_kind: MediaKind::Audio,
            quality: QualityHints::default(),
            callback_url: None,
            shared_secret: None,
        }
    }

    #[test]
    fn test_retry_cycle_is_allowed() {
        let mut job = Job::new(request());
        job.begin_attempt(0).unwrap();
        job.transition(JobPhase::Retrying).unwrap();
        job.begin_attempt(1).unwrap();
        job.transition(JobPhase::Succeeded).unwrap();
        assert_eq!(job.attempted, vec![0, 1]);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_terminal_phases_cannot_be_left() {
        let mut job = Job::new(request());
        job.begin_attempt(0).unwrap();
        job.transition(JobPhase::Failed).unwrap();
        let err = job.transition(JobPhase::Attempting).unwrap_err();
        assert_eq!(err.from, JobPhase::Failed);
        assert!(job.transition(JobPhase::Succeeded).is_err());
    }

    #[test]
    fn test_queued_cannot_skip_to_success() {
        let mut job = Job::new(request());
        assert!(job.transition(JobPhase::Succeeded).is_err());
        assert!(job.transition(JobPhase::Retrying).is_err());
    }

    #[test]
    fn test_media_kind_parsing_and_profiles() {
        assert_eq!("Video".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert!("image".parse::<MediaKind>().is_err());
        assert_eq!(MediaKind::Audio.canonical_extension(), "mp3");
        assert_eq!(MediaKind::Video.content_type(), "video/mp4");
    }

    #[test]
    fn test_media_kind_serializes_lowercase() {
        let json = serde_json::to_string(&MediaKind::Video).unwrap();
        assert_eq!(json, "\"video\"");
    }
}
