// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pipeline configuration.
//!
//! Built once at process start and handed to collaborators at construction
//! time. Nothing here is reloaded or mutated afterwards.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MAX_ERROR_MESSAGE_CHARS;
use crate::job::MediaKind;

const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SIGNED_URL_EXPIRY_SECS: u64 = 60 * 60 * 24 * 365;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("storage base URL is invalid: {0}")]
    InvalidBaseUrl(String),

    #[error("public URL template must contain {{key}}: {0}")]
    InvalidTemplate(String),

    #[error("unknown public URL mode: {0}")]
    UnknownUrlMode(String),
}

/// Orchestrator limits.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Hard cap on extraction attempts per job, independent of catalog size.
    pub max_attempts: usize,
    /// Upper bound on concurrently running jobs.
    pub max_concurrent_jobs: usize,
    /// Whole-job deadline; expiry drives the job to `Failed`.
    pub job_timeout: Duration,
    /// Parent directory for per-job temporary work directories.
    pub work_root: PathBuf,
    pub max_error_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            work_root: std::env::temp_dir(),
            max_error_chars: MAX_ERROR_MESSAGE_CHARS,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero("max_attempts"));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Zero("max_concurrent_jobs"));
        }
        if self.job_timeout.is_zero() {
            return Err(ConfigError::Zero("job_timeout"));
        }
        Ok(())
    }
}

/// How the public reference of an uploaded object is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PublicUrlMode {
    /// Deterministic templating; `{bucket}` and `{key}` are substituted.
    Template { template: String },
    /// Ask the backend for a signed URL valid for `expires_in_secs`.
    Lookup { expires_in_secs: u64 },
}

impl PublicUrlMode {
    /// Template matching the storage backend's public object route.
    pub fn public_objects(base_url: &str) -> Self {
        PublicUrlMode::Template {
            template: format!(
                "{}/storage/v1/object/public/{{bucket}}/{{key}}",
                base_url.trim_end_matches('/')
            ),
        }
    }

    /// Parse `template`, `template:<pattern>`, or `lookup`.
    pub fn parse(raw: &str, base_url: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        match raw {
            "template" | "" => Ok(Self::public_objects(base_url)),
            "lookup" => Ok(PublicUrlMode::Lookup {
                expires_in_secs: DEFAULT_SIGNED_URL_EXPIRY_SECS,
            }),
            other => match other.strip_prefix("template:") {
                Some(template) if template.contains("{key}") => Ok(PublicUrlMode::Template {
                    template: template.to_string(),
                }),
                Some(template) => Err(ConfigError::InvalidTemplate(template.to_string())),
                None => Err(ConfigError::UnknownUrlMode(other.to_string())),
            },
        }
    }
}

/// Object storage backend settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub service_key: String,
    pub audio_bucket: String,
    pub video_bucket: String,
    pub url_mode: PublicUrlMode,
}

impl StorageConfig {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            url_mode: PublicUrlMode::public_objects(&base_url),
            base_url,
            service_key: service_key.into(),
            audio_bucket: "audio-files".into(),
            video_bucket: "media-assets".into(),
        }
    }

    pub fn bucket_for(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Audio => &self.audio_bucket,
            MediaKind::Video => &self.video_bucket,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidBaseUrl(self.base_url.clone()))?;
        if let PublicUrlMode::Template { template } = &self.url_mode {
            if !template.contains("{key}") {
                return Err(ConfigError::InvalidTemplate(template.clone()));
            }
        }
        Ok(())
    }
}

/// Extraction capability settings.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Binary name or path of the extraction tool.
    pub binary: String,
    /// Process-wide egress proxy used by `ConfiguredProxy` strategies.
    pub proxy_url: Option<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".into(),
            proxy_url: None,
        }
    }
}

/// Webhook sender settings.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults_are_valid() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.max_error_chars, 500);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let cfg = PipelineConfig {
            max_attempts: 0,
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::Zero("max_attempts")));
    }

    #[test]
    fn test_url_mode_parsing() {
        let base = "https://proj.supabase.co";
        assert_eq!(
            PublicUrlMode::parse("template", base).unwrap(),
            PublicUrlMode::Template {
                template: "https://proj.supabase.co/storage/v1/object/public/{bucket}/{key}".into()
            }
        );
        assert!(matches!(
            PublicUrlMode::parse("lookup", base).unwrap(),
            PublicUrlMode::Lookup { .. }
        ));
        assert_eq!(
            PublicUrlMode::parse("template:https://cdn.example/{key}", base).unwrap(),
            PublicUrlMode::Template {
                template: "https://cdn.example/{key}".into()
            }
        );
        assert!(PublicUrlMode::parse("template:https://cdn.example/", base).is_err());
        assert!(PublicUrlMode::parse("s3", base).is_err());
    }

    #[test]
    fn test_storage_buckets_per_kind() {
        let cfg = StorageConfig::new("https://proj.supabase.co/", "key");
        assert_eq!(cfg.base_url, "https://proj.supabase.co");
        assert_eq!(cfg.bucket_for(MediaKind::Audio), "audio-files");
        assert_eq!(cfg.bucket_for(MediaKind::Video), "media-assets");
        assert!(cfg.validate().is_ok());
    }
}
