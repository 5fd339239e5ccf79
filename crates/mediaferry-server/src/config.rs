//! Process settings, read once from flags and environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;

use mediaferry::config::NotifierConfig;
use mediaferry::{
    ExtractorConfig, PipelineConfig, PublicUrlMode, StorageConfig, StrategyCatalog,
};

/// Every setting accepts a flag or its environment variable.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// HTTP listen port.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// HTTP listen host.
    #[arg(long, env = "MEDIAFERRY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Shared secret callers must present; also forwarded to webhooks.
    #[arg(long, env = "API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    /// Storage backend base URL.
    #[arg(long, env = "SUPABASE_URL")]
    pub storage_url: Option<String>,

    /// Storage backend service key.
    #[arg(long, env = "SUPABASE_SERVICE_KEY", hide_env_values = true)]
    pub storage_key: Option<String>,

    /// `template`, `template:<pattern with {key}>` or `lookup`.
    #[arg(long, env = "MEDIAFERRY_PUBLIC_URL_MODE", default_value = "template")]
    pub public_url_mode: String,

    #[arg(long, env = "MEDIAFERRY_AUDIO_BUCKET", default_value = "audio-files")]
    pub audio_bucket: String,

    #[arg(long, env = "MEDIAFERRY_VIDEO_BUCKET", default_value = "media-assets")]
    pub video_bucket: String,

    /// Egress proxy for strategies that route through it.
    #[arg(long, env = "PROXY_URL")]
    pub proxy_url: Option<String>,

    /// Extraction tool binary.
    #[arg(long, env = "YTDLP_PATH", default_value = "yt-dlp")]
    pub ytdlp_path: String,

    /// JSON strategy table replacing the built-in catalog.
    #[arg(long, env = "MEDIAFERRY_STRATEGIES")]
    pub strategies: Option<PathBuf>,

    #[arg(long, env = "MEDIAFERRY_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: usize,

    #[arg(long, env = "MEDIAFERRY_MAX_JOBS", default_value_t = 4)]
    pub max_concurrent_jobs: usize,

    #[arg(long, env = "MEDIAFERRY_JOB_TIMEOUT_SECS", default_value_t = 1800)]
    pub job_timeout_secs: u64,

    #[arg(long, env = "MEDIAFERRY_NOTIFY_TIMEOUT_SECS", default_value_t = 30)]
    pub notify_timeout_secs: u64,

    /// Parent directory for per-job work directories. Defaults to the
    /// system temp directory.
    #[arg(long, env = "MEDIAFERRY_WORK_DIR")]
    pub work_dir: Option<PathBuf>,
}

impl Settings {
    pub fn proxy_configured(&self) -> bool {
        self.proxy_url.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            max_attempts: self.max_attempts,
            max_concurrent_jobs: self.max_concurrent_jobs,
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            work_root: self.work_dir.clone().unwrap_or(defaults.work_root),
            max_error_chars: defaults.max_error_chars,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn storage_config(&self) -> anyhow::Result<StorageConfig> {
        let url = self
            .storage_url
            .as_deref()
            .context("SUPABASE_URL is not set")?;
        let key = self
            .storage_key
            .as_deref()
            .context("SUPABASE_SERVICE_KEY is not set")?;

        let mut config = StorageConfig::new(url, key);
        config.audio_bucket = self.audio_bucket.clone();
        config.video_bucket = self.video_bucket.clone();
        config.url_mode = PublicUrlMode::parse(&self.public_url_mode, &config.base_url)?;
        config.validate()?;
        Ok(config)
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            binary: self.ytdlp_path.clone(),
            proxy_url: self.proxy_url.clone().filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            timeout: Duration::from_secs(self.notify_timeout_secs),
        }
    }

    pub fn catalog(&self) -> anyhow::Result<StrategyCatalog> {
        match &self.strategies {
            Some(path) => StrategyCatalog::from_json_file(path)
                .with_context(|| format!("loading strategies from {}", path.display())),
            None => Ok(StrategyCatalog::builtin()),
        }
    }
}
