// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! `yt-dlp` subprocess adapter.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{classify_failure, AttemptSpec, Extraction, Extractor};
use crate::config::ExtractorConfig;
use crate::error::ExtractionError;
use crate::job::{MediaKind, MediaMetadata};
use crate::strategy::{EgressPolicy, Strategy};

/// Fields printed once the final file has been moved into place.
const PRINT_TEMPLATE: &str = "after_move:%(.{id,title,duration,ext,filepath})j";

/// Runs one attempt per process. The child is killed if the attempt future
/// is dropped, so job timeouts and cancellation stop the download.
pub struct YtDlpExtractor {
    binary: PathBuf,
    proxy_url: Option<String>,
}

impl YtDlpExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let binary = resolve_binary(&config.binary);
        tracing::debug!(binary = %binary.display(), proxy = config.proxy_url.is_some(), "extractor configured");
        Self {
            binary,
            proxy_url: config.proxy_url.filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Whether the binary resolved to something that exists.
    pub fn is_available(&self) -> bool {
        self.binary.is_file()
    }
}

/// Explicit paths are taken as-is; bare names are looked up on `PATH`.
fn resolve_binary(configured: &str) -> PathBuf {
    let candidate = PathBuf::from(configured);
    if candidate.components().count() > 1 {
        return candidate;
    }
    which::which(configured).unwrap_or(candidate)
}

/// Command-line arguments for one attempt, excluding the binary itself.
pub fn build_args(spec: &AttemptSpec<'_>, strategy: &Strategy, proxy: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = Vec::with_capacity(64);
    let mut push = |flag: &str, value: String| {
        args.push(flag.to_string());
        args.push(value);
    };

    let template = spec.work_dir.join(format!("{}.%(ext)s", spec.output_stem));
    push("--output", template.to_string_lossy().into_owned());

    match spec.media_kind {
        MediaKind::Audio => {
            push("--format", "bestaudio/best".into());
            push("--audio-format", MediaKind::Audio.canonical_extension().into());
            push("--audio-quality", format!("{}K", spec.quality.audio_bitrate_kbps));
        }
        MediaKind::Video => {
            let h = spec.quality.max_video_height;
            push(
                "--format",
                format!("best[height<={h}][ext=mp4]/best[height<={h}]/best"),
            );
            push(
                "--merge-output-format",
                MediaKind::Video.canonical_extension().into(),
            );
        }
    }

    for (name, value) in &strategy.headers {
        push("--add-header", format!("{name}:{value}"));
    }

    let mut youtube_args = Vec::new();
    if !strategy.player_clients.is_empty() {
        youtube_args.push(format!("player_client={}", strategy.player_clients.join(",")));
    }
    if !strategy.player_skip.is_empty() {
        youtube_args.push(format!("player_skip={}", strategy.player_skip.join(",")));
    }
    if !youtube_args.is_empty() {
        push("--extractor-args", format!("youtube:{}", youtube_args.join(";")));
    }

    match (strategy.egress, proxy) {
        (EgressPolicy::Direct, _) => push("--proxy", String::new()),
        (EgressPolicy::ConfiguredProxy, Some(url)) => push("--proxy", url.to_string()),
        (EgressPolicy::ConfiguredProxy, None) => {}
    }

    let retry = strategy.retry;
    push("--retries", retry.retries.to_string());
    push("--fragment-retries", retry.fragment_retries.to_string());
    push("--file-access-retries", retry.file_access_retries.to_string());
    push("--extractor-retries", retry.extractor_retries.to_string());
    push("--socket-timeout", strategy.socket_timeout_secs.to_string());

    if let Some(sleep) = strategy.sleep {
        push("--sleep-interval", sleep.min_interval_secs.to_string());
        push("--max-sleep-interval", sleep.max_interval_secs.to_string());
        push("--sleep-requests", sleep.request_interval_secs.to_string());
    }
    if let Some(country) = &strategy.geo_bypass_country {
        push("--geo-bypass-country", country.clone());
    }
    push("--print", PRINT_TEMPLATE.to_string());

    if matches!(spec.media_kind, MediaKind::Audio) {
        args.push("--extract-audio".into());
    }
    if !strategy.check_certificates {
        args.push("--no-check-certificates".into());
    }
    args.extend(
        ["--no-simulate", "--no-playlist", "--quiet", "--no-warnings", "--no-progress"]
            .map(String::from),
    );
    args.push("--".into());
    args.push(spec.url.to_string());
    args
}

#[derive(Debug, Deserialize)]
struct PrintedInfo {
    title: Option<String>,
    duration: Option<f64>,
    filepath: Option<PathBuf>,
}

/// Metadata from the last JSON line on stdout. Missing or garbled output
/// yields empty metadata; the artifact is still located on disk.
fn parse_printed_info(stdout: &str) -> Extraction {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('{'));
    let Some(line) = line else {
        return Extraction::default();
    };
    match serde_json::from_str::<PrintedInfo>(line) {
        Ok(info) => Extraction {
            metadata: MediaMetadata {
                title: info.title.filter(|t| !t.is_empty()),
                duration_seconds: info
                    .duration
                    .filter(|d| d.is_finite() && *d >= 0.0)
                    .map(|d| d.round() as u64),
            },
            reported_path: info.filepath,
        },
        Err(e) => {
            tracing::warn!(error = %e, "could not parse extractor metadata");
            Extraction::default()
        }
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn attempt(
        &self,
        spec: AttemptSpec<'_>,
        strategy: &Strategy,
    ) -> Result<Extraction, ExtractionError> {
        super::validate_source_url(spec.url)?;
        let args = build_args(&spec, strategy, self.proxy_url.as_deref());

        tracing::debug!(strategy = %strategy.name, kind = %spec.media_kind, "spawning extractor");
        let output = Command::new(&self.binary)
            .args(&args)
            .current_dir(spec.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ExtractionError::non_retryable(format!(
                    "extraction tool not found at {}",
                    self.binary.display()
                )),
                _ => ExtractionError::transient(format!("failed to run extraction tool: {e}")),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(classify_failure(&stderr, output.status.code()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_printed_info(&stdout))
    }
}
