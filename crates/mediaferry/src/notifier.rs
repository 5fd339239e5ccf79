// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Notifier: best-effort status webhooks.
//!
//! `notify` reports whether the receiver accepted the event and never
//! fails. A lost notification must not change a job's outcome.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::NotifierConfig;
use crate::error::NotificationError;

/// Status vocabulary understood by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Downloading,
    Ready,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Downloading => "downloading",
            NotificationStatus::Ready => "ready",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, NotificationStatus::Downloading)
    }
}

/// One outbound status record. The serialized form is the receiver's wire
/// format; the callback target travels alongside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    #[serde(skip)]
    pub callback_url: Option<String>,
    #[serde(rename = "asset_id")]
    pub job_id: String,
    pub status: NotificationStatus,
    #[serde(rename = "asset_url", skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub secret: Option<String>,
}

impl NotificationEvent {
    fn base(
        job_id: &str,
        callback_url: Option<&str>,
        secret: Option<&str>,
        status: NotificationStatus,
    ) -> Self {
        Self {
            callback_url: callback_url.map(str::to_string),
            job_id: job_id.to_string(),
            status,
            asset_url: None,
            title: None,
            duration_seconds: None,
            error_message: None,
            secret: secret.map(str::to_string),
        }
    }

    pub fn downloading(job_id: &str, callback_url: Option<&str>, secret: Option<&str>) -> Self {
        Self::base(job_id, callback_url, secret, NotificationStatus::Downloading)
    }

    /// Missing metadata is filled the way receivers expect it:
    /// `"Unknown"` and `0`.
    pub fn ready(
        job_id: &str,
        callback_url: Option<&str>,
        secret: Option<&str>,
        asset_url: &str,
        title: Option<&str>,
        duration_seconds: Option<u64>,
    ) -> Self {
        Self {
            asset_url: Some(asset_url.to_string()),
            title: Some(title.unwrap_or("Unknown").to_string()),
            duration_seconds: Some(duration_seconds.unwrap_or(0)),
            ..Self::base(job_id, callback_url, secret, NotificationStatus::Ready)
        }
    }

    pub fn failed(
        job_id: &str,
        callback_url: Option<&str>,
        secret: Option<&str>,
        error_message: &str,
    ) -> Self {
        Self {
            error_message: Some(error_message.to_string()),
            ..Self::base(job_id, callback_url, secret, NotificationStatus::Failed)
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// `true` when the receiver acknowledged the event.
    async fn notify(&self, event: &NotificationEvent) -> bool;
}

/// Posts events as JSON to their callback URL.
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self, NotificationError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, NotificationError> {
        Self::new(NotifierConfig { timeout })
    }

    async fn send(&self, url: &str, event: &NotificationEvent) -> Result<(), NotificationError> {
        let resp = self.client.post(url).json(event).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NotificationError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NotificationEvent) -> bool {
        let Some(url) = event.callback_url.as_deref() else {
            tracing::debug!(job_id = %event.job_id, status = event.status.as_str(), "no callback URL, notification skipped");
            return false;
        };
        match self.send(url, event).await {
            Ok(()) => {
                tracing::debug!(job_id = %event.job_id, status = event.status.as_str(), "notification delivered");
                true
            }
            Err(e) => {
                tracing::warn!(job_id = %event.job_id, status = event.status.as_str(), error = %e, "notification failed");
                false
            }
        }
    }
}
