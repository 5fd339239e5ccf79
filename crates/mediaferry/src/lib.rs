// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Mediaferry: media acquisition pipeline.
//!
//! Fetches audio or video from a source URL by trying extraction strategies
//! in catalog order, uploads the result to object storage, and reports the
//! outcome to a webhook.

pub mod config;
pub mod delivery;
pub mod error;
pub mod events;
pub mod extractor;
pub mod job;
pub mod locator;
pub mod notifier;
pub mod orchestrator;
pub mod strategy;

pub use config::{ExtractorConfig, NotifierConfig, PipelineConfig, PublicUrlMode, StorageConfig};
pub use delivery::{storage_key, Delivered, DeliveryPipeline, HttpObjectStore, ObjectStore};
pub use error::{AcquireError, DeliveryError, ErrorClass, ExtractionError, LocateError};
pub use events::{event_matches_job, EventBus, PipelineEvent};
pub use extractor::{AttemptSpec, Extraction, Extractor, YtDlpExtractor};
pub use job::{Job, JobPhase, JobRequest, MediaKind, MediaMetadata, QualityHints};
pub use notifier::{NotificationEvent, NotificationStatus, Notifier, WebhookNotifier};
pub use orchestrator::{JobReport, Orchestrator};
pub use strategy::{Strategy, StrategyCatalog};
