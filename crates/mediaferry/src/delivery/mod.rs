// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Delivery Pipeline: push a located artifact to durable object storage and
//! resolve the public reference handed to downstream consumers.

pub mod http_store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::job::{Artifact, MediaKind};

pub use http_store::HttpObjectStore;

/// Durable object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`. Any non-success answer is an error.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DeliveryError>;

    /// Public URL of an object that `put` already accepted.
    async fn public_url(&self, bucket: &str, key: &str) -> Result<String, DeliveryError>;

    /// Bucket receiving artifacts of `kind`.
    fn bucket_for(&self, kind: MediaKind) -> &str;
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub storage_key: String,
    pub public_url: String,
    pub byte_size: u64,
}

/// `<owner>/<job>.<canonical extension>`. Deterministic, so re-running a job
/// targets the same object. Each id becomes exactly one path segment: bytes
/// outside `[A-Za-z0-9._-]` are replaced and dot-only ids are neutralised, so
/// the key survives URL resolution unchanged.
pub fn storage_key(owner_id: &str, job_id: &str, kind: MediaKind) -> String {
    format!(
        "{}/{}.{}",
        key_segment(owner_id),
        key_segment(job_id),
        kind.canonical_extension()
    )
}

fn key_segment(id: &str) -> String {
    let segment: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if segment.chars().all(|c| c == '.') {
        segment.replace('.', "_") + "_"
    } else {
        segment
    }
}

#[derive(Clone)]
pub struct DeliveryPipeline {
    store: Arc<dyn ObjectStore>,
}

impl DeliveryPipeline {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload `artifact` and resolve its public URL. Never retries; any
    /// failure is terminal for the job.
    pub async fn deliver(
        &self,
        artifact: &Artifact,
        owner_id: &str,
        job_id: &str,
    ) -> Result<Delivered, DeliveryError> {
        let bytes = tokio::fs::read(&artifact.path)
            .await
            .map_err(|source| DeliveryError::ReadArtifact {
                path: artifact.path.clone(),
                source,
            })?;
        let byte_size = bytes.len() as u64;
        let key = storage_key(owner_id, job_id, artifact.media_kind);
        let bucket = self.store.bucket_for(artifact.media_kind).to_string();

        tracing::info!(job_id, bucket = %bucket, key = %key, bytes = byte_size, "uploading artifact");
        self.store
            .put(&bucket, &key, bytes, artifact.media_kind.content_type())
            .await?;
        let public_url = self.store.public_url(&bucket, &key).await?;

        Ok(Delivered {
            storage_key: key,
            public_url,
            byte_size,
        })
    }
}
