// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Object store speaking the Supabase storage REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::ObjectStore;
use crate::config::{PublicUrlMode, StorageConfig};
use crate::error::{truncate_message, DeliveryError};
use crate::job::MediaKind;

/// Cap on the response body echoed into a rejection error.
const MAX_BODY_CHARS: usize = 200;

pub struct HttpObjectStore {
    client: Client,
    config: StorageConfig,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

impl HttpObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: StorageConfig) -> Self {
        Self { client, config }
    }

    /// `{base}/storage/v1/object/<route...>/<bucket>/<key>`, with every
    /// segment pushed individually so nothing in the key is re-interpreted
    /// as path navigation, query or fragment.
    fn object_url(&self, route: &[&str], bucket: &str, key: &str) -> Result<Url, DeliveryError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|_| DeliveryError::Endpoint(self.config.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| DeliveryError::Endpoint(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(["storage", "v1", "object"])
            .extend(route)
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.config.service_key)
            .header("apikey", &self.config.service_key)
    }

    async fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in_secs: u64,
    ) -> Result<String, DeliveryError> {
        let url = self.object_url(&["sign"], bucket, key)?;
        let resp = self
            .authed(self.client.post(url))
            .json(&serde_json::json!({ "expiresIn": expires_in_secs }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::PublicUrl {
                key: key.to_string(),
                reason: format!("HTTP {}: {}", status.as_u16(), truncate_message(&body, MAX_BODY_CHARS)),
            });
        }
        let parsed: SignedUrlResponse = resp.json().await.map_err(|e| DeliveryError::PublicUrl {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        // The backend answers with a path relative to the storage API root.
        if parsed.signed_url.starts_with("http") {
            Ok(parsed.signed_url)
        } else {
            Ok(format!(
                "{}/storage/v1{}",
                self.config.base_url, parsed.signed_url
            ))
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), DeliveryError> {
        let resp = self
            .authed(self.client.post(self.object_url(&[], bucket, key)?))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(bucket, key, status = status.as_u16(), "object stored");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            key: key.to_string(),
            status: status.as_u16(),
            body: truncate_message(&body, MAX_BODY_CHARS),
        })
    }

    async fn public_url(&self, bucket: &str, key: &str) -> Result<String, DeliveryError> {
        match &self.config.url_mode {
            PublicUrlMode::Template { template } => Ok(template
                .replace("{bucket}", bucket)
                .replace("{key}", key)),
            PublicUrlMode::Lookup { expires_in_secs } => {
                self.signed_url(bucket, key, *expires_in_secs).await
            }
        }
    }

    fn bucket_for(&self, kind: MediaKind) -> &str {
        self.config.bucket_for(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer, mode: Option<PublicUrlMode>) -> HttpObjectStore {
        let mut config = StorageConfig::new(server.uri(), "service-key");
        if let Some(mode) = mode {
            config.url_mode = mode;
        }
        HttpObjectStore::new(config)
    }

    #[tokio::test]
    async fn test_put_sends_auth_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/audio-files/artist-1/asset-1.mp3"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("apikey", "service-key"))
            .and(header("content-type", "audio/mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"Key": "x"})))
            .expect(1)
            .mount(&server)
            .await;

        let s = store(&server, None);
        s.put("audio-files", "artist-1/asset-1.mp3", b"abc".to_vec(), "audio/mp3")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_rejection_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413).set_body_string("Payload too large"))
            .mount(&server)
            .await;

        let err = store(&server, None)
            .put("media-assets", "a/b.mp4", vec![0; 16], "video/mp4")
            .await
            .unwrap_err();
        match err {
            DeliveryError::Rejected { status, body, key } => {
                assert_eq!(status, 413);
                assert_eq!(body, "Payload too large");
                assert_eq!(key, "a/b.mp4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_template_public_url() {
        let server = MockServer::start().await;
        let s = store(&server, None);
        let url = s.public_url("audio-files", "artist-1/asset-1.mp3").await.unwrap();
        assert_eq!(
            url,
            format!("{}/storage/v1/object/public/audio-files/artist-1/asset-1.mp3", server.uri())
        );
    }

    #[tokio::test]
    async fn test_lookup_public_url_uses_signed_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/sign/media-assets/artist-1/asset-1.mp4"))
            .and(body_json(serde_json::json!({ "expiresIn": 60 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signedURL": "/object/sign/media-assets/artist-1/asset-1.mp4?token=t"
            })))
            .mount(&server)
            .await;

        let s = store(&server, Some(PublicUrlMode::Lookup { expires_in_secs: 60 }));
        let url = s.public_url("media-assets", "artist-1/asset-1.mp4").await.unwrap();
        assert_eq!(
            url,
            format!(
                "{}/storage/v1/object/sign/media-assets/artist-1/asset-1.mp4?token=t",
                server.uri()
            )
        );
    }

    #[tokio::test]
    async fn test_put_keeps_unusual_ids_inside_object_route() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let s = store(&server, None);
        for (owner, job) in [("../../admin", "x"), ("o", "a#frag"), ("o", "a?upsert=true")] {
            let key = crate::delivery::storage_key(owner, job, MediaKind::Audio);
            s.put("audio-files", &key, b"abc".to_vec(), "audio/mp3").await.unwrap();
            let public = s.public_url("audio-files", &key).await.unwrap();
            assert!(public.ends_with(&format!("/audio-files/{key}")), "{public}");
        }

        let requests = server.received_requests().await.unwrap();
        let paths: Vec<(String, Option<String>)> = requests
            .iter()
            .map(|r| (r.url.path().to_string(), r.url.query().map(String::from)))
            .collect();
        assert_eq!(
            paths,
            vec![
                ("/storage/v1/object/audio-files/.._.._admin/x.mp3".to_string(), None),
                ("/storage/v1/object/audio-files/o/a_frag.mp3".to_string(), None),
                ("/storage/v1/object/audio-files/o/a_upsert_true.mp3".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_is_public_url_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let s = store(&server, Some(PublicUrlMode::Lookup { expires_in_secs: 60 }));
        let err = s.public_url("media-assets", "x.mp4").await.unwrap_err();
        assert!(matches!(err, DeliveryError::PublicUrl { .. }));
    }
}
