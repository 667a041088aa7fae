//! Title and thumbnail lookup for a source reference.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use tubemux_models::VideoMetadata;

use crate::error::{MediaError, MediaResult};

/// Default oEmbed proxy endpoint.
pub const DEFAULT_NOEMBED_URL: &str = "https://noembed.com/embed";

/// Resolves a human-readable title for a source reference.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn lookup(&self, source_ref: &str) -> MediaResult<VideoMetadata>;
}

/// [`MetadataLookup`] backed by the noembed oEmbed proxy.
#[derive(Debug, Clone)]
pub struct NoembedClient {
    client: Client,
    endpoint: String,
}

/// noembed reports failures as a 200 with an `error` field.
#[derive(Debug, Deserialize)]
struct NoembedResponse {
    title: Option<String>,
    thumbnail_url: Option<String>,
    error: Option<String>,
}

impl NoembedClient {
    pub fn new(endpoint: impl Into<String>) -> MediaResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MediaError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

/// Expand a bare video ID into a watch URL; URLs pass through.
fn embed_target(source_ref: &str) -> String {
    let trimmed = source_ref.trim();
    if trimmed.contains("://") || trimmed.contains('.') {
        trimmed.to_string()
    } else {
        format!("https://www.youtube.com/watch?v={}", trimmed)
    }
}

#[async_trait]
impl MetadataLookup for NoembedClient {
    async fn lookup(&self, source_ref: &str) -> MediaResult<VideoMetadata> {
        let target = embed_target(source_ref);
        debug!(source_ref = %source_ref, "Looking up metadata");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", target.as_str())])
            .send()
            .await
            .map_err(|e| MediaError::lookup_failed(format!("noembed request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::lookup_failed(format!(
                "noembed returned {}: {}",
                status, body
            )));
        }

        let body: NoembedResponse = response.json().await.map_err(|e| {
            MediaError::lookup_failed(format!("Failed to parse noembed response: {}", e))
        })?;

        if let Some(error) = body.error {
            return Err(MediaError::lookup_failed(error));
        }

        let title = body
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MediaError::lookup_failed("No title in noembed response"))?;

        Ok(VideoMetadata {
            title,
            thumbnail_url: body.thumbnail_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> NoembedClient {
        NoembedClient::new(format!("{}/embed", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_lookup_returns_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/embed"))
            .and(query_param("url", "https://youtu.be/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "  Big Buck Bunny ",
                "thumbnail_url": "https://i.ytimg.com/vi/abc/hqdefault.jpg",
                "provider_name": "YouTube"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let meta = client_for(&server).await.lookup("https://youtu.be/abc").await.unwrap();
        assert_eq!(meta.title, "Big Buck Bunny");
        assert_eq!(
            meta.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/abc/hqdefault.jpg")
        );
    }

    #[tokio::test]
    async fn test_bare_id_is_expanded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("url", "https://www.youtube.com/watch?v=abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "title": "abc video" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let meta = client_for(&server).await.lookup("abc").await.unwrap();
        assert_eq!(meta.title, "abc video");
        assert!(meta.thumbnail_url.is_none());
    }

    #[tokio::test]
    async fn test_error_body_is_lookup_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "error": "no matching providers found" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).await.lookup("https://example.com/x").await.unwrap_err();
        match err {
            MediaError::LookupFailed { message } => assert!(message.contains("no matching providers")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_error_is_lookup_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).await.lookup("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, MediaError::LookupFailed { .. }));
    }

    #[test]
    fn test_embed_target() {
        assert_eq!(embed_target("abc"), "https://www.youtube.com/watch?v=abc");
        assert_eq!(embed_target("youtu.be/abc"), "youtu.be/abc");
        assert_eq!(embed_target("https://youtu.be/abc"), "https://youtu.be/abc");
    }
}
