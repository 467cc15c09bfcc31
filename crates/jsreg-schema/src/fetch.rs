//! # Remote Schema Cache
//!
//! Fetches schema documents over HTTP and keeps every successfully parsed
//! document for the lifetime of the owning registry.
//!
//! ## Cache Semantics
//!
//! - Keys are normalized URIs (see [`normalize_uri`]), so
//!   `http://h/s.json#/a` and `http://h/s.json` share one entry.
//! - Only parsed documents are cached. A failed status, transport error or
//!   unparseable body leaves the cache untouched.
//! - There is no expiry and no invalidation.
//! - Concurrent fetches of the same uncached URI are not coalesced. Each
//!   one hits the network and the last to finish wins.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RegistryConfig;
use crate::engine::DocumentSet;
use crate::error::FetchError;

/// A per-registry cache of remote schema documents.
#[derive(Debug)]
pub struct RemoteSchemaCache {
    http: reqwest::Client,
    entries: RwLock<HashMap<String, Arc<Value>>>,
}

impl RemoteSchemaCache {
    /// Create an empty cache with an HTTP client built from `config`.
    ///
    /// # Errors
    ///
    /// Returns the client error if the TLS backend cannot be initialized.
    pub fn new(config: &RegistryConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(http))
    }

    /// Create an empty cache around an existing client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the document at `uri`, from the cache or the network.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUri`] for a URI that is not absolute HTTP(S).
    /// - [`FetchError::Http`] on transport failure.
    /// - [`FetchError::Status`] when the server answers with 300 or above.
    ///   The body is drained first.
    /// - [`FetchError::Parse`] when the body is not JSON.
    pub async fn fetch(&self, uri: &str) -> Result<Arc<Value>, FetchError> {
        let key = normalize_uri(uri);
        if let Some(hit) = self.get(&key) {
            debug!(uri = %key, "schema cache hit");
            return Ok(hit);
        }

        let url = Url::parse(&key).map_err(|e| FetchError::InvalidUri {
            uri: key.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUri {
                uri: key,
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        info!(uri = %key, "fetching remote schema");
        let mut resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                uri: key.clone(),
                source: e,
            })?;

        let status = resp.status().as_u16();
        if status >= 300 {
            // Drain so the connection can be reused.
            while let Ok(Some(_)) = resp.chunk().await {}
            warn!(uri = %key, status, "remote schema fetch failed");
            return Err(FetchError::Status { uri: key, status });
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| FetchError::Http {
            uri: key.clone(),
            source: e,
        })? {
            body.extend_from_slice(&chunk);
        }

        let document: Value = serde_json::from_slice(&body).map_err(|e| {
            warn!(uri = %key, error = %e, "remote schema is not valid JSON");
            FetchError::Parse {
                uri: key.clone(),
                source: e,
            }
        })?;

        let document = Arc::new(document);
        self.entries.write().insert(key, Arc::clone(&document));
        Ok(document)
    }

    /// Store `document` under `uri`, replacing any previous entry.
    pub fn insert(&self, uri: &str, document: Value) {
        self.entries
            .write()
            .insert(normalize_uri(uri), Arc::new(document));
    }

    /// The cached document for `uri`, if any.
    pub fn get(&self, uri: &str) -> Option<Arc<Value>> {
        self.entries.read().get(&normalize_uri(uri)).cloned()
    }

    /// Returns true if a document is cached for `uri`.
    pub fn contains(&self, uri: &str) -> bool {
        self.entries.read().contains_key(&normalize_uri(uri))
    }

    /// Number of cached documents.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// A point-in-time copy of the cache, for handing to an engine.
    pub fn snapshot(&self) -> DocumentSet {
        self.entries.read().clone()
    }
}

/// Canonical cache key for `uri`: parsed and re-serialized when it is an
/// absolute URL, with any fragment removed.
pub fn normalize_uri(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => uri.split_once('#').map_or(uri, |(doc, _)| doc).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> RemoteSchemaCache {
        RemoteSchemaCache::new(&RegistryConfig::default()).unwrap()
    }

    #[test]
    fn normalize_strips_fragment() {
        assert_eq!(
            normalize_uri("http://example.com/a.json#/definitions/x"),
            "http://example.com/a.json"
        );
        assert_eq!(normalize_uri("HTTP://Example.com/a.json"), "http://example.com/a.json");
        assert_eq!(normalize_uri("relative.json#frag"), "relative.json");
    }

    #[test]
    fn insert_then_get_ignores_fragment() {
        let cache = cache();
        assert!(cache.is_empty());
        cache.insert("http://example.com/a.json", json!({"type": "string"}));
        assert!(cache.contains("http://example.com/a.json#/anything"));
        assert_eq!(
            cache.get("http://example.com/a.json").as_deref(),
            Some(&json!({"type": "string"}))
        );
        assert_eq!(cache.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn cached_documents_are_served_without_network() {
        let cache = cache();
        // Port 9 (discard) is never contacted: the entry is already present.
        cache.insert("http://127.0.0.1:9/s.json", json!({"const": 1}));
        let doc = cache.fetch("http://127.0.0.1:9/s.json").await.unwrap();
        assert_eq!(*doc, json!({"const": 1}));
    }

    #[tokio::test]
    async fn non_http_uris_are_rejected() {
        let err = cache().fetch("json-schema:///other.json").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUri { .. }));
        let err = cache().fetch("not a uri").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUri { .. }));
    }
}
