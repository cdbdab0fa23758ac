//! HTTP client for a store hosted by `vindex serve`.

use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::protocol::{
    EnsureCollectionRequest, ErrorBody, HealthResponse, InsertRequest, InsertResponse,
    SearchRequest, SearchResponse,
};
use super::{VectorStore, validate_collection_name};
use crate::error::{VindexError, VindexResult};
use crate::vector::{CollectionInfo, Metric, Record, SearchResult, VectorDimension};

/// Remote backend speaking the JSON protocol in [`super::protocol`].
pub struct RemoteStore {
    client: Client,
    base_url: String,
}

impl RemoteStore {
    /// Builds a client for `http://host:port`.
    ///
    /// No request is made here; an unreachable server surfaces as a backend
    /// error on the first operation.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> VindexResult<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(VindexError::config("remote store host cannot be empty"));
        }
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{port}", host.trim_end_matches('/'))
        } else {
            format!("http://{host}:{port}")
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VindexError::backend("connect", e))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Checks the server answers `/health`.
    pub fn health(&self) -> VindexResult<HealthResponse> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| VindexError::backend("health", e))?;
        Self::decode(response, "health")
    }

    fn collection_url(&self, name: &str) -> VindexResult<String> {
        validate_collection_name(name)?;
        Ok(format!("{}/collections/{name}", self.base_url))
    }

    fn call<B, T>(&self, method: Method, url: String, body: Option<&B>, operation: &str) -> VindexResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(%method, %url, "remote store request");
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .map_err(|e| VindexError::backend(operation, format!("{url}: {e}")))?;
        Self::decode(response, operation)
    }

    fn decode<T: DeserializeOwned>(response: Response, operation: &str) -> VindexResult<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .map_err(|e| VindexError::backend(operation, format!("invalid response: {e}")));
        }

        match response.json::<ErrorBody>() {
            Ok(body) => Err(body.into_error(operation)),
            Err(_) => Err(VindexError::backend(
                operation,
                format!("server returned HTTP {status}"),
            )),
        }
    }
}

impl VectorStore for RemoteStore {
    fn ensure_collection(
        &self,
        name: &str,
        dimension: VectorDimension,
        metric: Metric,
    ) -> VindexResult<CollectionInfo> {
        let url = self.collection_url(name)?;
        self.call(
            Method::PUT,
            url,
            Some(&EnsureCollectionRequest { dimension, metric }),
            "ensure_collection",
        )
    }

    fn insert(&self, name: &str, records: &[Record]) -> VindexResult<usize> {
        let url = format!("{}/records", self.collection_url(name)?);
        let response: InsertResponse = self.call(
            Method::POST,
            url,
            Some(&InsertRequest {
                records: records.to_vec(),
            }),
            "insert",
        )?;
        Ok(response.inserted)
    }

    fn search(
        &self,
        name: &str,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> VindexResult<Vec<SearchResult>> {
        let url = format!("{}/search", self.collection_url(name)?);
        let response: SearchResponse = self.call(
            Method::POST,
            url,
            Some(&SearchRequest {
                vector: query.to_vec(),
                top_k,
                threshold,
            }),
            "search",
        )?;
        Ok(response.results)
    }

    fn count(&self, name: &str) -> VindexResult<usize> {
        Ok(self.describe(name)?.count)
    }

    fn describe(&self, name: &str) -> VindexResult<CollectionInfo> {
        let url = self.collection_url(name)?;
        self.call::<(), _>(Method::GET, url, None, "describe")
    }

    fn drop_collection(&self, name: &str) -> VindexResult<()> {
        let url = self.collection_url(name)?;
        let _: serde_json::Value = self.call::<(), _>(Method::DELETE, url, None, "drop")?;
        Ok(())
    }

    fn location(&self) -> String {
        format!("remote:{}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let store = RemoteStore::connect("localhost", 19530, Duration::from_secs(1)).unwrap();
        assert_eq!(store.base_url(), "http://localhost:19530");

        let store = RemoteStore::connect("https://db.internal/", 443, Duration::from_secs(1)).unwrap();
        assert_eq!(store.base_url(), "https://db.internal:443");

        assert!(RemoteStore::connect("  ", 1, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_unreachable_server_is_backend_error() {
        // port 1 is reserved and nothing listens on it in test environments
        let store = RemoteStore::connect("127.0.0.1", 1, Duration::from_millis(500)).unwrap();
        assert!(matches!(
            store.count("clip_images"),
            Err(VindexError::Backend { .. })
        ));
    }
}
