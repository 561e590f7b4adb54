// Pinecone vector store client.
//
// The data-plane host is resolved once at startup from the control plane
// (https://api.pinecone.io) and cached for the lifetime of the process.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::http_client::UpstreamClient;
use crate::models::pinecone::{
    DeleteRequest, IndexDescription, IndexStatsResponse, QueryMatch, QueryRequest, QueryResponse,
    UpsertRequest, UpsertResponse, Vector,
};

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";

#[derive(Clone)]
pub struct PineconeClient {
    http: Arc<UpstreamClient>,
    api_key: String,
    /// Data-plane base URL, e.g. "https://my-index-abc123.svc.us-east-1.pinecone.io"
    host: String,
}

impl PineconeClient {
    /// Resolve the index host from the control plane and build a client.
    ///
    /// Fails fast so a misconfigured index name or key is caught at startup.
    pub async fn connect(
        http: Arc<UpstreamClient>,
        api_key: String,
        index_name: &str,
    ) -> Result<Self, ApiError> {
        let host =
            Self::resolve_host(&http, &api_key, CONTROL_PLANE_URL, index_name).await?;
        info!("Connected to Pinecone index '{}' at {}", index_name, host);
        Ok(Self {
            http,
            api_key,
            host,
        })
    }

    /// Build a client against a known host, skipping control-plane resolution
    pub fn with_host(http: Arc<UpstreamClient>, api_key: String, host: impl Into<String>) -> Self {
        let mut host = host.into();
        if !host.starts_with("http") {
            host = format!("https://{}", host);
        }
        Self {
            http,
            api_key,
            host,
        }
    }

    async fn resolve_host(
        http: &UpstreamClient,
        api_key: &str,
        control_plane: &str,
        index_name: &str,
    ) -> Result<String, ApiError> {
        let req = http
            .client()
            .get(format!("{}/indexes/{}", control_plane, index_name))
            .header("Api-Key", api_key)
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = http.request_with_retry(req).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::PineconeError {
                status: status.as_u16(),
                message: format!("describe index '{}' failed: {}", index_name, message),
            });
        }

        let description: IndexDescription = response.json().await.map_err(|e| {
            ApiError::UpstreamError(format!("Invalid index description: {}", e))
        })?;

        let mut host = description.host;
        if !host.starts_with("http") {
            host = format!("https://{}", host);
        }
        Ok(host)
    }

    async fn post_json<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: &Req,
    ) -> Result<Resp, ApiError> {
        let req = self
            .http
            .client()
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .json(payload)
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = self.http.request_with_retry(req).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::PineconeError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::UpstreamError(format!("Invalid Pinecone response: {}", e)))
    }

    /// Upsert a single batch of vectors
    pub async fn upsert(&self, vectors: Vec<Vector>) -> Result<usize, ApiError> {
        if vectors.is_empty() {
            return Ok(0);
        }
        let response: UpsertResponse = self
            .post_json("/vectors/upsert", &UpsertRequest { vectors })
            .await?;
        Ok(response.upserted_count)
    }

    /// Upsert vectors in batches with bounded parallelism.
    ///
    /// Returns the total upserted count. A single failed batch fails the
    /// whole call so ingestion does not silently drop chunks.
    pub async fn upsert_batched(
        &self,
        vectors: Vec<Vector>,
        batch_size: usize,
        parallel_workers: usize,
    ) -> Result<usize, ApiError> {
        if vectors.is_empty() {
            return Ok(0);
        }

        let batches: Vec<Vec<Vector>> = vectors
            .chunks(batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();
        let total_batches = batches.len();
        debug!(
            "Upserting {} batches with up to {} in flight",
            total_batches, parallel_workers
        );

        let mut in_flight = FuturesUnordered::new();
        let mut pending = batches.into_iter();
        let mut total = 0usize;

        for batch in pending.by_ref().take(parallel_workers.max(1)) {
            in_flight.push(self.upsert(batch));
        }
        while let Some(result) = in_flight.next().await {
            total += result?;
            if let Some(batch) = pending.next() {
                in_flight.push(self.upsert(batch));
            }
        }

        Ok(total)
    }

    /// Query the index for the nearest neighbors of an embedding
    pub async fn query(
        &self,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, ApiError> {
        let response: QueryResponse = self
            .post_json(
                "/query",
                &QueryRequest {
                    vector,
                    top_k,
                    include_values: false,
                    include_metadata: true,
                },
            )
            .await?;
        Ok(response.matches)
    }

    /// Delete every vector belonging to a document
    pub async fn delete_by_filename(&self, filename: &str) -> Result<(), ApiError> {
        let payload = DeleteRequest {
            filter: serde_json::json!({ "filename": { "$eq": filename } }),
        };
        let _: serde_json::Value = self.post_json("/vectors/delete", &payload).await?;
        info!("Deleted vectors for document '{}'", filename);
        Ok(())
    }

    /// Fetch index statistics
    pub async fn index_stats(&self) -> Result<IndexStatsResponse, ApiError> {
        self.post_json("/describe_index_stats", &serde_json::json!({}))
            .await
            .map_err(|e| {
                warn!("Failed to fetch index stats: {}", e);
                e
            })
    }
}
