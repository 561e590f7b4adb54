// Pinecone data-plane wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A vector prepared for upsert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertRequest {
    pub vectors: Vec<Vector>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertResponse {
    #[serde(default)]
    pub upserted_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub include_values: bool,
    pub include_metadata: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl QueryMatch {
    /// Chunk text stored in the vector metadata, if present
    pub fn text(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("text"))
            .and_then(|t| t.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub matches: Vec<QueryMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteRequest {
    pub filter: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatsResponse {
    #[serde(default)]
    pub total_vector_count: u64,
    #[serde(default)]
    pub dimension: u64,
    #[serde(default)]
    pub index_fullness: f64,
}

/// Control-plane index description; only the host matters to us
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub host: String,
    #[serde(default)]
    pub dimension: Option<u64>,
}
