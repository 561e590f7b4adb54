// Document ingestion pipeline: parse, chunk, embed, index.
//
// Progress events are pushed through a channel so the upload route can
// relay them to the client as SSE while the pipeline runs.

use futures::stream::{self, StreamExt};
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

use crate::chunker::TextChunker;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::documents::{DocumentStats, IngestEvent, ProcessingResult};
use crate::models::pinecone::Vector;
use crate::openai::OpenAiClient;
use crate::parser::parse_document;
use crate::pinecone::PineconeClient;

#[derive(Clone)]
pub struct IngestService {
    openai: OpenAiClient,
    pinecone: PineconeClient,
}

impl IngestService {
    pub fn new(openai: OpenAiClient, pinecone: PineconeClient) -> Self {
        Self { openai, pinecone }
    }

    /// Run the full ingestion pipeline for one uploaded document, reporting
    /// progress on the channel. Always returns a ProcessingResult; errors
    /// are captured in it rather than propagated.
    pub async fn process_document(
        &self,
        config: &Config,
        filename: &str,
        data: &[u8],
        progress: &UnboundedSender<IngestEvent>,
    ) -> ProcessingResult {
        let started = Instant::now();
        match self
            .process_inner(config, filename, data, progress, started)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Document processing failed for '{}': {}", filename, e);
                ProcessingResult::failure(e.to_string())
            }
        }
    }

    async fn process_inner(
        &self,
        config: &Config,
        filename: &str,
        data: &[u8],
        progress: &UnboundedSender<IngestEvent>,
        started: Instant,
    ) -> Result<ProcessingResult, ApiError> {
        let send = |event: IngestEvent| {
            let _ = progress.send(event);
        };

        send(IngestEvent::progress(
            "parsing",
            "Parsing document content...",
            10,
        ));
        let content = parse_document(filename, data)?;
        send(IngestEvent::progress(
            "parsing",
            format!("Parsed {} characters", content.len()),
            20,
        ));

        send(IngestEvent::progress(
            "chunking",
            "Chunking document into smaller pieces...",
            30,
        ));
        let chunker = TextChunker::new(config.document_chunk_size, config.document_chunk_overlap);
        let chunks = chunker.split(&content);
        if chunks.is_empty() {
            return Err(ApiError::ValidationError(
                "No content extracted from document".to_string(),
            ));
        }
        let total_chars: usize = chunks.iter().map(|c| c.len()).sum();
        send(IngestEvent::progress(
            "chunking",
            format!("Created {} chunks", chunks.len()),
            40,
        ));

        send(IngestEvent::progress(
            "embedding",
            format!("Generating embeddings for {} chunks...", chunks.len()),
            60,
        ));
        let embeddings = self.embed_chunks(config, &chunks).await?;
        send(IngestEvent::progress(
            "embedding",
            format!("Generated {} embeddings", embeddings.len()),
            75,
        ));

        let vectors = prepare_vectors(filename, &chunks, embeddings);
        send(IngestEvent::progress(
            "indexing",
            format!("Indexing {} vectors...", vectors.len()),
            80,
        ));
        let upserted = self
            .pinecone
            .upsert_batched(
                vectors,
                config.pinecone_batch_size,
                config.document_upsert_parallel_workers,
            )
            .await?;
        send(IngestEvent::progress(
            "indexing",
            format!("Indexed {} vectors", upserted),
            100,
        ));

        info!(
            "Processed '{}': {} chunks, {} chars in {:.2}s",
            filename,
            chunks.len(),
            total_chars,
            started.elapsed().as_secs_f64()
        );

        Ok(ProcessingResult {
            success: true,
            filename: Some(filename.to_string()),
            chunks_processed: Some(chunks.len()),
            total_chars: Some(total_chars),
            error: None,
        })
    }

    /// Embed chunks in parallel batches, preserving chunk order
    async fn embed_chunks(
        &self,
        config: &Config,
        chunks: &[String],
    ) -> Result<Vec<Vec<f32>>, ApiError> {
        let batch_size = config.document_embedding_batch_size.max(1);
        let batches: Vec<Vec<String>> = chunks.chunks(batch_size).map(|b| b.to_vec()).collect();

        let results: Vec<Result<Vec<Vec<f32>>, ApiError>> = stream::iter(batches)
            .map(|batch| {
                let openai = self.openai.clone();
                let model = config.openai_embedding_model.clone();
                async move { openai.embed(&model, batch).await }
            })
            .buffered(config.document_embedding_parallel_workers.max(1))
            .collect()
            .await;

        let mut embeddings = Vec::with_capacity(chunks.len());
        for result in results {
            embeddings.extend(result?);
        }
        Ok(embeddings)
    }

    /// Remove all indexed vectors for a document
    pub async fn delete_document(&self, filename: &str) -> Result<(), ApiError> {
        self.pinecone.delete_by_filename(filename).await
    }

    /// Index statistics, with failures folded into the response
    pub async fn document_stats(&self) -> DocumentStats {
        match self.pinecone.index_stats().await {
            Ok(stats) => DocumentStats {
                total_vectors: stats.total_vector_count,
                dimension: stats.dimension,
                index_fullness: stats.index_fullness,
                error: None,
            },
            Err(e) => DocumentStats {
                error: Some(e.to_string()),
                ..Default::default()
            },
        }
    }
}

/// Build vectors with stable ids derived from the chunk content
fn prepare_vectors(filename: &str, chunks: &[String], embeddings: Vec<Vec<f32>>) -> Vec<Vector> {
    let total = chunks.len();
    chunks
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, (chunk, values))| {
            let mut hasher = DefaultHasher::new();
            chunk.hash(&mut hasher);
            Vector {
                id: format!("{}_{}_{}", filename, i, hasher.finish()),
                values,
                metadata: json!({
                    "text": chunk,
                    "filename": filename,
                    "chunk_index": i,
                    "total_chunks": total,
                }),
            }
        })
        .collect()
}
