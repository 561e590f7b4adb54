// Retrieval over the vector index for chat answers.
//
// Retrieval fans out over model-generated search queries (question-based
// plus answer-focused), filters by similarity, deduplicates, and wraps the
// top chunks in the document-context envelope.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::models::openai::ChatMessage;
use crate::models::pinecone::QueryMatch;
use crate::openai::OpenAiClient;
use crate::pinecone::PineconeClient;
use crate::prompts::{
    answer_focused_query_prompt, build_rag_context, query_generation_prompt,
    ANSWER_QUERY_SYSTEM_PROMPT, QUERY_GEN_SYSTEM_PROMPT,
};

const MAX_QUERIES_PER_LIST: usize = 12;
const MAX_PARALLEL_SEARCHES: usize = 5;

#[derive(Clone)]
pub struct RagService {
    openai: OpenAiClient,
    pinecone: PineconeClient,
}

impl RagService {
    pub fn new(openai: OpenAiClient, pinecone: PineconeClient) -> Self {
        Self { openai, pinecone }
    }

    /// Retrieve document context for a message, or None when nothing relevant
    /// is found. Retrieval failures degrade to None so chat keeps working.
    pub async fn retrieve_context(&self, config: &Config, message: &str) -> Option<String> {
        if !config.chat_rag_enabled {
            return None;
        }

        let queries = if config.chat_query_gen_enabled {
            let question_queries = self.generate_search_queries(config, message).await;
            let answer_queries = self.generate_answer_focused_queries(config, message).await;

            let mut queries: Vec<String> = Vec::new();
            if !question_queries.contains(&message.to_string())
                && !answer_queries.contains(&message.to_string())
            {
                queries.push(message.to_string());
            }
            info!(
                "Generated {} question queries + {} answer queries for: '{}'",
                question_queries.len(),
                answer_queries.len(),
                truncate(message, 50)
            );
            queries.extend(question_queries);
            queries.extend(answer_queries);
            queries
        } else {
            vec![message.to_string()]
        };

        let mut matches = self.search_parallel(config, &queries).await;

        // Fall back to a direct search on the original message
        if matches.is_empty() {
            debug!("No results from query fan-out, trying direct search");
            matches = self.search_single(config, message).await.unwrap_or_default();
        }

        let chunks = deduplicate_chunks(&matches, config.pinecone_rag_k);
        if chunks.is_empty() {
            warn!(
                "No relevant documents found for query: '{}'",
                truncate(message, 50)
            );
            return None;
        }

        info!(
            "Retrieved {} document chunks for query: '{}'",
            chunks.len(),
            truncate(message, 50)
        );
        build_rag_context(&chunks)
    }

    /// Generate 3-5 question-based search queries. Falls back to the
    /// original message when generation fails.
    pub async fn generate_search_queries(&self, config: &Config, message: &str) -> Vec<String> {
        let messages = vec![
            ChatMessage::system(QUERY_GEN_SYSTEM_PROMPT),
            ChatMessage::user(query_generation_prompt(message)),
        ];
        let response = self
            .openai
            .chat_completion(
                &config.openai_query_gen_model,
                messages,
                config.openai_query_gen_temperature,
                config.openai_query_gen_max_tokens,
            )
            .await;

        match response {
            Ok(text) => {
                let queries = parse_query_list(&text);
                if queries.is_empty() {
                    vec![message.to_string()]
                } else {
                    queries
                }
            }
            Err(e) => {
                warn!("Query generation failed: {}", e);
                vec![message.to_string()]
            }
        }
    }

    /// Generate 5-8 queries targeting likely answer terms. Empty on failure.
    pub async fn generate_answer_focused_queries(
        &self,
        config: &Config,
        message: &str,
    ) -> Vec<String> {
        let messages = vec![
            ChatMessage::system(ANSWER_QUERY_SYSTEM_PROMPT),
            ChatMessage::user(answer_focused_query_prompt(message)),
        ];
        // Slightly warmer than plain query generation for more creative
        // answer predictions
        let response = self
            .openai
            .chat_completion(&config.openai_query_gen_model, messages, 0.5, 300)
            .await;

        match response {
            Ok(text) => parse_query_list(&text),
            Err(e) => {
                warn!("Answer-focused query generation failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn search_single(
        &self,
        config: &Config,
        query: &str,
    ) -> Result<Vec<QueryMatch>, ApiError> {
        let embedding = self
            .openai
            .embed(&config.openai_embedding_model, vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::UpstreamError("Empty embedding response".into()))?;

        let matches = self.pinecone.query(embedding, config.pinecone_rag_k).await?;
        Ok(filter_by_similarity(
            matches,
            config.pinecone_rag_similarity_threshold,
        ))
    }

    async fn search_parallel(&self, config: &Config, queries: &[String]) -> Vec<QueryMatch> {
        if queries.is_empty() {
            return Vec::new();
        }

        let mut matches = Vec::new();

        if config.chat_parallel_search && queries.len() > 1 {
            let mut in_flight = FuturesUnordered::new();
            let mut pending = queries.iter();

            for query in pending.by_ref().take(MAX_PARALLEL_SEARCHES) {
                in_flight.push(self.search_single(config, query));
            }
            while let Some(result) = in_flight.next().await {
                match result {
                    Ok(found) => matches.extend(found),
                    Err(e) => warn!("Query search failed: {}", e),
                }
                if let Some(query) = pending.next() {
                    in_flight.push(self.search_single(config, query));
                }
            }
        } else {
            for query in queries {
                match self.search_single(config, query).await {
                    Ok(found) => matches.extend(found),
                    Err(e) => warn!("Query search failed: {}", e),
                }
            }
        }

        matches
    }
}

/// Parse a JSON array of query strings, stripping code fences and dropping
/// entries that are too short to be useful. Each generated list is capped
/// independently; the combined fan-out is not.
fn parse_query_list(text: &str) -> Vec<String> {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    match serde_json::from_str::<Vec<String>>(text.trim()) {
        Ok(queries) => queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| q.len() > 2)
            .take(MAX_QUERIES_PER_LIST)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Drop matches below the similarity threshold. Matches without a score are
/// kept; if everything is filtered out the top 10 originals are kept instead
/// so an over-strict threshold never blanks retrieval entirely.
fn filter_by_similarity(matches: Vec<QueryMatch>, threshold: f32) -> Vec<QueryMatch> {
    if threshold <= 0.0 || matches.is_empty() {
        return matches;
    }

    let filtered: Vec<QueryMatch> = matches
        .iter()
        .filter(|m| m.score.map_or(true, |s| s >= threshold))
        .cloned()
        .collect();

    if filtered.is_empty() {
        matches.into_iter().take(10).collect()
    } else {
        filtered
    }
}

/// Deduplicate chunk texts by a hash of their first 500 characters, keeping
/// relevance order, capped at `limit`
fn deduplicate_chunks(matches: &[QueryMatch], limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut chunks = Vec::new();

    for m in matches {
        let Some(text) = m.text() else { continue };
        let prefix: String = text.chars().take(500).collect();
        let mut hasher = DefaultHasher::new();
        prefix.hash(&mut hasher);
        if seen.insert(hasher.finish()) {
            chunks.push(text.to_string());
            if chunks.len() >= limit {
                break;
            }
        }
    }

    chunks
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliArgs;
    use crate::http_client::UpstreamClient;
    use clap::Parser;
    use serde_json::json;
    use std::sync::Arc;

    fn test_config() -> Config {
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("PINECONE_API_KEY", "pc-test");
        std::env::set_var("SUPABASE_URL", "https://test.supabase.co");
        std::env::set_var("SUPABASE_KEY", "anon");
        std::env::set_var("SUPABASE_SERVICE_KEY", "service");
        Config::from_args(CliArgs::parse_from(["market-chatbot"])).unwrap()
    }

    fn test_service(server_url: &str) -> RagService {
        let http = Arc::new(UpstreamClient::new(5, 5, 5, 0).unwrap());
        let openai = OpenAiClient::new(http.clone(), "sk-test".to_string())
            .with_base_url(server_url.to_string());
        let pinecone = PineconeClient::with_host(http, "pc-test".to_string(), server_url);
        RagService::new(openai, pinecone)
    }

    fn completion_body(queries: &[String]) -> String {
        json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": serde_json::to_string(queries).unwrap()
                },
                "finish_reason": "stop"
            }]
        })
        .to_string()
    }

    fn m(id: &str, score: Option<f32>, text: &str) -> QueryMatch {
        QueryMatch {
            id: id.to_string(),
            score,
            metadata: Some(json!({ "text": text })),
        }
    }

    #[test]
    fn test_parse_query_list() {
        let queries = parse_query_list(r#"["cash flow", "free cash flow", "x"]"#);
        assert_eq!(queries, vec!["cash flow", "free cash flow"]);

        let queries = parse_query_list("```json\n[\"apple stock\"]\n```");
        assert_eq!(queries, vec!["apple stock"]);

        assert!(parse_query_list("not json").is_empty());
    }

    #[test]
    fn test_parse_query_list_caps_at_twelve() {
        let raw: Vec<String> = (0..20).map(|i| format!("query {}", i)).collect();
        let queries = parse_query_list(&serde_json::to_string(&raw).unwrap());
        assert_eq!(queries.len(), MAX_QUERIES_PER_LIST);
    }

    #[test]
    fn test_filter_by_similarity() {
        let matches = vec![
            m("a", Some(0.9), "keep"),
            m("b", Some(0.1), "drop"),
            m("c", None, "keep unscored"),
        ];
        let filtered = filter_by_similarity(matches, 0.3);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].id, "a");
        assert_eq!(filtered[1].id, "c");
    }

    #[test]
    fn test_filter_keeps_originals_when_all_filtered() {
        let matches: Vec<QueryMatch> = (0..15)
            .map(|i| m(&format!("m{}", i), Some(0.05), "low"))
            .collect();
        let filtered = filter_by_similarity(matches, 0.3);
        assert_eq!(filtered.len(), 10);
    }

    #[test]
    fn test_filter_disabled_at_zero_threshold() {
        let matches = vec![m("a", Some(0.01), "x")];
        assert_eq!(filter_by_similarity(matches, 0.0).len(), 1);
    }

    #[test]
    fn test_deduplicate_preserves_order_and_caps() {
        let matches = vec![
            m("a", Some(0.9), "first chunk"),
            m("b", Some(0.8), "first chunk"),
            m("c", Some(0.7), "second chunk"),
            m("d", Some(0.6), "third chunk"),
        ];
        let chunks = deduplicate_chunks(&matches, 2);
        assert_eq!(chunks, vec!["first chunk", "second chunk"]);
    }

    #[tokio::test]
    async fn test_fan_out_searches_every_generated_query() {
        let mut server = mockito::Server::new_async().await;

        // A full question list plus answer-focused queries; every one of
        // them (and the original message) gets its own search
        let question_queries: Vec<String> =
            (0..12).map(|i| format!("question query {}", i)).collect();
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex(
                "3-5 different search queries".to_string(),
            ))
            .with_status(200)
            .with_body(completion_body(&question_queries))
            .create_async()
            .await;

        let answer_queries: Vec<String> =
            (0..3).map(|i| format!("answer query {}", i)).collect();
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("ANSWER TERMS".to_string()))
            .with_status(200)
            .with_body(completion_body(&answer_queries))
            .create_async()
            .await;

        // 1 original message + 12 question + 3 answer queries
        let embeddings = server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[{"index":0,"embedding":[0.1,0.2]}]}"#)
            .expect(16)
            .create_async()
            .await;
        server
            .mock("POST", "/query")
            .with_status(200)
            .with_body(r#"{"matches":[{"id":"m0","score":0.9,"metadata":{"text":"Insiders know."}}]}"#)
            .expect(16)
            .create_async()
            .await;

        let config = test_config();
        let context = test_service(&server.url())
            .retrieve_context(&config, "what do insiders know")
            .await;

        assert!(context.unwrap().contains("Insiders know."));
        embeddings.assert_async().await;
    }

    #[test]
    fn test_deduplicate_compares_long_texts_by_prefix() {
        let long_a = format!("{}{}", "x".repeat(500), "tail one");
        let long_b = format!("{}{}", "x".repeat(500), "tail two");
        let matches = vec![m("a", None, &long_a), m("b", None, &long_b)];
        // Same first 500 chars collapse to one chunk
        let chunks = deduplicate_chunks(&matches, 30);
        assert_eq!(chunks.len(), 1);
    }
}
