use anyhow::{Context, Result};
use clap::Parser;

/// Market Chatbot backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY")]
    pub pinecone_api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "300")]
    pub http_timeout: u64,

    /// HTTP max retries
    #[arg(long, env = "HTTP_MAX_RETRIES", default_value = "3")]
    pub http_retries: u32,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,
    pub log_level: String,
    pub cors_origins: Vec<String>,

    // OpenAI
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_temperature: f32,
    pub openai_max_tokens: u32,
    pub openai_extraction_model: String,
    pub openai_extraction_temperature: f32,
    pub openai_extraction_max_tokens: u32,
    pub openai_query_gen_model: String,
    pub openai_query_gen_temperature: f32,
    pub openai_query_gen_max_tokens: u32,
    pub openai_embedding_model: String,

    // Pinecone
    pub pinecone_api_key: String,
    pub pinecone_environment: String,
    pub pinecone_index_name: String,
    pub pinecone_batch_size: usize,
    pub pinecone_rag_k: usize,
    pub pinecone_rag_similarity_threshold: f32,

    // Supabase
    pub supabase_url: String,
    pub supabase_key: String,
    pub supabase_service_key: String,
    pub supabase_table_name: String,

    // Email / SendGrid
    pub email_from: String,
    pub email_from_name: String,
    pub email_recipient: String,
    pub sendgrid_api_key: String,
    pub sendgrid_enabled: bool,

    // Document processing
    pub document_chunk_size: usize,
    pub document_chunk_overlap: usize,
    pub document_embedding_batch_size: usize,
    pub document_embedding_parallel_workers: usize,
    pub document_upsert_parallel_workers: usize,

    // Chat
    pub chat_history_limit: usize,
    pub chat_rag_enabled: bool,
    pub chat_query_gen_enabled: bool,
    pub chat_parallel_search: bool,

    // Data validation
    pub validation_name_min_length: usize,
    pub validation_name_invalid_words: Vec<String>,
    pub validation_email_min_length: usize,
    pub validation_income_min_length: usize,
    pub validation_income_max_length: usize,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,
    pub http_max_retries: u32,
}

const DEFAULT_INVALID_NAME_WORDS: &str =
    "interested,looking,trading,stock,market,hi,hello,hey,i,am,in,yes,no,ok,okay";

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();

        Self::from_args(args)
    }

    /// Build config from parsed CLI arguments plus the environment
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Config {
            server_host: args.host,
            server_port: args.port,
            log_level: args.log_level,
            cors_origins: parse_list(&env_or(
                "CORS_ORIGINS",
                "http://localhost:5173,http://localhost:3000",
            )),

            openai_api_key: args
                .openai_api_key
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .context("OPENAI_API_KEY is required")?,
            openai_model: env_or("OPENAI_MODEL", "gpt-4-turbo-preview"),
            openai_temperature: env_parsed("OPENAI_TEMPERATURE", 0.7),
            openai_max_tokens: env_parsed("OPENAI_MAX_TOKENS", 1500),
            openai_extraction_model: env_or("OPENAI_EXTRACTION_MODEL", "gpt-4-turbo-preview"),
            openai_extraction_temperature: env_parsed("OPENAI_EXTRACTION_TEMPERATURE", 0.1),
            openai_extraction_max_tokens: env_parsed("OPENAI_EXTRACTION_MAX_TOKENS", 200),
            openai_query_gen_model: env_or("OPENAI_QUERY_GEN_MODEL", "gpt-4-turbo-preview"),
            openai_query_gen_temperature: env_parsed("OPENAI_QUERY_GEN_TEMPERATURE", 0.3),
            openai_query_gen_max_tokens: env_parsed("OPENAI_QUERY_GEN_MAX_TOKENS", 200),
            openai_embedding_model: env_or("OPENAI_EMBEDDING_MODEL", "text-embedding-3-small"),

            pinecone_api_key: args
                .pinecone_api_key
                .or_else(|| std::env::var("PINECONE_API_KEY").ok())
                .context("PINECONE_API_KEY is required")?,
            pinecone_environment: env_or("PINECONE_ENVIRONMENT", "us-east-1"),
            pinecone_index_name: env_or("PINECONE_INDEX_NAME", "rag-chatbot-index"),
            pinecone_batch_size: env_parsed("PINECONE_BATCH_SIZE", 100),
            pinecone_rag_k: env_parsed("PINECONE_RAG_K", 30),
            pinecone_rag_similarity_threshold: env_parsed("PINECONE_RAG_SIMILARITY_THRESHOLD", 0.3),

            supabase_url: std::env::var("SUPABASE_URL").context("SUPABASE_URL is required")?,
            supabase_key: std::env::var("SUPABASE_KEY").context("SUPABASE_KEY is required")?,
            supabase_service_key: std::env::var("SUPABASE_SERVICE_KEY")
                .context("SUPABASE_SERVICE_KEY is required")?,
            supabase_table_name: env_or("SUPABASE_TABLE_NAME", "user_data"),

            email_from: env_or("EMAIL_FROM", ""),
            email_from_name: env_or("EMAIL_FROM_NAME", "Market Chatbot"),
            email_recipient: env_or("EMAIL_RECIPIENT", ""),
            sendgrid_api_key: env_or("SENDGRID_API_KEY", ""),
            sendgrid_enabled: env_parsed("SENDGRID_ENABLED", true),

            document_chunk_size: env_parsed("DOCUMENT_CHUNK_SIZE", 1500),
            document_chunk_overlap: env_parsed("DOCUMENT_CHUNK_OVERLAP", 150),
            document_embedding_batch_size: env_parsed("DOCUMENT_EMBEDDING_BATCH_SIZE", 100),
            document_embedding_parallel_workers: env_parsed(
                "DOCUMENT_EMBEDDING_PARALLEL_WORKERS",
                5,
            ),
            document_upsert_parallel_workers: env_parsed(
                "DOCUMENT_PINECONE_UPSERT_PARALLEL_WORKERS",
                10,
            ),

            chat_history_limit: env_parsed("CHAT_HISTORY_LIMIT", 5),
            chat_rag_enabled: env_parsed("CHAT_RAG_ENABLED", true),
            chat_query_gen_enabled: env_parsed("CHAT_QUERY_GEN_ENABLED", true),
            chat_parallel_search: env_parsed("CHAT_PARALLEL_SEARCH", true),

            validation_name_min_length: env_parsed("VALIDATION_NAME_MIN_LENGTH", 2),
            validation_name_invalid_words: parse_word_list(&env_or(
                "VALIDATION_NAME_INVALID_WORDS",
                DEFAULT_INVALID_NAME_WORDS,
            )),
            validation_email_min_length: env_parsed("VALIDATION_EMAIL_MIN_LENGTH", 5),
            validation_income_min_length: env_parsed("VALIDATION_INCOME_MIN_LENGTH", 1),
            validation_income_max_length: env_parsed("VALIDATION_INCOME_MAX_LENGTH", 50),

            http_max_connections: env_parsed("HTTP_MAX_CONNECTIONS", 20),
            http_connect_timeout: env_parsed("HTTP_CONNECT_TIMEOUT", 30),
            http_request_timeout: args.http_timeout,
            http_max_retries: args.http_retries,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.openai_api_key.trim().is_empty() {
            anyhow::bail!("OPENAI_API_KEY must not be empty");
        }
        if self.pinecone_api_key.trim().is_empty() {
            anyhow::bail!("PINECONE_API_KEY must not be empty");
        }
        if !self.supabase_url.starts_with("http") {
            anyhow::bail!("SUPABASE_URL must be an http(s) URL: {}", self.supabase_url);
        }
        if self.document_chunk_overlap >= self.document_chunk_size {
            anyhow::bail!(
                "DOCUMENT_CHUNK_OVERLAP ({}) must be smaller than DOCUMENT_CHUNK_SIZE ({})",
                self.document_chunk_overlap,
                self.document_chunk_size
            );
        }
        if self.sendgrid_enabled && self.sendgrid_api_key.trim().is_empty() {
            tracing::warn!(
                "SENDGRID_ENABLED is set but SENDGRID_API_KEY is empty; notifications will fail"
            );
        }
        Ok(())
    }
}

/// Read an environment variable with a default
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable, falling back to the default on
/// missing or unparseable values
fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse a comma-separated list, trimming whitespace and dropping empties
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse a comma-separated word list, lowercased for case-insensitive matching
fn parse_word_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
