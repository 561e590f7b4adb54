use anyhow::Result;
use std::sync::Arc;

use market_chatbot::chat::ChatService;
use market_chatbot::config::Config;
use market_chatbot::email::EmailNotifier;
use market_chatbot::extraction::ExtractionService;
use market_chatbot::http_client::UpstreamClient;
use market_chatbot::ingest::IngestService;
use market_chatbot::middleware;
use market_chatbot::openai::OpenAiClient;
use market_chatbot::pinecone::PineconeClient;
use market_chatbot::rag::RagService;
use market_chatbot::routes::{self, AppState};
use market_chatbot::supabase::SupabaseClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("🚀 Market Chatbot API starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    // Shared HTTP client with connection pooling
    let http_client = Arc::new(UpstreamClient::new(
        config.http_max_connections,
        config.http_connect_timeout,
        config.http_request_timeout,
        config.http_max_retries,
    )?);
    tracing::info!("✅ HTTP client initialized with connection pooling");

    let openai = OpenAiClient::new(http_client.clone(), config.openai_api_key.clone());
    tracing::info!("✅ OpenAI client initialized");

    // Resolve the Pinecone index host at startup - fail fast on errors
    tracing::info!(
        "Connecting to Pinecone index '{}'...",
        config.pinecone_index_name
    );
    let pinecone = match PineconeClient::connect(
        http_client.clone(),
        config.pinecone_api_key.clone(),
        &config.pinecone_index_name,
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("❌ Failed to connect to Pinecone: {}", e);
            tracing::error!("");
            tracing::error!("🔧 Troubleshooting steps:");
            tracing::error!("   1. Check your network connection");
            tracing::error!("   2. Verify PINECONE_API_KEY is valid");
            tracing::error!(
                "   3. Verify the index '{}' exists in your Pinecone project",
                config.pinecone_index_name
            );
            anyhow::bail!("Startup failed: Unable to connect to Pinecone");
        }
    };

    let supabase = SupabaseClient::new(
        http_client.clone(),
        config.supabase_url.clone(),
        config.supabase_key.clone(),
        config.supabase_service_key.clone(),
        config.supabase_table_name.clone(),
    );
    tracing::info!("✅ Supabase client initialized");

    let notifier = EmailNotifier::from_settings(
        http_client.clone(),
        config.sendgrid_enabled,
        &config.sendgrid_api_key,
        &config.email_from,
        &config.email_from_name,
        &config.email_recipient,
    );
    if notifier.is_some() {
        tracing::info!("✅ Email notifications enabled");
    } else {
        tracing::info!("Email notifications disabled");
    }

    let config = Arc::new(config);
    let extraction = ExtractionService::new(openai.clone());
    let rag = RagService::new(openai.clone(), pinecone.clone());
    let chat = ChatService::new(
        config.clone(),
        openai.clone(),
        extraction,
        rag,
        supabase.clone(),
        notifier.clone(),
    );
    let ingest = IngestService::new(openai, pinecone);

    let app_state = AppState {
        config: config.clone(),
        chat,
        ingest,
        supabase,
        notifier,
    };

    let app = build_app(app_state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Build the application router with all routes and middleware
fn build_app(state: AppState) -> axum::Router {
    use axum::Router;

    let cors = middleware::cors_layer(&state.config.cors_origins);

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::chat_routes(state.clone()))
        .merge(routes::document_routes(state.clone()))
        .merge(routes::data_routes(state))
        .layer(cors)
        .layer(axum::middleware::from_fn(
            middleware::request_logging_middleware,
        ))
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
