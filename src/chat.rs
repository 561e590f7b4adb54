// Chat orchestration: data extraction, retrieval, streaming generation,
// and lead persistence, surfaced as a stream of SSE events.

use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::email::EmailNotifier;
use crate::extraction::{is_data_complete, ExtractionService};
use crate::models::chat::{ChatRequest, ChatStreamEvent};
use crate::models::user::UserData;
use crate::openai::OpenAiClient;
use crate::prompts::build_messages;
use crate::rag::RagService;
use crate::supabase::{SaveOutcome, SupabaseClient};

const FALLBACK_ERROR_MESSAGE: &str =
    "Sorry, I'm having a moment. Let me get back to you on that market question.";

#[derive(Clone)]
pub struct ChatService {
    config: Arc<Config>,
    openai: OpenAiClient,
    extraction: ExtractionService,
    rag: RagService,
    supabase: SupabaseClient,
    notifier: Option<EmailNotifier>,
}

impl ChatService {
    pub fn new(
        config: Arc<Config>,
        openai: OpenAiClient,
        extraction: ExtractionService,
        rag: RagService,
        supabase: SupabaseClient,
        notifier: Option<EmailNotifier>,
    ) -> Self {
        Self {
            config,
            openai,
            extraction,
            rag,
            supabase,
            notifier,
        }
    }

    /// Run one conversational turn, yielding stream events as they happen.
    ///
    /// Any failure collapses into a single error event with a canned
    /// user-facing message; the real cause goes to the logs.
    pub fn respond(&self, request: ChatRequest) -> impl Stream<Item = ChatStreamEvent> {
        let service = self.clone();

        async_stream::stream! {
            yield ChatStreamEvent::start();

            let config = service.config.clone();
            let message = request.message;
            let original_data = request.user_data.clone();
            let mut user_data = request.user_data;

            let had_all_data_before = is_data_complete(&config, &user_data);

            // Collect missing fields from this message before answering
            let mut new_data_extracted = false;
            if !had_all_data_before {
                user_data = service
                    .extraction
                    .extract_user_data(&config, &message, &user_data)
                    .await;
                new_data_extracted = fields_changed(&original_data, &user_data);
            }
            let has_all_data = had_all_data_before || is_data_complete(&config, &user_data);
            let data_just_completed = !had_all_data_before && has_all_data;

            // Retrieval is deferred to the turn after data collection
            // finishes so the completing turn stays focused on the user
            let mut rag_context = None;
            if has_all_data && config.chat_rag_enabled && !data_just_completed {
                yield ChatStreamEvent::progress("rag_search", "Searching knowledge base...");
                rag_context = service.rag.retrieve_context(&config, &message).await;
            }
            let rag_used = rag_context.is_some();

            let messages = build_messages(
                &config,
                &message,
                &request.conversation_history,
                &mut user_data,
                rag_context.as_deref(),
            );

            yield ChatStreamEvent::progress("generating", "Generating response...");

            let stream = service
                .openai
                .chat_completion_stream(
                    &config.openai_model,
                    messages,
                    config.openai_temperature,
                    config.openai_max_tokens,
                )
                .await;

            let mut stream = match stream {
                Ok(stream) => Box::pin(stream),
                Err(e) => {
                    error!("Chat completion failed: {}", e);
                    yield ChatStreamEvent::Error {
                        error: FALLBACK_ERROR_MESSAGE.to_string(),
                    };
                    return;
                }
            };

            let mut response_text = String::new();
            while let Some(delta) = stream.next().await {
                match delta {
                    Ok(content) => {
                        response_text.push_str(&content);
                        yield ChatStreamEvent::Chunk { data: content };
                    }
                    Err(e) => {
                        error!("Chat stream failed mid-response: {}", e);
                        yield ChatStreamEvent::Error {
                            error: FALLBACK_ERROR_MESSAGE.to_string(),
                        };
                        return;
                    }
                }
            }

            if data_just_completed && new_data_extracted {
                service.save_user_data(&user_data).await;
            }

            yield ChatStreamEvent::Complete {
                response: response_text,
                user_data,
                rag_used,
            };
        }
    }

    /// Persist a completed lead. Failures are logged, never surfaced to the
    /// conversation.
    async fn save_user_data(&self, user_data: &UserData) {
        match self
            .supabase
            .save_user_data(user_data, self.notifier.as_ref())
            .await
        {
            Ok(SaveOutcome::Saved(record)) => info!("User data saved (id {:?})", record.id),
            Ok(SaveOutcome::AlreadyExists) => info!("User data already exists"),
            Err(e) => error!("Failed to save user data: {}", e),
        }
    }
}

/// True when any field holds a new non-empty value compared to the original
fn fields_changed(original: &UserData, updated: &UserData) -> bool {
    ["name", "email", "income"].iter().any(|field| {
        let new_value = updated.field(field);
        new_value.is_some() && new_value != original.field(field)
    })
}
