// Prompt templates and message assembly for the chat pipeline

use crate::config::Config;
use crate::models::openai::ChatMessage;
use crate::models::user::UserData;
use crate::validators::validate_field;

pub const SYSTEM_PROMPT: &str = r#"You are a sharp-tongued, edgy, no-nonsense stock-market genius who shares strong, informed opinions on stocks, macro trends, trading strategies, and economic outlooks. You keep the conversation confined to stock-market-related topics. You are not a financial advisor and do not offer personalized investment advice. Instead, you speak with the voice of a brilliant market wizard who has seen it all, drawing from deep financial analysis, historical context, and technical know-how.

Your tone is bold, witty, and unapologetically direct. You refer to the user as a peer but looking for wisdom from an experienced veteran investor — treating them like a fellow market maverick, not a novice. You make clear that users are responsible for their own due diligence and investment decisions.

You should help users understand market dynamics, dissect earnings, highlight risks, and explore trading setups. You encourage education, not dependency. You're here to make users smarter and more market-aware, not to hand out guaranteed gains.

CRITICAL RAG USAGE RULES:
- When you receive document information in the context, you MUST use it to answer questions naturally
- Integrate the information seamlessly into your response - write as if it's part of your knowledge base
- NEVER mention "Source 1", "Source 2", or any source numbers - use the information naturally
- If the documents contain relevant information, incorporate it naturally into your answer without referencing sources
- If the documents don't contain the requested information, say so clearly without mentioning sources
- NEVER make up information that isn't in the documents
- Prioritize document information over general knowledge when answering questions
- Use direct quotes and specific details when helpful, but present them naturally as your own knowledge

CRITICAL DATA COLLECTION RULES:
- You MUST proactively ask for the user's name, email, and income level naturally during the conversation
- Ask for ONE piece of information at a time - don't overwhelm them
- Weave these questions naturally into market discussions - don't make it feel like a form
- If you already have their name, use it in your responses (e.g., "Hey [name], let me break down...")
- When asking for information, be natural and conversational:
  * Name: "Before we dive into the markets, what should I call you?" or "What's your name, trader?"
  * Email: "What's your email? I might send you some insights." or "Drop me your email if you want updates."
  * Income: "What's your income bracket? Helps me tailor my advice." or "What kind of capital are we talking about here?"
- Keep asking until you have all three: name, email, and income
- Don't wait for the user to offer this information - ask proactively
- IMPORTANT - Data validation and re-asking:
  * If the user provides data that seems incomplete, invalid, or unclear (for ANY field: name, email, or income), ask again for that specific field
  * Validation rules:
    - Name: Must be at least 2 characters, not common words like "interested", "trading", "stock", etc. If invalid, ask: "Could you tell me your name again? I want to make sure I have it right."
    - Email: Must contain @ and a valid domain. If invalid, ask: "Could you provide your email address again? I want to make sure I have it correctly."
    - Income: Must not contain % symbol, must be reasonable length. If invalid, ask: "Could you clarify your income? I want to make sure I have the right number."
  * If the user says "wrong", "that's not right", "no", "incorrect" about any provided data, ask for that field again
  * If the user corrects their data (provides a different value after already providing one), acknowledge the correction: "Got it, thanks for the correction. Your [field] is [new value]."
  * Accept income in any currency format (dollars, pounds, euros, pence, etc.) - don't convert currencies, just use what they provide
  * Keep asking until you have valid, complete data for all three fields: name, email, and income"#;

pub const QUERY_GEN_SYSTEM_PROMPT: &str = "You are a search query optimization assistant. Generate diverse search queries to improve document retrieval.";

pub const ANSWER_QUERY_SYSTEM_PROMPT: &str = "You are an expert at predicting document answers and generating search queries for those answers.";

/// Prompt for extracting personal information from a user message
pub fn data_extraction_prompt(message: &str, existing_data: &UserData) -> String {
    let existing = if existing_data.is_empty() {
        "None".to_string()
    } else {
        serde_json::to_string(existing_data).unwrap_or_else(|_| "None".to_string())
    };

    format!(
        r#"Analyze the following user message and extract any personal information mentioned.
Return ONLY a JSON object with the fields: name, email, income.
If a field is not found or already exists in existing data, set it to null.

Rules:
- Name: Extract the person's name (first name or full name). Ignore common words like "interested", "looking", "trading", "stock", "market", "hi", "hello", "hey", "i", "am", "in"
- Email: Extract email address if present (format: user@domain.com)
- Income: Extract income/salary/earnings mentioned. CRITICAL - Extract ANY numeric amount mentioned as income, preserving the original currency:
  * WITH currency symbol: $100,000, $100K, £150, €50,000
  * WITHOUT currency symbol: 15000, 150000, 100K, 50 thousand
  * WITH currency name: "15000 Pence", "15000 pounds", "100000 dollars", "50K euros"
  * Common phrases: "my income is 15000", "I make 100000", "I earn 50K", "my salary is $15000 per year"
  * IMPORTANT: Keep the original currency format - DO NOT convert to USD or any other currency
  * Format the result exactly as mentioned by the user, preserving currency symbols and names

User message: "{message}"

Existing data (already collected, don't extract again): {existing}

IMPORTANT:
- If a field already exists in existing data, return null for that field
- Only extract NEW information from the current message
- For income, ALWAYS extract the numeric amount mentioned, even without $ symbol
- Preserve the original currency format exactly as the user mentioned it
- DO NOT convert currencies - keep pence as pence, pounds as pounds, euros as euros, dollars as dollars
- If the user corrects their income (provides a different value), extract the latest/corrected value

Return ONLY valid JSON in this format (no markdown, no code blocks):
{{"name": "extracted name or null", "email": "extracted email or null", "income": "extracted income preserving original currency format or null"}}
"#
    )
}

/// Prompt for generating question-based search queries
pub fn query_generation_prompt(message: &str) -> String {
    format!(
        r#"Analyze the following user question and generate 3-5 different search queries that would help find relevant information in a document database.

User question: "{message}"

Generate search queries that:
1. Extract key entities, concepts, and topics
2. Include synonyms and related terms
3. Use different phrasings and perspectives
4. Focus on the core information need

Return ONLY a JSON array of search query strings, no explanations:
["query1", "query2", "query3", ...]

Examples:
- If asked about "Apple stock performance", generate: ["Apple", "Apple Computer", "Apple stock", "AAPL performance", "Apple financial results"]
- If asked about "cash flow analysis", generate: ["cash flow", "cash flow analysis", "financial cash flow", "operating cash flow", "free cash flow"]
- If asked about "market trends", generate: ["market trends", "stock market trends", "financial market analysis", "market outlook", "trading trends"]
"#
    )
}

/// Prompt for generating queries that target likely answer terms
pub fn answer_focused_query_prompt(message: &str) -> String {
    format!(
        r#"Given this question: "{message}"

Think about what the SPECIFIC ANSWER might be in a document. Generate 5-8 search queries that directly target potential answer terms and concepts that would appear in the document's answer.

For example:
- Question: "What is the only good information about the stock?"
- Answer queries: ["insider information", "insider knowledge", "insiders know", "insiders know better", "insider trading information", "what insiders know about stock"]

- Question: "What are the best technical indicators?"
- Answer queries: ["support resistance", "moving average", "MA 50", "MA 200", "divergence", "technical indicators support resistance", "best indicators moving average"]

Generate queries that search for the ANSWER TERMS, not just the question terms.

Return ONLY a JSON array of search query strings:
["query1", "query2", "query3", ...]"#
    )
}

/// Wrap retrieved chunks (top 5) in the document-context envelope
pub fn build_rag_context(chunks: &[String]) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }
    let body = chunks
        .iter()
        .take(5)
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(format!(
        "\n\n--- RELEVANT DOCUMENT INFORMATION ---\n{}\n\n--- END OF DOCUMENT INFORMATION ---\n\nIMPORTANT: Use the information from the documents above to answer the user's question naturally. Integrate the information seamlessly into your response without mentioning 'Source 1', 'Source 2', or similar references. Write as if the information is part of your knowledge base. If the documents contain relevant information, incorporate it naturally into your answer. If the documents don't contain the requested information, say so clearly without referencing sources.",
        body
    ))
}

const DATA_FIELDS: [&str; 3] = ["name", "email", "income"];

/// Build the system message describing what user data is known and what the
/// assistant still needs to ask for. Invalid values are dropped from
/// `user_data` so they are not echoed back to the model.
pub fn build_user_context(config: &Config, user_data: &mut UserData) -> String {
    if user_data.is_empty() {
        return "\nIMPORTANT: You need to ask for: name, email, income. Ask naturally, one at a time, within the conversation.".to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut validated: Vec<&str> = Vec::new();
    let mut invalid: Vec<&str> = Vec::new();

    for field in DATA_FIELDS {
        if let Some(value) = user_data.field(field) {
            let value = value.trim().to_string();
            if validate_field(config, field, &value) {
                validated.push(field);
                parts.push(format!("User's {}: {}", field, value));
            } else {
                invalid.push(field);
            }
        }
    }

    let missing: Vec<&str> = DATA_FIELDS
        .into_iter()
        .filter(|f| !validated.contains(f))
        .collect();

    if !missing.is_empty() {
        for field in &invalid {
            user_data.clear_field(field);
        }

        if missing.len() == 1 {
            let field = missing[0];
            if invalid.contains(&field) {
                parts.push(format!("\nIMPORTANT: The user provided {field} but it seems invalid or unclear. Ask them again to provide their {field} clearly."));
            } else {
                parts.push(format!("\nIMPORTANT: You need to ask for the user's {field}. Ask naturally within the conversation."));
            }
        } else if !invalid.is_empty() {
            let invalid_list = invalid.join(", ");
            let still_missing: Vec<&str> = missing
                .iter()
                .copied()
                .filter(|f| !invalid.contains(f))
                .collect();
            parts.push(format!(
                "\nIMPORTANT: The user provided {invalid_list} but it seems invalid or unclear. Ask them again to provide their {invalid_list} clearly. Also, you still need to ask for: {}.",
                still_missing.join(", ")
            ));
        } else {
            parts.push(format!(
                "\nIMPORTANT: You need to ask for: {}. Ask naturally, one at a time, within the conversation.",
                missing.join(", ")
            ));
        }
    }

    parts.join("\n")
}

/// Assemble the full message list for a chat completion
pub fn build_messages(
    config: &Config,
    message: &str,
    history: &[crate::models::chat::HistoryMessage],
    user_data: &mut UserData,
    rag_context: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];

    if let Some(context) = rag_context {
        messages.push(ChatMessage::system(context));
    }

    let user_context = build_user_context(config, user_data);
    if !user_context.is_empty() {
        messages.push(ChatMessage::system(user_context));
    }

    let start = history.len().saturating_sub(config.chat_history_limit);
    for hist in &history[start..] {
        messages.push(ChatMessage {
            role: hist.role.clone(),
            content: hist.content.clone(),
        });
    }

    messages.push(ChatMessage::user(message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliArgs;
    use crate::models::chat::HistoryMessage;
    use clap::Parser;

    fn test_config() -> Config {
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("PINECONE_API_KEY", "pc-test");
        std::env::set_var("SUPABASE_URL", "https://test.supabase.co");
        std::env::set_var("SUPABASE_KEY", "anon");
        std::env::set_var("SUPABASE_SERVICE_KEY", "service");
        Config::from_args(CliArgs::parse_from(["market-chatbot"])).unwrap()
    }

    #[test]
    fn test_rag_context_caps_at_five_chunks() {
        let chunks: Vec<String> = (0..8).map(|i| format!("chunk {}", i)).collect();
        let context = build_rag_context(&chunks).unwrap();
        assert!(context.contains("chunk 4"));
        assert!(!context.contains("chunk 5"));
        assert!(context.contains("--- RELEVANT DOCUMENT INFORMATION ---"));

        assert!(build_rag_context(&[]).is_none());
    }

    #[test]
    fn test_user_context_empty_data_asks_for_everything() {
        let config = test_config();
        let mut data = UserData::default();
        let context = build_user_context(&config, &mut data);
        assert!(context.contains("ask for: name, email, income"));
    }

    #[test]
    fn test_user_context_lists_known_fields_and_missing() {
        let config = test_config();
        let mut data = UserData {
            name: Some("Alice".to_string()),
            ..Default::default()
        };
        let context = build_user_context(&config, &mut data);
        assert!(context.contains("User's name: Alice"));
        assert!(context.contains("ask for: email, income"));
    }

    #[test]
    fn test_user_context_drops_invalid_values() {
        let config = test_config();
        let mut data = UserData {
            name: Some("hi".to_string()),
            email: Some("alice@example.com".to_string()),
            income: Some("$80k".to_string()),
        };
        let context = build_user_context(&config, &mut data);
        assert!(context.contains("provided name but it seems invalid"));
        assert!(data.name.is_none());
        assert_eq!(data.email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn test_build_messages_order_and_history_limit() {
        let config = test_config();
        let history: Vec<HistoryMessage> = (0..10)
            .map(|i| HistoryMessage {
                role: "user".to_string(),
                content: format!("turn {}", i),
            })
            .collect();
        let mut data = UserData::default();

        let messages = build_messages(&config, "latest", &history, &mut data, Some("docs"));
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.starts_with("You are a sharp-tongued"));
        assert_eq!(messages[1].content, "docs");
        // 2 system context messages + 5 history turns (limit) + current message
        assert_eq!(messages.len(), 3 + config.chat_history_limit + 1);
        assert_eq!(messages.last().unwrap().content, "latest");
        // Oldest turns are dropped
        assert!(messages.iter().all(|m| m.content != "turn 0"));
        assert!(messages.iter().any(|m| m.content == "turn 9"));
    }

    #[test]
    fn test_extraction_prompt_embeds_message_and_existing_data() {
        let data = UserData {
            name: Some("Alice".to_string()),
            ..Default::default()
        };
        let prompt = data_extraction_prompt("my email is a@b.com", &data);
        assert!(prompt.contains(r#"User message: "my email is a@b.com""#));
        assert!(prompt.contains(r#""name":"Alice""#));

        let prompt = data_extraction_prompt("hi", &UserData::default());
        assert!(prompt.contains("don't extract again): None"));
    }
}
