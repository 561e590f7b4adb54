// Structured user data extraction from free-form chat messages.
//
// An extraction-tuned completion returns a JSON object; only values that
// pass validation are merged into the running UserData.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::openai::ChatMessage;
use crate::models::user::UserData;
use crate::openai::OpenAiClient;
use crate::prompts::data_extraction_prompt;
use crate::validators::validate_field;

const EXTRACTION_SYSTEM_PROMPT: &str = "You are a data extraction assistant. Extract user information from messages and return ONLY valid JSON.";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

/// Raw extraction output before validation
#[derive(Debug, Default, Deserialize)]
struct ExtractedFields {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    income: Option<String>,
}

impl ExtractedFields {
    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "name" => self.name.as_deref(),
            "email" => self.email.as_deref(),
            "income" => self.income.as_deref(),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ExtractionService {
    openai: OpenAiClient,
}

impl ExtractionService {
    pub fn new(openai: OpenAiClient) -> Self {
        Self { openai }
    }

    /// Extract user data from a message, merged over the existing data.
    ///
    /// Failures never propagate; on any error the regex email fallback runs
    /// and the existing data is returned unchanged otherwise.
    pub async fn extract_user_data(
        &self,
        config: &Config,
        message: &str,
        existing: &UserData,
    ) -> UserData {
        let mut data = existing.clone();

        let messages = vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(data_extraction_prompt(message, existing)),
        ];

        let response = self
            .openai
            .chat_completion(
                &config.openai_extraction_model,
                messages,
                config.openai_extraction_temperature,
                config.openai_extraction_max_tokens,
            )
            .await;

        match response {
            Ok(text) => {
                let cleaned = strip_code_fences(&text);
                match serde_json::from_str::<ExtractedFields>(cleaned) {
                    Ok(extracted) => merge_with_validation(config, &mut data, &extracted),
                    Err(e) => {
                        debug!("Extraction output was not valid JSON: {}", e);
                        fallback_email_extraction(message, &mut data);
                    }
                }
            }
            Err(e) => {
                warn!("Data extraction call failed: {}", e);
                fallback_email_extraction(message, &mut data);
            }
        }

        data
    }
}

/// True when all three fields are present and valid
pub fn is_data_complete(config: &Config, data: &UserData) -> bool {
    ["name", "email", "income"]
        .iter()
        .all(|field| match data.field(field) {
            Some(value) => validate_field(config, field, value),
            None => false,
        })
}

/// Strip surrounding markdown code fences the model sometimes adds
fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Merge extracted values into the running data, keeping only values that
/// pass validation. The literal strings "null" and "none" are placeholders
/// the model emits for absent fields and are never stored.
fn merge_with_validation(config: &Config, data: &mut UserData, extracted: &ExtractedFields) {
    for field in ["name", "email", "income"] {
        let Some(value) = extracted.field(field) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("null") || value.eq_ignore_ascii_case("none")
        {
            continue;
        }
        if !validate_field(config, field, value) {
            continue;
        }
        let changed = match data.field(field) {
            Some(current) => !current.eq_ignore_ascii_case(value),
            None => true,
        };
        if changed {
            data.set_field(field, value.to_string());
        }
    }
}

fn fallback_email_extraction(message: &str, data: &mut UserData) {
    if data.email.is_none() && message.contains('@') {
        if let Some(m) = EMAIL_RE.find(message) {
            data.email = Some(m.as_str().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliArgs;
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
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_merge_accepts_valid_values_only() {
        let config = test_config();
        let mut data = UserData::default();
        let extracted = ExtractedFields {
            name: Some("Alice".to_string()),
            email: Some("not-an-email".to_string()),
            income: Some("$90,000".to_string()),
        };
        merge_with_validation(&config, &mut data, &extracted);
        assert_eq!(data.name.as_deref(), Some("Alice"));
        assert!(data.email.is_none());
        assert_eq!(data.income.as_deref(), Some("$90,000"));
    }

    #[test]
    fn test_merge_ignores_null_placeholders() {
        let config = test_config();
        let mut data = UserData {
            name: Some("Alice".to_string()),
            ..Default::default()
        };
        let extracted = ExtractedFields {
            name: Some("null".to_string()),
            email: Some("None".to_string()),
            income: Some("".to_string()),
        };
        merge_with_validation(&config, &mut data, &extracted);
        assert_eq!(data.name.as_deref(), Some("Alice"));
        assert!(data.email.is_none());
    }

    #[test]
    fn test_merge_applies_corrections() {
        let config = test_config();
        let mut data = UserData {
            income: Some("$50,000".to_string()),
            ..Default::default()
        };
        let extracted = ExtractedFields {
            income: Some("$75,000".to_string()),
            ..Default::default()
        };
        merge_with_validation(&config, &mut data, &extracted);
        assert_eq!(data.income.as_deref(), Some("$75,000"));
    }

    #[test]
    fn test_fallback_email_extraction() {
        let mut data = UserData::default();
        fallback_email_extraction("reach me at bob.smith+x@mail.example.org thanks", &mut data);
        assert_eq!(data.email.as_deref(), Some("bob.smith+x@mail.example.org"));

        // Existing email is never overwritten
        let mut data = UserData {
            email: Some("keep@me.com".to_string()),
            ..Default::default()
        };
        fallback_email_extraction("new@addr.com", &mut data);
        assert_eq!(data.email.as_deref(), Some("keep@me.com"));
    }

    #[test]
    fn test_is_data_complete() {
        let config = test_config();
        let mut data = UserData {
            name: Some("Alice".to_string()),
            email: Some("alice@example.com".to_string()),
            income: None,
        };
        assert!(!is_data_complete(&config, &data));
        data.income = Some("$100k".to_string());
        assert!(is_data_complete(&config, &data));

        // Invalid field fails completeness even when present
        data.name = Some("hi".to_string());
        assert!(!is_data_complete(&config, &data));
    }
}
