// Field validation for captured user data.
//
// Extraction output from the model is only trusted after these checks pass;
// anything else is discarded so the chatbot keeps asking.

use crate::config::Config;

/// Validate a candidate name. Rejects short strings and conversational
/// filler words users type instead of a name.
pub fn validate_name(config: &Config, value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.len() < config.validation_name_min_length {
        return false;
    }
    let lowered = trimmed.to_lowercase();
    !config
        .validation_name_invalid_words
        .iter()
        .any(|w| lowered == *w)
}

/// Validate a candidate email address. Requires an "@", a dotted domain,
/// and a minimum length.
pub fn validate_email(config: &Config, value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.len() < config.validation_email_min_length {
        return false;
    }
    let Some((local, domain)) = trimmed.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    // Domain must contain a dot that is not leading or trailing
    match domain.split_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Validate a candidate income string. Free-form but bounded in length.
pub fn validate_income(config: &Config, value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.len() >= config.validation_income_min_length
        && trimmed.len() <= config.validation_income_max_length
}

/// Validate a field by name
pub fn validate_field(config: &Config, field: &str, value: &str) -> bool {
    match field {
        "name" => validate_name(config, value),
        "email" => validate_email(config, value),
        "income" => validate_income(config, value),
        _ => false,
    }
}
