// SendGrid email notifications for newly captured leads.
//
// Notification failures are surfaced as errors to the caller, which logs
// and moves on; a broken mail pipeline must never block a save.

use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::http_client::UpstreamClient;
use crate::models::user::UserData;

const SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";

#[derive(Clone)]
pub struct EmailNotifier {
    http: Arc<UpstreamClient>,
    api_key: String,
    from: String,
    from_name: String,
    recipient: String,
    base_url: String,
}

impl EmailNotifier {
    /// Build a notifier, or None when disabled or missing required settings
    pub fn from_settings(
        http: Arc<UpstreamClient>,
        enabled: bool,
        api_key: &str,
        from: &str,
        from_name: &str,
        recipient: &str,
    ) -> Option<Self> {
        if !enabled || api_key.trim().is_empty() || from.is_empty() || recipient.is_empty() {
            return None;
        }
        Some(Self {
            http,
            api_key: api_key.to_string(),
            from: from.to_string(),
            from_name: from_name.to_string(),
            recipient: recipient.to_string(),
            base_url: SENDGRID_BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send a new-lead notification email
    pub async fn notify_new_user(&self, data: &UserData) -> Result<(), ApiError> {
        let body = format!(
            "New user data captured:\n\nName: {}\nEmail: {}\nIncome: {}\n",
            data.name.as_deref().unwrap_or("-"),
            data.email.as_deref().unwrap_or("-"),
            data.income.as_deref().unwrap_or("-"),
        );

        let payload = serde_json::json!({
            "personalizations": [{"to": [{"email": self.recipient}]}],
            "from": {"email": self.from, "name": self.from_name},
            "subject": "New chatbot lead captured",
            "content": [{"type": "text/plain", "value": body}],
        });

        let req = self
            .http
            .client()
            .post(format!("{}/v3/mail/send", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        // No retries; the caller treats failure as non-fatal
        let response = self.http.request_no_retry(req).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::UpstreamError(format!(
                "SendGrid returned {}: {}",
                status, message
            )));
        }

        info!("Sent new-lead notification to {}", self.recipient);
        Ok(())
    }
}
