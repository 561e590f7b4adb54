// Supabase persistence via the PostgREST API.
//
// User data rows are written with the service key; duplicates are detected
// by email before inserting.

use std::sync::Arc;
use tracing::{info, warn};

use crate::email::EmailNotifier;
use crate::error::ApiError;
use crate::http_client::UpstreamClient;
use crate::models::user::{UserData, UserRecord};

/// Result of a save attempt. A successful insert carries the stored row so
/// callers can report its id.
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    Saved(UserRecord),
    AlreadyExists,
}

#[derive(Clone)]
pub struct SupabaseClient {
    http: Arc<UpstreamClient>,
    base_url: String,
    anon_key: String,
    service_key: String,
    table: String,
}

impl SupabaseClient {
    pub fn new(
        http: Arc<UpstreamClient>,
        base_url: impl Into<String>,
        anon_key: String,
        service_key: String,
        table: String,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key,
            service_key,
            table,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        // PostgREST wants both headers; writes use the service role key
        builder
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    /// Save captured user data, skipping rows whose email already exists.
    ///
    /// A notification email is sent for newly inserted rows only; notifier
    /// failures are logged and never fail the save.
    pub async fn save_user_data(
        &self,
        data: &UserData,
        notifier: Option<&EmailNotifier>,
    ) -> Result<SaveOutcome, ApiError> {
        let email = data
            .email
            .as_deref()
            .ok_or_else(|| ApiError::ValidationError("email is required to save".to_string()))?;

        if self.email_exists(email).await? {
            info!("User data for '{}' already saved, skipping insert", email);
            return Ok(SaveOutcome::AlreadyExists);
        }

        let req = self
            .authed(self.http.client().post(self.table_url()))
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({
                "name": data.name,
                "email": data.email,
                "income": data.income,
            }))
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = self.http.request_with_retry(req).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::SupabaseError {
                status: status.as_u16(),
                message,
            });
        }

        // return=representation yields the inserted rows
        let rows: Vec<UserRecord> = response
            .json()
            .await
            .map_err(|e| ApiError::UpstreamError(format!("Invalid Supabase response: {}", e)))?;
        let record = rows
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::UpstreamError("Insert returned no rows".to_string()))?;

        info!("Saved user data for '{}' (id {:?})", email, record.id);

        if let Some(notifier) = notifier {
            if let Err(e) = notifier.notify_new_user(data).await {
                warn!("Email notification failed: {}", e);
            }
        }

        Ok(SaveOutcome::Saved(record))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, ApiError> {
        let email_filter = format!("eq.{}", email);
        let req = self
            .authed(self.http.client().get(self.table_url()))
            .query(&[("select", "id"), ("email", email_filter.as_str())])
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = self.http.request_with_retry(req).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::SupabaseError {
                status: status.as_u16(),
                message,
            });
        }

        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ApiError::UpstreamError(format!("Invalid Supabase response: {}", e)))?;
        Ok(!rows.is_empty())
    }

    /// Fetch saved rows, newest first. With an id, returns at most that row.
    pub async fn get_user_data(&self, id: Option<i64>) -> Result<Vec<UserRecord>, ApiError> {
        let mut query: Vec<(String, String)> = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), "created_at.desc".to_string()),
        ];
        if let Some(id) = id {
            query.push(("id".to_string(), format!("eq.{}", id)));
        }

        let req = self
            .authed(self.http.client().get(self.table_url()))
            .query(&query)
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = self.http.request_with_retry(req).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::SupabaseError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::UpstreamError(format!("Invalid Supabase response: {}", e)))
    }
}
