//! Supabase (PostgREST) remote gateway.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{GatewayError, GatewayResult, RemoteGateway};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{EventId, EventKind};
use crate::util::{compact_text, normalize_text_option};

/// Credentials for the signed-in user, passed explicitly to the gateway.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub access_token: Option<String>,
    pub user_id: Option<String>,
}

impl SessionContext {
    pub fn new(access_token: Option<String>, user_id: Option<String>) -> Self {
        Self {
            access_token: normalize_text_option(access_token),
            user_id: normalize_text_option(user_id),
        }
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionContext")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Gateway over the Supabase REST API, one table per event kind.
#[derive(Clone)]
pub struct SupabaseGateway {
    rest_url: String,
    anon_key: String,
    session: SessionContext,
    client: Client,
}

impl SupabaseGateway {
    pub fn new(
        url: impl AsRef<str>,
        anon_key: impl Into<String>,
        session: SessionContext,
    ) -> Result<Self> {
        let rest_url = normalize_rest_url(url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(Error::InvalidInput(
                "Supabase anon key must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .build()
            .map_err(|error| Error::InvalidInput(format!("Failed to build HTTP client: {error}")))?;

        Ok(Self {
            rest_url,
            anon_key,
            session,
            client,
        })
    }

    /// Build a gateway from config; `None` when no backend is configured.
    pub fn from_config(config: &RemoteConfig, session: SessionContext) -> Result<Option<Self>> {
        config
            .resolve()?
            .map(|(url, anon_key)| Self::new(url, anon_key, session))
            .transpose()
    }

    fn table_url(&self, kind: EventKind) -> String {
        format!("{}/{}", self.rest_url, kind.table_name())
    }

    /// Attach the project key and the caller's bearer token (anon key when signed out).
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .session
            .access_token
            .as_deref()
            .unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        let response = self.authorize(request).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }
}

#[async_trait]
impl RemoteGateway for SupabaseGateway {
    async fn insert(&self, kind: EventKind, row: &Value) -> GatewayResult<()> {
        // Replayed inserts of an existing id are ignored by the server
        let request = self
            .client
            .post(self.table_url(kind))
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(row);
        self.send(request).await?;
        tracing::debug!("Inserted row into {}", kind.table_name());
        Ok(())
    }

    async fn update_by_id(&self, kind: EventKind, id: &EventId, row: &Value) -> GatewayResult<()> {
        let request = self
            .client
            .patch(self.table_url(kind))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(row);
        let response = self.send(request).await?;

        let updated: Vec<Value> = response
            .json()
            .await
            .map_err(|error| GatewayError::InvalidPayload(error.to_string()))?;
        if updated.is_empty() {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete_by_id(&self, kind: EventKind, id: &EventId) -> GatewayResult<()> {
        let request = self
            .client
            .delete(self.table_url(kind))
            .query(&[("id", format!("eq.{id}"))]);
        self.send(request).await?;
        Ok(())
    }

    async fn select_by_user(
        &self,
        kind: EventKind,
        user_id: &str,
        date: Option<NaiveDate>,
    ) -> GatewayResult<Vec<Value>> {
        let mut filters = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
        ];
        if let Some(date) = date {
            filters.push(("date", format!("eq.{}", date.format("%Y-%m-%d"))));
        }

        let request = self.client.get(self.table_url(kind)).query(&filters);
        let response = self.send(request).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|error| GatewayError::InvalidPayload(error.to_string()))
    }
}

/// Normalize a project URL to its `/rest/v1` base.
pub fn normalize_rest_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(
            "Supabase URL must not be empty".to_string(),
        ));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(Error::InvalidInput(
            "Supabase URL must include http:// or https://".to_string(),
        ));
    }
    if trimmed.ends_with("/rest/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/rest/v1"))
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorResponse {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

/// Unique-constraint violation
const PG_UNIQUE_VIOLATION: &str = "23505";

fn error_for_status(status: StatusCode, body: &str) -> GatewayError {
    let parsed = serde_json::from_str::<PostgrestErrorResponse>(body).ok();

    if status == StatusCode::CONFLICT
        || parsed
            .as_ref()
            .and_then(|payload| payload.code.as_deref())
            == Some(PG_UNIQUE_VIOLATION)
    {
        return GatewayError::AlreadyExists(compact_text(body));
    }

    let message = parsed
        .and_then(|payload| payload.message.or(payload.details))
        .map_or_else(
            || {
                let trimmed = compact_text(body);
                if trimmed.is_empty() {
                    format!("HTTP {}", status.as_u16())
                } else {
                    trimmed
                }
            },
            |message| message.trim().to_string(),
        );

    GatewayError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_rest_url_appends_rest_path() {
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/rest/v1").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
        assert!(normalize_rest_url("demo.supabase.co").is_err());
    }

    #[test]
    fn table_url_uses_kind_table() {
        let gateway =
            SupabaseGateway::new("https://demo.supabase.co", "anon", SessionContext::default())
                .unwrap();
        assert_eq!(
            gateway.table_url(EventKind::Sleep),
            "https://demo.supabase.co/rest/v1/sleeps"
        );
    }

    #[test]
    fn new_rejects_empty_anon_key() {
        let result =
            SupabaseGateway::new("https://demo.supabase.co", "  ", SessionContext::default());
        assert!(result.is_err());
    }

    #[test]
    fn from_config_without_backend_is_none() {
        let gateway =
            SupabaseGateway::from_config(&RemoteConfig::default(), SessionContext::default())
                .unwrap();
        assert!(gateway.is_none());
    }

    #[test]
    fn conflict_maps_to_already_exists() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#;
        assert!(matches!(
            error_for_status(StatusCode::CONFLICT, body),
            GatewayError::AlreadyExists(_)
        ));
    }

    #[test]
    fn api_error_prefers_message_field() {
        let body = r#"{"code":"42501","message":"permission denied for table feeds"}"#;
        assert_eq!(
            error_for_status(StatusCode::FORBIDDEN, body),
            GatewayError::Api {
                status: 403,
                message: "permission denied for table feeds".to_string(),
            }
        );
        assert_eq!(
            error_for_status(StatusCode::BAD_GATEWAY, ""),
            GatewayError::Api {
                status: 502,
                message: "HTTP 502".to_string(),
            }
        );
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = SessionContext::new(Some("secret-token".into()), Some("u1".into()));
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
