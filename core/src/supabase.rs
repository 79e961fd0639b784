//! HTTP providers for a hosted Supabase project.
//!
//! One client speaks to the three services of a project: GoTrue under
//! `/auth/v1`, PostgREST under `/rest/v1` and Storage under `/storage/v1`.
//! Every request carries the project's anon key in `apikey`; requests made
//! while signed in carry the user's access token as the bearer.

use crate::config::BackendSettings;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::{AuthProvider, BlobStorage, DataProvider, Filter, Order, OtpPurpose, User};
use crate::store::{CredentialStore, StoredSession};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

type ErrorCtor = fn(String) -> ProviderError;

#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    settings: BackendSettings,
    session: Arc<RwLock<Option<StoredSession>>>,
    credentials: Option<CredentialStore>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> StoredSession {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            });
        StoredSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

impl SupabaseClient {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
            session: Arc::new(RwLock::new(None)),
            credentials: None,
        }
    }

    /// Persist sessions through `store`, starting from whatever it holds.
    pub fn with_credentials(mut self, store: CredentialStore) -> Self {
        *self.session.write() = store.load();
        self.credentials = Some(store);
        self
    }

    pub fn session(&self) -> Option<StoredSession> {
        self.session.read().clone()
    }

    fn set_session(&self, session: Option<StoredSession>) {
        if let Some(store) = &self.credentials {
            let persisted = match &session {
                Some(session) => store.save(session),
                None => store.clear(),
            };
            if let Err(err) = persisted {
                warn!(%err, "failed to persist auth session");
            }
        }
        *self.session.write() = session;
    }

    fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.settings.url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        debug!(%method, path = url.path(), "backend request");
        self.http
            .request(method, url)
            .header("apikey", &self.settings.anon_key)
            .bearer_auth(token.unwrap_or(&self.settings.anon_key))
    }

    async fn send(&self, request: RequestBuilder, kind: ErrorCtor) -> ProviderResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|err| kind(transport_message(&err)))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(failure(response, kind).await)
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
        kind: ErrorCtor,
    ) -> ProviderResult<T> {
        let response = self.send(request, kind).await?;
        response
            .json()
            .await
            .map_err(|err| kind(format!("unexpected response from backend: {err}")))
    }

    async fn refresh(&self, refresh_token: &str) -> ProviderResult<StoredSession> {
        let mut url = self.endpoint(["auth", "v1", "token"]);
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");
        let request = self
            .request(Method::POST, url, None)
            .json(&json!({ "refresh_token": refresh_token }));
        let token: TokenResponse = self.send_json(request, ProviderError::Auth).await?;
        let session = token.into_session();
        self.set_session(Some(session.clone()));
        debug!(user_id = %session.user.id, "refreshed auth session");
        Ok(session)
    }

    fn rest_request(&self, method: Method, relation: &str, filters: &[Filter]) -> RequestBuilder {
        let mut url = self.endpoint(["rest", "v1", relation]);
        if !filters.is_empty() {
            let mut query = url.query_pairs_mut();
            for filter in filters {
                query.append_pair(&filter.column, &format!("eq.{}", filter.value));
            }
        }
        let token = self.access_token();
        self.request(method, url, token.as_deref())
    }
}

fn transport_message(err: &reqwest::Error) -> String {
    if err.is_connect() || err.is_timeout() {
        "Could not connect to the server.".to_string()
    } else {
        err.to_string()
    }
}

async fn failure(response: Response, kind: ErrorCtor) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    kind(error_message(status, &body))
}

fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let error_text = parsed.error.and_then(|value| match value {
        Value::String(text) => Some(text),
        _ => None,
    });
    [parsed.msg, parsed.error_description, parsed.message, error_text]
        .into_iter()
        .flatten()
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| format!("request failed with status {status}"))
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<()> {
        let mut url = self.endpoint(["auth", "v1", "signup"]);
        if let Some(redirect) = &self.settings.redirect_url {
            url.query_pairs_mut()
                .append_pair("redirect_to", redirect.as_str());
        }
        let request = self
            .request(Method::POST, url, None)
            .json(&json!({ "email": email, "password": password }));
        let body: Value = self.send_json(request, ProviderError::Auth).await?;
        // Projects with auto-confirm answer with a session instead of a bare user.
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)
                .map_err(|err| ProviderError::auth(format!("unexpected sign-up response: {err}")))?;
            self.set_session(Some(token.into_session()));
        }
        Ok(())
    }

    async fn verify_one_time_code(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> ProviderResult<()> {
        let url = self.endpoint(["auth", "v1", "verify"]);
        let request = self.request(Method::POST, url, None).json(&json!({
            "type": purpose.as_str(),
            "email": email,
            "token": code.trim(),
        }));
        let token: TokenResponse = self.send_json(request, ProviderError::Auth).await?;
        let session = token.into_session();
        info!(user_id = %session.user.id, "one-time code accepted");
        self.set_session(Some(session));
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<()> {
        let mut url = self.endpoint(["auth", "v1", "token"]);
        url.query_pairs_mut().append_pair("grant_type", "password");
        let request = self
            .request(Method::POST, url, None)
            .json(&json!({ "email": email, "password": password }));
        let token: TokenResponse = self.send_json(request, ProviderError::Auth).await?;
        self.set_session(Some(token.into_session()));
        Ok(())
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        let Some(token) = self.access_token() else {
            return Ok(());
        };
        let url = self.endpoint(["auth", "v1", "logout"]);
        let response = self
            .request(Method::POST, url, Some(&token))
            .send()
            .await
            .map_err(|err| ProviderError::auth(transport_message(&err)))?;
        let status = response.status();
        // The server forgetting the session first is as good as a sign-out.
        if status.is_success()
            || matches!(
                status,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
            )
        {
            self.set_session(None);
            Ok(())
        } else {
            Err(failure(response, ProviderError::Auth).await)
        }
    }

    async fn current_user(&self) -> ProviderResult<User> {
        let mut session = self
            .session()
            .ok_or_else(|| ProviderError::auth("Auth session missing!"))?;
        if session.needs_refresh() {
            if let Some(refresh_token) = session.refresh_token.clone() {
                session = self.refresh(&refresh_token).await?;
            }
        }
        let url = self.endpoint(["auth", "v1", "user"]);
        let response = self
            .request(Method::GET, url, Some(&session.access_token))
            .send()
            .await
            .map_err(|err| ProviderError::auth(transport_message(&err)))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.set_session(None);
        }
        if !status.is_success() {
            return Err(failure(response, ProviderError::Auth).await);
        }
        response
            .json()
            .await
            .map_err(|err| ProviderError::auth(format!("unexpected user response: {err}")))
    }
}

#[async_trait]
impl DataProvider for SupabaseClient {
    async fn select(
        &self,
        relation: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> ProviderResult<Vec<Value>> {
        let mut request = self
            .rest_request(Method::GET, relation, filters)
            .query(&[("select", "*")]);
        if let Some(order) = order {
            let direction = if order.ascending { "asc" } else { "desc" };
            request = request.query(&[("order", format!("{}.{direction}", order.column))]);
        }
        self.send_json(request, ProviderError::Data).await
    }

    async fn insert(&self, relation: &str, row: Value) -> ProviderResult<Vec<Value>> {
        let request = self
            .rest_request(Method::POST, relation, &[])
            .header("Prefer", "return=representation")
            .json(&row);
        self.send_json(request, ProviderError::Data).await
    }

    async fn update(
        &self,
        relation: &str,
        changes: Value,
        filters: &[Filter],
    ) -> ProviderResult<Vec<Value>> {
        let request = self
            .rest_request(Method::PATCH, relation, filters)
            .header("Prefer", "return=representation")
            .json(&changes);
        self.send_json(request, ProviderError::Data).await
    }

    async fn delete(&self, relation: &str, filters: &[Filter]) -> ProviderResult<()> {
        let request = self.rest_request(Method::DELETE, relation, filters);
        self.send(request, ProviderError::Data).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStorage for SupabaseClient {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> ProviderResult<()> {
        let url = self.endpoint(
            ["storage", "v1", "object", bucket]
                .into_iter()
                .chain(path.split('/')),
        );
        let token = self.access_token();
        let request = self
            .request(Method::POST, url, token.as_deref())
            .header("x-upsert", if upsert { "true" } else { "false" })
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        self.send(request, ProviderError::Storage).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> Url {
        self.endpoint(
            ["storage", "v1", "object", "public", bucket]
                .into_iter()
                .chain(path.split('/')),
        )
    }
}
