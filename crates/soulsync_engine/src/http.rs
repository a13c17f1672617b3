//! REST backend implementation.
//!
//! Talks to a managed backend exposing PostgREST-style table endpoints under
//! `/rest/v1` and anonymous auth under `/auth/v1`. Every request carries the
//! API key; authenticated requests add the session's bearer token.

use crate::backend::{Backend, Session};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use soulsync_protocol::{CloudSaveRow, LeaderboardQuery, LeaderboardRow, NewScore, PlayerProfile};
use std::time::Duration;
use uuid::Uuid;

const LEADERBOARD: &str = "leaderboard";
const CLOUD_SAVES: &str = "cloud_saves";
const PLAYER_PROFILES: &str = "player_profiles";

/// Media type asking for a single object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
/// Error code returned when a single-object read matches no rows.
const NO_ROWS_CODE: &str = "PGRST116";

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: AuthUser,
}

impl AuthResponse {
    fn into_session(self) -> Session {
        Session {
            user_id: self.user.id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
}

impl ErrorBody {
    fn message(self, fallback: &str) -> String {
        self.message
            .or(self.msg)
            .or(self.error_description)
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// HTTP-based backend.
pub struct RestBackend {
    /// Base URL without trailing slash (e.g., "https://abc.example.co").
    base_url: String,
    /// API key sent with every request.
    api_key: String,
    client: Client,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl RestBackend {
    /// Creates a REST backend with the given request timeout.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            last_error: RwLock::new(None),
        })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn request(&self, method: Method, path: &str, session: Option<&Session>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let bearer = session.map_or(self.api_key.as_str(), |s| s.access_token.as_str());
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    fn table(&self, method: Method, table: &str, session: Option<&Session>) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{}", table), session)
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        let response = request.send().await.map_err(|e| self.record(e.into()))?;
        let status = response.status();
        if status.is_success() {
            *self.last_error.write() = None;
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.record(status_error(status, &body)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> SyncResult<T> {
        let response = self.send(request).await?;
        response.json().await.map_err(|e| self.record(e.into()))
    }

    /// Sends a single-object read, mapping "no rows" to `None`.
    async fn send_optional<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> SyncResult<Option<T>> {
        let response = request
            .header(ACCEPT, SINGLE_OBJECT)
            .send()
            .await
            .map_err(|e| self.record(e.into()))?;
        let status = response.status();
        if status.is_success() {
            *self.last_error.write() = None;
            return response
                .json()
                .await
                .map(Some)
                .map_err(|e| self.record(e.into()));
        }
        let body = response.text().await.unwrap_or_default();
        if is_no_rows(status, &body) {
            return Ok(None);
        }
        Err(self.record(status_error(status, &body)))
    }

    fn record(&self, err: SyncError) -> SyncError {
        *self.last_error.write() = Some(err.to_string());
        err
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn sign_in_anonymously(&self) -> SyncResult<Session> {
        let request = self
            .request(Method::POST, "/auth/v1/signup", None)
            .json(&serde_json::json!({}));
        let auth: AuthResponse = self.send_json(request).await?;
        Ok(auth.into_session())
    }

    async fn restore_session(&self, session: &Session) -> SyncResult<Session> {
        let refresh_token = session
            .refresh_token
            .as_deref()
            .ok_or_else(|| SyncError::AuthenticationFailed("no refresh token stored".into()))?;
        let request = self
            .request(Method::POST, "/auth/v1/token", None)
            .query(&[("grant_type", "refresh_token")])
            .json(&RefreshRequest { refresh_token });
        let auth: AuthResponse = self.send_json(request).await?;
        Ok(auth.into_session())
    }

    async fn sign_out(&self, session: &Session) -> SyncResult<()> {
        let request = self.request(Method::POST, "/auth/v1/logout", Some(session));
        self.send(request).await.map(|_| ())
    }

    async fn insert_score(
        &self,
        session: Option<&Session>,
        score: &NewScore,
    ) -> SyncResult<LeaderboardRow> {
        let mut body = score.clone();
        if body.user_id.is_none() {
            body.user_id = session.map(|s| s.user_id);
        }
        let request = self
            .table(Method::POST, LEADERBOARD, session)
            .header("Prefer", "return=representation")
            .json(&body);
        let rows: Vec<LeaderboardRow> = self.send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| SyncError::Codec("insert returned no row".into()))
    }

    async fn query_leaderboard(&self, query: &LeaderboardQuery) -> SyncResult<Vec<LeaderboardRow>> {
        let request = self
            .table(Method::GET, LEADERBOARD, None)
            .query(&leaderboard_params(query));
        self.send_json(request).await
    }

    async fn count_scores_above(&self, score: u64) -> SyncResult<u64> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));
        headers.insert("Range-Unit", HeaderValue::from_static("items"));
        headers.insert("Range", HeaderValue::from_static("0-0"));

        let request = self
            .table(Method::GET, LEADERBOARD, None)
            .headers(headers)
            .query(&[("select", "id".to_string()), ("score", format!("gt.{}", score))]);
        let response = self.send(request).await?;

        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| self.record(SyncError::Codec("missing Content-Range total".into())))
    }

    async fn fetch_cloud_save(&self, session: &Session) -> SyncResult<Option<CloudSaveRow>> {
        let request = self
            .table(Method::GET, CLOUD_SAVES, Some(session))
            .query(&user_filter(session.user_id));
        self.send_optional(request).await
    }

    async fn upsert_cloud_save(&self, session: &Session, row: &CloudSaveRow) -> SyncResult<()> {
        let request = self
            .table(Method::POST, CLOUD_SAVES, Some(session))
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row);
        self.send(request).await.map(|_| ())
    }

    async fn delete_cloud_save(&self, session: &Session) -> SyncResult<()> {
        let request = self
            .table(Method::DELETE, CLOUD_SAVES, Some(session))
            .query(&[("user_id", format!("eq.{}", session.user_id))]);
        self.send(request).await.map(|_| ())
    }

    async fn fetch_profile(&self, session: &Session) -> SyncResult<Option<PlayerProfile>> {
        let request = self
            .table(Method::GET, PLAYER_PROFILES, Some(session))
            .query(&user_filter(session.user_id));
        self.send_optional(request).await
    }

    async fn upsert_profile(&self, session: &Session, profile: &PlayerProfile) -> SyncResult<()> {
        let request = self
            .table(Method::POST, PLAYER_PROFILES, Some(session))
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(profile);
        self.send(request).await.map(|_| ())
    }
}

fn user_filter(user_id: Uuid) -> [(&'static str, String); 2] {
    [("select", "*".to_string()), ("user_id", format!("eq.{}", user_id))]
}

/// Builds the query string for a leaderboard read.
fn leaderboard_params(query: &LeaderboardQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", "*".to_string()),
        ("order", "score.desc".to_string()),
        ("limit", query.limit.to_string()),
    ];
    if let Some(since) = query.since {
        params.push((
            "created_at",
            format!("gte.{}", since.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ));
    }
    if let Some(user_id) = query.user_id {
        params.push(("user_id", format!("eq.{}", user_id)));
    }
    params
}

/// Extracts the total from a `Content-Range` header such as `0-0/42` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn is_no_rows(status: StatusCode, body: &str) -> bool {
    status == StatusCode::NOT_ACCEPTABLE
        && serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.code)
            .as_deref()
            == Some(NO_ROWS_CODE)
}

fn status_error(status: StatusCode, body: &str) -> SyncError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let fallback = status.canonical_reason().unwrap_or("request failed");
    let message = parsed.message(fallback);
    if status == StatusCode::UNAUTHORIZED {
        SyncError::AuthenticationFailed(message)
    } else {
        SyncError::Backend {
            status: status.as_u16(),
            message,
        }
    }
}
