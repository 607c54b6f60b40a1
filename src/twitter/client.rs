//! Authenticated client for the Twitter v1.1 timeline endpoints.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::types::{ListInfo, Status};

const DEFAULT_API_BASE: &str = "https://api.twitter.com/1.1/";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid API URL: {0}")]
    Url(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API returned {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("failed to decode API response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Which timeline a query targets.
#[derive(Debug, Clone)]
pub enum TimelineEndpoint {
    UserTimeline { screen_name: String },
    ListStatuses { list_id: String },
}

/// A page-independent timeline request. Pagination cursors (`since_id`,
/// `max_id`) vary per page and are passed separately by the paginator.
#[derive(Debug, Clone)]
pub struct TimelineQuery {
    pub endpoint: TimelineEndpoint,
    /// Maximum items per page.
    pub count: u32,
    pub include_retweets: bool,
    pub include_replies: bool,
}

/// The two operations the archiver needs from the source API.
///
/// An empty page is a successful result; transport and auth failures are
/// always surfaced as an `ApiError`.
#[async_trait]
pub trait TimelineApi: Send + Sync {
    async fn fetch_page(
        &self,
        query: &TimelineQuery,
        since_id: Option<&str>,
        max_id: Option<&str>,
    ) -> Result<Vec<Status>, ApiError>;

    async fn fetch_list_info(&self, list_id: &str) -> Result<ListInfo, ApiError>;
}

/// Bearer-authenticated reqwest client for the v1.1 REST API.
///
/// No request timeout is set: a stalled call blocks only the source task
/// that issued it.
pub struct TwitterClient {
    client: reqwest::Client,
    base: Url,
    bearer_token: String,
}

impl TwitterClient {
    /// Create a client against the production API base.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(bearer_token: String) -> Result<Self, ApiError> {
        Self::with_base_url(bearer_token, DEFAULT_API_BASE)
    }

    /// Create a client against an alternate API base (used by tests).
    ///
    /// # Errors
    ///
    /// Returns an error if `base` is not a valid URL.
    pub fn with_base_url(bearer_token: String, base: &str) -> Result<Self, ApiError> {
        let base = Url::parse(base).map_err(|e| ApiError::Url(e.to_string()))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(ApiError::Transport)?;
        Ok(Self {
            client,
            base,
            bearer_token,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ApiError::Url(e.to_string()))?;

        debug!(path, ?params, "Fetching from API");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(ApiError::Api {
                status,
                message: extract_error_message(&bytes),
            });
        }

        serde_json::from_slice(&bytes).map_err(ApiError::Decode)
    }
}

#[async_trait]
impl TimelineApi for TwitterClient {
    async fn fetch_page(
        &self,
        query: &TimelineQuery,
        since_id: Option<&str>,
        max_id: Option<&str>,
    ) -> Result<Vec<Status>, ApiError> {
        let mut params: Vec<(&str, String)> = vec![
            ("count", query.count.to_string()),
            ("tweet_mode", "extended".to_string()),
            ("include_rts", query.include_retweets.to_string()),
        ];

        let path = match &query.endpoint {
            TimelineEndpoint::UserTimeline { screen_name } => {
                params.push(("screen_name", screen_name.clone()));
                // Reply exclusion only exists on user timelines.
                params.push(("exclude_replies", (!query.include_replies).to_string()));
                "statuses/user_timeline.json"
            }
            TimelineEndpoint::ListStatuses { list_id } => {
                params.push(("list_id", list_id.clone()));
                "lists/statuses.json"
            }
        };

        if let Some(since_id) = since_id {
            params.push(("since_id", since_id.to_string()));
        }
        if let Some(max_id) = max_id {
            params.push(("max_id", max_id.to_string()));
        }

        self.get_json(path, &params).await
    }

    async fn fetch_list_info(&self, list_id: &str) -> Result<ListInfo, ApiError> {
        self.get_json("lists/show.json", &[("list_id", list_id.to_string())])
            .await
    }
}

/// Pull a human-readable message out of a Twitter error body,
/// `{"errors":[{"message":"..."}]}`, falling back to a body snippet.
fn extract_error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        errors: Vec<ErrorDetail>,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(default)]
        message: String,
    }

    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        if let Some(first) = parsed.errors.into_iter().next() {
            if !first.message.is_empty() {
                return first.message;
            }
        }
    }

    let mut snippet = String::from_utf8_lossy(body).to_string();
    if snippet.len() > 200 {
        snippet.truncate(200);
        snippet.push_str("...");
    }
    snippet
}
