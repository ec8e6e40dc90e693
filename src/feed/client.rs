use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Url};
use tokio_util::sync::CancellationToken;

use super::error::FeedError;
use super::types::{CheckinRecord, FeedEnvelope};
use super::{ItemSource, Page, StopReason};

pub const DEFAULT_API_BASE: &str = "https://api.untappd.com";
pub(crate) const USER_AGENT: &str = concat!("untappd-mirror/", env!("CARGO_PKG_VERSION"));

const CHECKINS_PATH: &str = "/v4/user/checkins";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RATE_LIMIT_HEADER: &str = "x-ratelimit-remaining";
/// Error bodies are echoed into logs; keep them short.
const MAX_ERROR_BODY: usize = 512;

/// Client for the authenticated user's check-in feed.
pub struct FeedClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl FeedClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            access_token: access_token.into(),
        })
    }

    async fn fetch_page(&self, cursor: Option<u64>) -> Result<Page, FeedError> {
        let url = format!("{}{}", self.base_url, CHECKINS_PATH);
        let mut query = vec![("access_token", self.access_token.clone())];
        match cursor {
            Some(min_id) => query.push(("min_id", min_id.to_string())),
            // First run: mirror only the newest check-in to seed the cursor.
            None => query.push(("limit", "1".to_string())),
        }

        tracing::debug!(cursor = ?cursor, "Requesting feed page");
        let response = self.http.get(&url).query(&query).send().await?;

        if rate_limit_exhausted(response.headers()) {
            tracing::warn!("Feed API rate limit reached, stopping until the next run");
            return Ok(Page::Done(StopReason::RateLimited));
        }

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(FeedError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        decode_page(&body)
    }
}

#[async_trait]
impl ItemSource for FeedClient {
    async fn fetch(
        &self,
        cursor: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Page, FeedError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FeedError::Cancelled),
            page = self.fetch_page(cursor) => page,
        }
    }

    fn tracks_cursor(&self) -> bool {
        true
    }
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get(RATE_LIMIT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        == Some(0)
}

fn decode_page(body: &[u8]) -> Result<Page, FeedError> {
    let envelope: FeedEnvelope = serde_json::from_slice(body)?;
    let (items, pagination) = envelope.response.into_parts();
    if items.is_empty() {
        return Ok(Page::Done(StopReason::EmptyPage));
    }

    let checkins = items
        .into_iter()
        .map(CheckinRecord::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let next = next_cursor(&pagination.since_url)?;
    Ok(Page::Items { checkins, next })
}

/// Extract `min_id` from the API's `since_url`. An empty URL means there is
/// no further page.
fn next_cursor(since_url: &str) -> Result<Option<u64>, FeedError> {
    if since_url.trim().is_empty() {
        return Ok(None);
    }
    let invalid = |reason: String| FeedError::Pagination {
        url: since_url.to_string(),
        reason,
    };

    let url = Url::parse(since_url).map_err(|e| invalid(e.to_string()))?;
    let min_id = url
        .query_pairs()
        .find(|(k, _)| k == "min_id")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| invalid("missing min_id".to_string()))?;
    min_id
        .parse::<u64>()
        .map(Some)
        .map_err(|e| invalid(format!("min_id {min_id:?}: {e}")))
}
