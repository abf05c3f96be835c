use crate::config::{CollectorConfig, ForumAccount};
use crate::error::ForumError;
use ahash::AHashMap;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use groundswell_schema::forum::{ForumListing, ListingEnvelope, SortMethod, TimeFilter};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

/// Tokens are refreshed this long before their reported expiry.
const TOKEN_SLACK_SECS: i64 = 120;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        Utc::now() + ChronoDuration::seconds(TOKEN_SLACK_SECS) >= self.expires_at
    }
}

/// Parameters for one listing call.
#[derive(Debug, Clone, Default)]
pub struct ListingQuery {
    pub limit: u32,
    pub time_filter: Option<TimeFilter>,
    /// Fullname cursor to continue after.
    pub after: Option<String>,
    /// Number of items already seen, for deep-offset pagination.
    pub count: Option<u32>,
}

/// HTTP client for the forum listing API. One instance per process; access
/// tokens are cached per credential index.
pub struct ForumClient {
    http: reqwest::Client,
    api_base: Url,
    auth_base: Url,
    tokens: Mutex<AHashMap<usize, CachedToken>>,
}

impl ForumClient {
    pub fn new(cfg: &CollectorConfig) -> Result<Self, ForumError> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_base: Url::parse(&cfg.api_base)?,
            auth_base: Url::parse(&cfg.auth_base)?,
            tokens: Mutex::new(AHashMap::new()),
        })
    }

    /// Fetches a listing page for `sub_source` under the given credential.
    pub async fn listing(
        &self,
        credential_index: usize,
        account: &ForumAccount,
        sub_source: &str,
        sort: SortMethod,
        query: &ListingQuery,
    ) -> Result<ForumListing, ForumError> {
        let token = self.token_for(credential_index, account).await?;

        let mut url = self
            .api_base
            .join(&format!("r/{sub_source}/{}.json", sort.as_str()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit", &query.limit.min(100).to_string());
            pairs.append_pair("raw_json", "1");
            if let Some(t) = query.time_filter.filter(|_| sort.supports_time_filter()) {
                pairs.append_pair("t", t.as_str());
            }
            if let Some(after) = &query.after {
                pairs.append_pair("after", after);
            }
            if let Some(count) = query.count {
                pairs.append_pair("count", &count.to_string());
            }
        }

        debug!(%url, credential_index, "forum listing call");
        let resp = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ForumError::RateLimited);
        }
        if !status.is_success() {
            // Some rate limits come back as 403 with a marker in the body.
            let body = resp.text().await.unwrap_or_default();
            if body.to_lowercase().contains("ratelimit") {
                return Err(ForumError::RateLimited);
            }
            warn!(%status, body = %format!("{body:.200}"), "forum listing error");
            return Err(ForumError::UpstreamStatus(status));
        }

        let envelope: ListingEnvelope = resp.json().await?;
        Ok(envelope.data)
    }

    async fn token_for(
        &self,
        credential_index: usize,
        account: &ForumAccount,
    ) -> Result<String, ForumError> {
        {
            let tokens = self.tokens.lock().await;
            if let Some(cached) = tokens.get(&credential_index) {
                if !cached.is_expired() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let fresh = self.fetch_token(account).await?;
        let token = fresh.access_token.clone();
        self.tokens.lock().await.insert(credential_index, fresh);
        Ok(token)
    }

    /// Password-grant token fetch for one account.
    async fn fetch_token(&self, account: &ForumAccount) -> Result<CachedToken, ForumError> {
        let url = self.auth_base.join("api/v1/access_token")?;
        let params = [
            ("grant_type", "password"),
            ("username", account.username.as_str()),
            ("password", account.password.as_str()),
        ];

        let resp = self
            .http
            .post(url)
            .basic_auth(&account.client_id, Some(&account.client_secret))
            .form(&params)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ForumError::RateLimited);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ForumError::AuthRejected(format!(
                "token endpoint returned {status} for user {}",
                account.username
            )));
        }
        if !status.is_success() {
            return Err(ForumError::UpstreamStatus(status));
        }

        let token: TokenResponse = resp.json().await?;
        let ttl = token.expires_in.unwrap_or(3600);
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(ttl),
        })
    }
}
