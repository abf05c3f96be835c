use serde::{Deserialize, Serialize};

/// One forum API account. The collector rotates across all configured
/// accounts to spread per-account quotas.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForumAccount {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

/// Collector configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    /// Forum API base URL.
    /// TOML: `collector.api_base`. Default: `https://oauth.reddit.com`.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Token endpoint base URL (password-grant token fetch).
    /// TOML: `collector.auth_base`. Default: `https://www.reddit.com`.
    #[serde(default = "default_auth_base")]
    pub auth_base: String,

    /// User agent sent on every API call. Forum ToS requires a descriptive one.
    /// TOML: `collector.user_agent`.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// API accounts for the credential pool. At least one is required to harvest.
    /// TOML: `collector.accounts` (array of tables).
    #[serde(default)]
    pub accounts: Vec<ForumAccount>,

    /// Sub-sources (e.g. subreddit names) to harvest from.
    /// TOML: `collector.sub_sources`.
    #[serde(default)]
    pub sub_sources: Vec<String>,

    /// Target number of unique posts per harvest run, across all sub-sources.
    /// TOML: `collector.target_per_run`. Default: `500`.
    #[serde(default = "default_target_per_run")]
    pub target_per_run: usize,

    /// API requests allowed per minute, shared across all credentials.
    /// TOML: `collector.api_per_minute`. Default: `600`.
    #[serde(default = "default_api_per_minute")]
    pub api_per_minute: u32,

    /// Max concurrent in-flight API calls.
    /// TOML: `collector.api_concurrency`. Default: `10`.
    #[serde(default = "default_api_concurrency")]
    pub api_concurrency: usize,

    /// RSS-style poll cadence in seconds (one poll per interval, concurrency 1).
    /// TOML: `collector.rss_interval_secs`. Default: `5`.
    #[serde(default = "default_rss_interval_secs")]
    pub rss_interval_secs: u64,

    /// Cooldown applied to a credential after a rate-limit response, seconds.
    /// TOML: `collector.cooldown_secs`. Default: `60`.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Sleep between continuous-stream sweeps, seconds.
    /// TOML: `collector.poll_interval_secs`. Default: `30`.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Time budget for one continuous-stream run, milliseconds.
    /// TOML: `collector.time_budget_ms`. Default: `55_000`.
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,

    /// Seconds between harvest runs in `collect` mode.
    /// TOML: `collector.run_interval_secs`. Default: `60`.
    #[serde(default = "default_run_interval_secs")]
    pub run_interval_secs: u64,

    /// TTL for durable dedup entries, days.
    /// TOML: `collector.dedup_ttl_days`. Default: `90`.
    #[serde(default = "default_dedup_ttl_days")]
    pub dedup_ttl_days: i64,

    /// Source tag recorded on harvested posts and dedup keys.
    /// TOML: `collector.source`. Default: `reddit`.
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            auth_base: default_auth_base(),
            user_agent: default_user_agent(),
            accounts: Vec::new(),
            sub_sources: Vec::new(),
            target_per_run: default_target_per_run(),
            api_per_minute: default_api_per_minute(),
            api_concurrency: default_api_concurrency(),
            rss_interval_secs: default_rss_interval_secs(),
            cooldown_secs: default_cooldown_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            time_budget_ms: default_time_budget_ms(),
            run_interval_secs: default_run_interval_secs(),
            dedup_ttl_days: default_dedup_ttl_days(),
            source: default_source(),
        }
    }
}

fn default_api_base() -> String {
    "https://oauth.reddit.com".to_string()
}

fn default_auth_base() -> String {
    "https://www.reddit.com".to_string()
}

fn default_user_agent() -> String {
    "groundswell/0.3 (problem-post harvester)".to_string()
}

fn default_target_per_run() -> usize {
    500
}

fn default_api_per_minute() -> u32 {
    600
}

fn default_api_concurrency() -> usize {
    10
}

fn default_rss_interval_secs() -> u64 {
    5
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_time_budget_ms() -> u64 {
    55_000
}

fn default_run_interval_secs() -> u64 {
    60
}

fn default_dedup_ttl_days() -> i64 {
    90
}

fn default_source() -> String {
    "reddit".to_string()
}
