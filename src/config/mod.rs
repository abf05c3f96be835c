mod basic;
mod collector;
mod pipeline;

pub use basic::BasicConfig;
pub use collector::{CollectorConfig, ForumAccount};
pub use pipeline::PipelineConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::LazyLock};

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core server configuration (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Harvester configuration (see `collector` table in config.toml).
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Enrichment pipeline configuration (see `pipeline` table in config.toml).
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Builds a Figment that merges defaults, a config TOML file and
    /// `GROUNDSWELL_`-prefixed environment variables (`__` nesting, e.g.
    /// `GROUNDSWELL_PIPELINE__ORCH_CONCURRENCY=8`).
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
        }
        figment.merge(Env::prefixed("GROUNDSWELL_").split("__"))
    }

    /// Loads configuration by merging defaults, `config.toml` if present, and
    /// the environment.
    ///
    /// Note: this does **not** validate mode-specific requirements like
    /// `pipeline.llm_api_key`. Binaries should call [`Config::load_validated`]
    /// to avoid running with unusable defaults.
    pub fn load() -> Self {
        Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + config.toml + env): {err}")
        })
    }

    /// Loads configuration and validates the fields the enrichment modes need.
    pub fn load_validated() -> Self {
        let cfg = Self::load();
        if cfg.pipeline.llm_api_key.trim().is_empty() {
            panic!("pipeline.llm_api_key must be set and non-empty");
        }
        cfg
    }
}

/// Global, lazily-initialized configuration instance.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::load);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tuning() {
        let cfg = Config::default();
        assert_eq!(cfg.basic.listen_port, 8288);
        assert_eq!(cfg.pipeline.orch_concurrency, 5);
        assert_eq!(cfg.pipeline.cluster_similarity_threshold, 0.7);
        assert_eq!(cfg.pipeline.max_tokens_per_minute, 100_000);
        assert_eq!(cfg.pipeline.max_requests_per_minute, 100);
        assert_eq!(cfg.pipeline.retry_attempts, 3);
        assert_eq!(cfg.pipeline.retry_delay_ms, 1000);
        assert_eq!(cfg.pipeline.refill_low_threshold, 3);
        assert_eq!(cfg.collector.api_per_minute, 600);
        assert_eq!(cfg.collector.cooldown_secs, 60);
        assert_eq!(cfg.collector.dedup_ttl_days, 90);
    }
}
