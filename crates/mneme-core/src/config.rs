//! Engine-wide configuration, read once at startup per the "Global state" design note.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every tunable enumerated in the external-interfaces contract, with the defaults
/// that contract specifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_recall_results: usize,
    pub vector_weight: f64,
    pub fts_weight: f64,
    pub importance_weight: f64,
    pub recency_weight: f64,
    pub recency_half_life_days: f64,
    pub graph_proximity_enabled: bool,
    pub enable_rrf: bool,
    pub rrf_k: f64,
    pub min_importance_threshold: f64,
    pub decay_rate_daily: f64,
    pub similarity_merge_threshold: f64,
    pub enable_memory_merging: bool,
    pub verify_batch_size: usize,
    pub verify_interval_minutes: u64,
    pub backup_retention_count: usize,
    /// Empty string disables all LLM-backed paths.
    pub language_model: String,
    pub embedding_model: String,
    pub embedding_host: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_recall_results: 50,
            vector_weight: 0.50,
            fts_weight: 0.15,
            importance_weight: 0.25,
            recency_weight: 0.10,
            recency_half_life_days: 30.0,
            graph_proximity_enabled: true,
            enable_rrf: false,
            rrf_k: 60.0,
            min_importance_threshold: 0.1,
            decay_rate_daily: 0.995,
            similarity_merge_threshold: 0.92,
            enable_memory_merging: true,
            verify_batch_size: 20,
            verify_interval_minutes: 60,
            backup_retention_count: 7,
            language_model: String::new(),
            embedding_model: "all-minilm:l6-v2".to_string(),
            embedding_host: "http://127.0.0.1:11434".to_string(),
        }
    }
}

impl MemoryConfig {
    /// Loads defaults, then an optional `config.toml` beside the database, then
    /// environment variable overrides. Each layer only overrides fields it sets.
    pub fn load(config_path: Option<&Path>) -> Self {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if let Ok(text) = std::fs::read_to_string(path) {
                match toml_partial(&text) {
                    Ok(partial) => config.merge(partial),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to parse config.toml, using defaults"),
                }
            }
        }

        config.apply_env_overrides();
        config
    }

    /// Re-reads the same sources; used by tests and the `/status` surface's reload hook.
    pub fn reload(&mut self, config_path: Option<&Path>) {
        *self = Self::load(config_path);
    }

    fn merge(&mut self, other: MemoryConfig) {
        *self = other;
    }

    fn apply_env_overrides(&mut self) {
        macro_rules! env_override {
            ($field:ident, $env:expr, $parse:expr) => {
                if let Ok(raw) = std::env::var($env) {
                    if let Some(parsed) = $parse(raw.as_str()) {
                        self.$field = parsed;
                    }
                }
            };
        }

        env_override!(max_recall_results, "MNEME_MAX_RECALL_RESULTS", |s: &str| s.parse().ok());
        env_override!(enable_rrf, "MNEME_ENABLE_RRF", |s: &str| s.parse().ok());
        env_override!(enable_memory_merging, "MNEME_ENABLE_MEMORY_MERGING", |s: &str| s
            .parse()
            .ok());
        env_override!(language_model, "MNEME_LANGUAGE_MODEL", |s: &str| Some(
            s.to_string()
        ));
        env_override!(embedding_model, "MNEME_EMBEDDING_MODEL", |s: &str| Some(
            s.to_string()
        ));
        env_override!(embedding_host, "MNEME_EMBEDDING_HOST", |s: &str| Some(
            s.to_string()
        ));
        env_override!(backup_retention_count, "MNEME_BACKUP_RETENTION_COUNT", |s: &str| s
            .parse()
            .ok());
        env_override!(verify_batch_size, "MNEME_VERIFY_BATCH_SIZE", |s: &str| s.parse().ok());
    }
}

/// A minimal TOML reader for the handful of flat scalar fields this config needs,
/// so the core crate does not have to pull in a full TOML dependency for one file.
fn toml_partial(text: &str) -> Result<MemoryConfig, String> {
    let mut config = MemoryConfig::default();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {}: expected key = value", lineno + 1))?;
        let key = key.trim();
        let value = value.trim().trim_matches('"');
        match key {
            "max_recall_results" => config.max_recall_results = value.parse().unwrap_or(config.max_recall_results),
            "vector_weight" => config.vector_weight = value.parse().unwrap_or(config.vector_weight),
            "fts_weight" => config.fts_weight = value.parse().unwrap_or(config.fts_weight),
            "importance_weight" => config.importance_weight = value.parse().unwrap_or(config.importance_weight),
            "recency_weight" => config.recency_weight = value.parse().unwrap_or(config.recency_weight),
            "recency_half_life_days" => {
                config.recency_half_life_days = value.parse().unwrap_or(config.recency_half_life_days)
            }
            "graph_proximity_enabled" => {
                config.graph_proximity_enabled = value.parse().unwrap_or(config.graph_proximity_enabled)
            }
            "enable_rrf" => config.enable_rrf = value.parse().unwrap_or(config.enable_rrf),
            "rrf_k" => config.rrf_k = value.parse().unwrap_or(config.rrf_k),
            "min_importance_threshold" => {
                config.min_importance_threshold = value.parse().unwrap_or(config.min_importance_threshold)
            }
            "decay_rate_daily" => config.decay_rate_daily = value.parse().unwrap_or(config.decay_rate_daily),
            "similarity_merge_threshold" => {
                config.similarity_merge_threshold = value.parse().unwrap_or(config.similarity_merge_threshold)
            }
            "enable_memory_merging" => {
                config.enable_memory_merging = value.parse().unwrap_or(config.enable_memory_merging)
            }
            "verify_batch_size" => config.verify_batch_size = value.parse().unwrap_or(config.verify_batch_size),
            "verify_interval_minutes" => {
                config.verify_interval_minutes = value.parse().unwrap_or(config.verify_interval_minutes)
            }
            "backup_retention_count" => {
                config.backup_retention_count = value.parse().unwrap_or(config.backup_retention_count)
            }
            "language_model" => config.language_model = value.to_string(),
            "embedding_model" => config.embedding_model = value.to_string(),
            "embedding_host" => config.embedding_host = value.to_string(),
            other => return Err(format!("line {}: unknown config key '{}'", lineno + 1, other)),
        }
    }
    Ok(config)
}
