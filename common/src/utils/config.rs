use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Selects the AI backend used for chat and embeddings.
#[derive(Clone, Copy, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiProviderKind {
    /// OpenAI-compatible API (default).
    #[default]
    Real,
    /// Deterministic hashed provider for tests and evals.
    Fake,
}

/// Application configuration loaded from files and environment variables.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub ai_provider: AiProviderKind,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_openai_embed_model")]
    pub openai_embed_model: String,

    #[serde(default)]
    pub surrealdb_address: String,
    #[serde(default)]
    pub surrealdb_username: String,
    #[serde(default)]
    pub surrealdb_password: String,
    #[serde(default = "default_surrealdb_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_surrealdb_database")]
    pub surrealdb_database: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// When set, every request must carry the key in `X-API-Key`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_storage_root")]
    pub storage_root: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_max_chunks_per_query")]
    pub max_chunks_per_query: usize,
    #[serde(default = "default_chunk_char_target")]
    pub chunk_char_target: usize,
    #[serde(default = "default_chunk_char_overlap")]
    pub chunk_char_overlap: usize,
    #[serde(default = "default_rerank_enabled")]
    pub rerank_enabled: bool,
    #[serde(default = "default_rerank_candidates")]
    pub rerank_candidates: usize,
    #[serde(default = "default_rerank_snippet_chars")]
    pub rerank_snippet_chars: usize,
    #[serde(default = "default_mmr_enabled")]
    pub mmr_enabled: bool,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
    #[serde(default = "default_mmr_candidates")]
    pub mmr_candidates: usize,
    #[serde(default = "default_embed_dim")]
    pub embed_dim: usize,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    #[serde(default)]
    pub per_source_retrieval_limit: Option<usize>,

    #[serde(default = "default_max_pdf_bytes")]
    pub max_pdf_bytes: usize,
    #[serde(default = "default_max_pdf_pages")]
    pub max_pdf_pages: usize,
    #[serde(default = "default_max_url_bytes")]
    pub max_url_bytes: usize,
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: usize,
    /// Comma-separated host suffixes allowed for URL ingestion. Empty allows
    /// any public host (loopback and private ranges stay blocked).
    #[serde(default)]
    pub url_allowlist: Option<String>,

    #[serde(default = "default_worker_max_attempts")]
    pub worker_max_attempts: u32,
    #[serde(default = "default_worker_visibility_timeout_secs")]
    pub worker_visibility_timeout_secs: u64,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_embed_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_surrealdb_namespace() -> String {
    "quire".to_string()
}

fn default_surrealdb_database() -> String {
    "quire".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_storage_root() -> String {
    "./data/sources".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_chunks_per_query() -> usize {
    8
}

fn default_chunk_char_target() -> usize {
    5000
}

fn default_chunk_char_overlap() -> usize {
    800
}

fn default_rerank_enabled() -> bool {
    true
}

fn default_rerank_candidates() -> usize {
    30
}

fn default_rerank_snippet_chars() -> usize {
    900
}

fn default_mmr_enabled() -> bool {
    true
}

fn default_mmr_lambda() -> f32 {
    0.7
}

fn default_mmr_candidates() -> usize {
    30
}

fn default_embed_dim() -> usize {
    1536
}

fn default_embed_batch_size() -> usize {
    64
}

fn default_max_pdf_bytes() -> usize {
    25_000_000
}

fn default_max_pdf_pages() -> usize {
    300
}

fn default_max_url_bytes() -> usize {
    2_000_000
}

fn default_max_text_bytes() -> usize {
    2_000_000
}

fn default_worker_max_attempts() -> u32 {
    3
}

fn default_worker_visibility_timeout_secs() -> u64 {
    300
}

fn default_worker_concurrency() -> usize {
    4
}

impl AppConfig {
    /// Host suffixes allowed for URL ingestion, lowercased and trimmed.
    pub fn allowed_url_hosts(&self) -> Vec<String> {
        self.url_allowlist
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(|entry| entry.trim().to_ascii_lowercase())
                    .filter(|entry| !entry.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ai_provider: AiProviderKind::default(),
            openai_api_key: String::new(),
            openai_base_url: default_openai_base_url(),
            openai_model: default_openai_model(),
            openai_embed_model: default_openai_embed_model(),
            surrealdb_address: String::new(),
            surrealdb_username: String::new(),
            surrealdb_password: String::new(),
            surrealdb_namespace: default_surrealdb_namespace(),
            surrealdb_database: default_surrealdb_database(),
            http_port: default_http_port(),
            api_key: None,
            storage_root: default_storage_root(),
            request_timeout_secs: default_request_timeout_secs(),
            debug: false,
            max_chunks_per_query: default_max_chunks_per_query(),
            chunk_char_target: default_chunk_char_target(),
            chunk_char_overlap: default_chunk_char_overlap(),
            rerank_enabled: default_rerank_enabled(),
            rerank_candidates: default_rerank_candidates(),
            rerank_snippet_chars: default_rerank_snippet_chars(),
            mmr_enabled: default_mmr_enabled(),
            mmr_lambda: default_mmr_lambda(),
            mmr_candidates: default_mmr_candidates(),
            embed_dim: default_embed_dim(),
            embed_batch_size: default_embed_batch_size(),
            per_source_retrieval_limit: None,
            max_pdf_bytes: default_max_pdf_bytes(),
            max_pdf_pages: default_max_pdf_pages(),
            max_url_bytes: default_max_url_bytes(),
            max_text_bytes: default_max_text_bytes(),
            url_allowlist: None,
            worker_max_attempts: default_worker_max_attempts(),
            worker_visibility_timeout_secs: default_worker_visibility_timeout_secs(),
            worker_concurrency: default_worker_concurrency(),
        }
    }
}

/// Loads the application configuration from the environment and optional config file.
#[allow(clippy::module_name_repetitions)]
pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.max_chunks_per_query, 8);
        assert_eq!(config.chunk_char_target, 5000);
        assert_eq!(config.chunk_char_overlap, 800);
        assert!(config.rerank_enabled);
        assert_eq!(config.rerank_candidates, 30);
        assert_eq!(config.rerank_snippet_chars, 900);
        assert!(config.mmr_enabled);
        assert!((config.mmr_lambda - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.embed_dim, 1536);
        assert_eq!(config.embed_batch_size, 64);
        assert_eq!(config.max_pdf_bytes, 25_000_000);
        assert_eq!(config.max_pdf_pages, 300);
        assert!(config.per_source_retrieval_limit.is_none());
    }

    #[test]
    fn allowlist_parses_comma_separated_hosts() {
        let config = AppConfig {
            url_allowlist: Some("Example.com , docs.rs,".to_string()),
            ..Default::default()
        };
        assert_eq!(config.allowed_url_hosts(), vec!["example.com", "docs.rs"]);
    }

    #[test]
    fn allowlist_defaults_to_empty() {
        assert!(AppConfig::default().allowed_url_hosts().is_empty());
    }
}
