//! TOML configuration.
//!
//! Every section is optional and falls back to defaults suited to a local
//! Ollama install. A handful of environment variables override file values
//! after parsing and before validation:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `OLLAMA_MODEL` | `llm.model` |
//! | `OLLAMA_EMBEDDING_MODEL` | `embedding.model` |
//! | `OLLAMA_BASE_URL` | `llm.url` and `embedding.url` |
//! | `TEMPERATURE` | `llm.temperature` |
//! | `MAX_TOKENS` | `llm.max_tokens` |
//! | `TOP_K_RESULTS` | `retrieval.top_k` |
//! | `RELEVANCE_THRESHOLD` | `retrieval.relevance_threshold` |
//! | `MULTI_QUERY_COUNT` | `retrieval.multi_query_count` |
//! | `K_PER_QUERY` | `retrieval.k_per_query` |
//! | `CHUNK_SIZE` | `chunking.chunk_size` |
//! | `CHUNK_OVERLAP` | `chunking.chunk_overlap` |

use anyhow::{bail, Context, Result};
use ragchat_core::{DedupPolicy, Persona, RetrievalParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./vectorstore/ragchat.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: default_documents_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_documents_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.pdf".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters carried over between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
    #[serde(default = "default_multi_query_count")]
    pub multi_query_count: usize,
    #[serde(default = "default_k_per_query")]
    pub k_per_query: usize,
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f32,
    #[serde(default)]
    pub dedup: DedupPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            relevance_threshold: default_relevance_threshold(),
            multi_query_count: default_multi_query_count(),
            k_per_query: default_k_per_query(),
            fallback_threshold: default_fallback_threshold(),
            dedup: DedupPolicy::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn to_params(&self) -> RetrievalParams {
        RetrievalParams {
            top_k: self.top_k,
            relevance_threshold: self.relevance_threshold,
            multi_query_count: self.multi_query_count,
            k_per_query: self.k_per_query,
            fallback_threshold: self.fallback_threshold,
            dedup: self.dedup,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_relevance_threshold() -> f32 {
    0.5
}
fn default_multi_query_count() -> usize {
    3
}
fn default_k_per_query() -> usize {
    3
}
fn default_fallback_threshold() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `ollama`, `openai`, `hashed`, or `disabled`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    /// Base URL of the provider. Defaults per provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "mxbai-embed-large".to_string()
}
fn default_embedding_dims() -> usize {
    1024
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `ollama`, `openai`, or `disabled`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_model() -> String {
    "llama3.2:3b".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    300
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,
    #[serde(default = "default_persona_company")]
    pub company: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            company: default_persona_company(),
        }
    }
}

impl PersonaConfig {
    pub fn to_persona(&self) -> Persona {
        Persona {
            name: self.name.clone(),
            company: self.company.clone(),
        }
    }
}

fn default_persona_name() -> String {
    "Alex".to_string()
}
fn default_persona_company() -> String {
    "TechFlow Solutions".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Sessions idle for longer than this are forgotten.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Upper bound on live sessions; the least recently used is evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_ttl_secs: default_session_ttl_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}
fn default_session_ttl_secs() -> u64 {
    3600
}
fn default_max_sessions() -> usize {
    1000
}

/// Read, override from the process environment, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Parse `content`, apply overrides from `env`, and validate.
pub fn parse_config<F>(content: &str, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    apply_overrides(&mut config, env)?;
    validate(&config)?;
    Ok(config)
}

fn parse_var<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", key, raw, e)),
        _ => Ok(None),
    }
}

fn apply_overrides<F>(config: &mut Config, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(model) = parse_var::<String, _>(&env, "OLLAMA_MODEL")? {
        config.llm.model = model;
    }
    if let Some(model) = parse_var::<String, _>(&env, "OLLAMA_EMBEDDING_MODEL")? {
        config.embedding.model = model;
    }
    if let Some(url) = parse_var::<String, _>(&env, "OLLAMA_BASE_URL")? {
        config.llm.url = Some(url.clone());
        config.embedding.url = Some(url);
    }
    if let Some(v) = parse_var(&env, "TEMPERATURE")? {
        config.llm.temperature = v;
    }
    if let Some(v) = parse_var(&env, "MAX_TOKENS")? {
        config.llm.max_tokens = v;
    }
    if let Some(v) = parse_var(&env, "TOP_K_RESULTS")? {
        config.retrieval.top_k = v;
    }
    if let Some(v) = parse_var(&env, "RELEVANCE_THRESHOLD")? {
        config.retrieval.relevance_threshold = v;
    }
    if let Some(v) = parse_var(&env, "MULTI_QUERY_COUNT")? {
        config.retrieval.multi_query_count = v;
    }
    if let Some(v) = parse_var(&env, "K_PER_QUERY")? {
        config.retrieval.k_per_query = v;
    }
    if let Some(v) = parse_var(&env, "CHUNK_SIZE")? {
        config.chunking.chunk_size = v;
    }
    if let Some(v) = parse_var(&env, "CHUNK_OVERLAP")? {
        config.chunking.chunk_overlap = v;
    }
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be < chunking.chunk_size");
    }

    // Retrieval
    let r = &config.retrieval;
    if r.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if r.k_per_query < 1 {
        bail!("retrieval.k_per_query must be >= 1");
    }
    if !(0.0..=1.0).contains(&r.relevance_threshold) {
        bail!("retrieval.relevance_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&r.fallback_threshold) {
        bail!("retrieval.fallback_threshold must be in [0.0, 1.0]");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" | "hashed" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be ollama, openai, hashed, or disabled.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // LLM
    match config.llm.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be ollama, openai, or disabled.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    // Server
    if config.server.max_sessions == 0 {
        bail!("server.max_sessions must be >= 1");
    }

    Ok(())
}
