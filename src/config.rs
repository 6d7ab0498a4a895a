//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `LITREV_WORK_DIR` and `LITREV_LOG_LEVEL` env overrides.
//! API keys are sourced from env only — never TOML.

use std::{
    env,
    path::{Path, PathBuf},
    fs,
};

use serde::Deserialize;

use crate::error::AppError;

/// OpenAI / OpenAI-compatible chat provider configuration.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature (ignored for models that forbid it).
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Completion token cap per request.
    pub max_tokens: u32,
    /// USD per million input tokens, for cost accounting.
    pub input_per_million_usd: f64,
    /// USD per million output tokens, for cost accounting.
    pub output_per_million_usd: f64,
}

/// Embeddings endpoint configuration (`[llm.embeddings]`).
#[derive(Debug, Clone)]
pub struct EmbeddingsConfig {
    /// Full embeddings endpoint URL.
    pub api_base_url: String,
    /// Embedding model name.
    pub model: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// USD per million embedded tokens.
    pub input_per_million_usd: f64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"` or `"openai"`).
    /// Maps to `default` in `[llm]` TOML — named `default` there to signal
    /// that other provider sections can coexist without being loaded.
    pub provider: String,
    /// Config for the OpenAI / OpenAI-compatible provider (`[llm.openai]`).
    pub openai: OpenAiConfig,
    /// Config for the embeddings endpoint (`[llm.embeddings]`).
    pub embeddings: EmbeddingsConfig,
}

/// Research loop configuration (`[research]`).
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Hard cap on loop turns — the loop always terminates.
    pub max_turns: u32,
    /// Session budget in USD; 0.0 disables the cap.
    pub budget_usd: f64,
    /// How many memory chunks to retrieve as evidence per turn.
    pub top_k: usize,
    /// Web results ingested per turn.
    pub max_web_results: usize,
    /// Academic papers ingested per turn.
    pub max_paper_results: usize,
    /// Chunk size in characters for ingestion.
    pub chunk_size: usize,
}

/// Web search configuration (`[search.google]`).
#[derive(Debug, Clone)]
pub struct GoogleSearchConfig {
    pub enabled: bool,
    /// Custom Search JSON API endpoint.
    pub api_base_url: String,
    pub timeout_seconds: u64,
}

/// Academic search configuration (`[search.papers]`).
#[derive(Debug, Clone)]
pub struct PaperSearchConfig {
    pub enabled: bool,
    /// Semantic Scholar Graph API paper-search endpoint.
    pub api_base_url: String,
    /// Comma-separated field list requested from the API.
    pub fields: String,
    pub timeout_seconds: u64,
}

/// Search configuration (`[search]`).
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub google: GoogleSearchConfig,
    pub papers: PaperSearchConfig,
}

/// Fully-resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub assistant_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub llm: LlmConfig,
    pub research: ResearchConfig,
    pub search: SearchConfig,
    /// API key from `LLM_API_KEY` env var — `None` for keyless local models.
    /// Never sourced from TOML.
    pub llm_api_key: Option<String>,
    /// Google Custom Search credentials from `GOOGLE_API_KEY` / `GOOGLE_CSE_ID`.
    pub google_api_key: Option<String>,
    pub google_cse_id: Option<String>,
    /// Optional Semantic Scholar key from `S2_API_KEY` (higher rate limits).
    pub s2_api_key: Option<String>,
}

impl Config {
    /// Returns `true` if web search can actually run: enabled and keyed.
    pub fn web_search_available(&self) -> bool {
        self.search.google.enabled
            && self.google_api_key.is_some()
            && self.google_cse_id.is_some()
    }

    /// Returns `true` if academic search should be attempted.
    pub fn paper_search_available(&self) -> bool {
        self.search.papers.enabled
    }
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    assistant: RawAssistant,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    research: RawResearch,
    #[serde(default)]
    search: RawSearch,
}

#[derive(Deserialize)]
struct RawAssistant {
    name: String,
    work_dir: String,
    log_level: String,
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
    #[serde(default)]
    embeddings: RawEmbeddingsConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            openai: RawOpenAiConfig::default(),
            embeddings: RawEmbeddingsConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default)]
    input_per_million_usd: f64,
    #[serde(default)]
    output_per_million_usd: f64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_timeout_seconds(),
            max_tokens: default_max_tokens(),
            input_per_million_usd: 0.0,
            output_per_million_usd: 0.0,
        }
    }
}

#[derive(Deserialize)]
struct RawEmbeddingsConfig {
    #[serde(default = "default_embeddings_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_embeddings_model")]
    model: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default)]
    input_per_million_usd: f64,
}

impl Default for RawEmbeddingsConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_embeddings_api_base_url(),
            model: default_embeddings_model(),
            timeout_seconds: default_timeout_seconds(),
            input_per_million_usd: 0.0,
        }
    }
}

#[derive(Deserialize)]
struct RawResearch {
    #[serde(default = "default_max_turns")]
    max_turns: u32,
    #[serde(default)]
    budget_usd: f64,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_max_web_results")]
    max_web_results: usize,
    #[serde(default = "default_max_paper_results")]
    max_paper_results: usize,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
}

impl Default for RawResearch {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            budget_usd: 0.0,
            top_k: default_top_k(),
            max_web_results: default_max_web_results(),
            max_paper_results: default_max_paper_results(),
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawSearch {
    #[serde(default)]
    google: RawGoogleSearch,
    #[serde(default)]
    papers: RawPaperSearch,
}

#[derive(Deserialize)]
struct RawGoogleSearch {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_google_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawGoogleSearch {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base_url: default_google_api_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawPaperSearch {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_papers_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_paper_fields")]
    fields: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawPaperSearch {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base_url: default_papers_api_base_url(),
            fields: default_paper_fields(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_llm_provider() -> String { "dummy".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_temperature() -> f32 { 0.0 }
fn default_timeout_seconds() -> u64 { 60 }
fn default_max_tokens() -> u32 { 1024 }
fn default_embeddings_api_base_url() -> String { "https://api.openai.com/v1/embeddings".to_string() }
fn default_embeddings_model() -> String { "text-embedding-3-small".to_string() }
fn default_max_turns() -> u32 { 8 }
fn default_top_k() -> usize { 8 }
fn default_max_web_results() -> usize { 5 }
fn default_max_paper_results() -> usize { 5 }
fn default_chunk_size() -> usize { 1200 }
fn default_google_api_base_url() -> String { "https://www.googleapis.com/customsearch/v1".to_string() }
fn default_papers_api_base_url() -> String { "https://api.semanticscholar.org/graph/v1/paper/search".to_string() }
fn default_paper_fields() -> String { "title,abstract,authors,year,url,openAccessPdf".to_string() }

fn default_true() -> bool {
    true
}

/// Load config from `path` (default `config/default.toml`), then apply
/// env-var overrides.
pub fn load(path: Option<&Path>) -> Result<Config, AppError> {
    let work_dir_override = env::var("LITREV_WORK_DIR").ok();
    let log_level_override = env::var("LITREV_LOG_LEVEL").ok();
    load_from(
        path.unwrap_or_else(|| Path::new("config/default.toml")),
        work_dir_override.as_deref(),
        log_level_override.as_deref(),
    )
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let a = parsed.assistant;

    let work_dir_str = work_dir_override.unwrap_or(&a.work_dir).to_string();
    let work_dir = expand_home(&work_dir_str);
    let log_level = log_level_override.unwrap_or(&a.log_level).to_string();

    Ok(Config {
        assistant_name: a.name,
        work_dir,
        log_level,
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
                max_tokens: parsed.llm.openai.max_tokens,
                input_per_million_usd: parsed.llm.openai.input_per_million_usd,
                output_per_million_usd: parsed.llm.openai.output_per_million_usd,
            },
            embeddings: EmbeddingsConfig {
                api_base_url: parsed.llm.embeddings.api_base_url,
                model: parsed.llm.embeddings.model,
                timeout_seconds: parsed.llm.embeddings.timeout_seconds,
                input_per_million_usd: parsed.llm.embeddings.input_per_million_usd,
            },
        },
        research: ResearchConfig {
            max_turns: parsed.research.max_turns,
            budget_usd: parsed.research.budget_usd,
            top_k: parsed.research.top_k,
            max_web_results: parsed.research.max_web_results,
            max_paper_results: parsed.research.max_paper_results,
            chunk_size: parsed.research.chunk_size,
        },
        search: SearchConfig {
            google: GoogleSearchConfig {
                enabled: parsed.search.google.enabled,
                api_base_url: parsed.search.google.api_base_url,
                timeout_seconds: parsed.search.google.timeout_seconds,
            },
            papers: PaperSearchConfig {
                enabled: parsed.search.papers.enabled,
                api_base_url: parsed.search.papers.api_base_url,
                fields: parsed.search.papers.fields,
                timeout_seconds: parsed.search.papers.timeout_seconds,
            },
        },
        llm_api_key: env::var("LLM_API_KEY").ok(),
        google_api_key: env::var("GOOGLE_API_KEY").ok(),
        google_cse_id: env::var("GOOGLE_CSE_ID").ok(),
        s2_api_key: env::var("S2_API_KEY").ok(),
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests — dummy LLM, no API keys, no external calls.
#[cfg(test)]
impl Config {
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            assistant_name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                    max_tokens: 64,
                    input_per_million_usd: 0.0,
                    output_per_million_usd: 0.0,
                },
                embeddings: EmbeddingsConfig {
                    api_base_url: "http://localhost:0/v1/embeddings".into(),
                    model: "test-embed".into(),
                    timeout_seconds: 1,
                    input_per_million_usd: 0.0,
                },
            },
            research: ResearchConfig {
                max_turns: 2,
                budget_usd: 0.0,
                top_k: 4,
                max_web_results: 2,
                max_paper_results: 2,
                chunk_size: 200,
            },
            search: SearchConfig {
                google: GoogleSearchConfig {
                    enabled: false,
                    api_base_url: "http://localhost:0/customsearch/v1".into(),
                    timeout_seconds: 1,
                },
                papers: PaperSearchConfig {
                    enabled: false,
                    api_base_url: "http://localhost:0/graph/v1/paper/search".into(),
                    fields: default_paper_fields(),
                    timeout_seconds: 1,
                },
            },
            llm_api_key: None,
            google_api_key: None,
            google_cse_id: None,
            s2_api_key: None,
        }
    }
}
