//! LLM provider implementations.
//!
//! `build(config, api_key)` is the factory — called at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod openai_compatible;

use crate::config::LlmConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Construct a `LlmProvider` from config and an optional API key.
///
/// `api_key` is sourced from `LLM_API_KEY` env (never TOML) and is `None`
/// for keyless local models.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider::default())),
        "openai" | "openai-compatible" => {
            let oai = &config.openai;
            let p = openai_compatible::OpenAiProvider::new(
                oai.api_base_url.clone(),
                oai.model.clone(),
                oai.temperature,
                oai.timeout_seconds,
                oai.max_tokens,
                api_key,
            )?;
            Ok(LlmProvider::OpenAi(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn builds_dummy_provider() {
        let cfg = Config::test_default(std::path::Path::new("/tmp"));
        let p = build(&cfg.llm, None).unwrap();
        assert!(matches!(p, LlmProvider::Dummy(_)));
    }

    #[test]
    fn builds_openai_provider() {
        let cfg = Config::test_default(std::path::Path::new("/tmp"));
        let mut llm = cfg.llm.clone();
        llm.provider = "openai".into();
        let p = build(&llm, Some("sk-test".into())).unwrap();
        assert!(matches!(p, LlmProvider::OpenAi(_)));
    }

    #[test]
    fn unknown_provider_errors() {
        let cfg = Config::test_default(std::path::Path::new("/tmp"));
        let mut llm = cfg.llm.clone();
        llm.provider = "martian".into();
        let err = build(&llm, None).unwrap_err();
        assert!(err.to_string().contains("martian"));
    }
}
