//! Dummy LLM provider — echoes the last user message back prefixed with `[echo]`.
//! Used for testing the loop plumbing without a real API key.

use crate::llm::{ChatMessage, LlmResponse, ProviderError, Role};

#[derive(Debug, Clone, Default)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<LlmResponse, ProviderError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(LlmResponse {
            text: format!("[echo] {last_user}"),
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_echoes_last_user_message() {
        let p = DummyProvider;
        let msgs = [
            ChatMessage::system("protocol"),
            ChatMessage::user("first"),
            ChatMessage::user("second"),
        ];
        let resp = p.complete(&msgs).await.unwrap();
        assert_eq!(resp.text, "[echo] second");
        assert!(resp.usage.is_none());
    }

    #[tokio::test]
    async fn complete_without_user_message() {
        let p = DummyProvider;
        let resp = p.complete(&[ChatMessage::system("only system")]).await.unwrap();
        assert_eq!(resp.text, "[echo] ");
    }
}
