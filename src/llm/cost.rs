//! Token and cost accounting for the research session.
//!
//! Every chat and embedding round-trip records its usage here before the
//! result is used. The loop consults [`CostMeter::budget_exceeded`] before
//! each turn, so a runaway session stops on the turn boundary after the
//! budget is crossed.

use crate::llm::LlmUsage;

/// USD prices per million tokens for the active models.
///
/// Populated from `[llm.openai]` / `[llm.embeddings]` config rather than a
/// hard-coded model table, so local or renamed models cost out correctly.
#[derive(Debug, Clone, Default)]
pub struct ModelRates {
    pub input_per_million_usd: f64,
    pub output_per_million_usd: f64,
    pub embedding_per_million_usd: f64,
}

/// Cumulative usage and spend for one session.
#[derive(Debug, Clone, Default)]
pub struct CostMeter {
    rates: ModelRates,
    /// Session budget in USD; `0.0` disables the cap.
    budget_usd: f64,
    prompt_tokens: u64,
    completion_tokens: u64,
    embedding_tokens: u64,
    total_cost_usd: f64,
}

impl CostMeter {
    pub fn new(rates: ModelRates, budget_usd: f64) -> Self {
        Self { rates, budget_usd, ..Default::default() }
    }

    /// Record one chat round-trip. Returns `true` if the budget is now exceeded.
    pub fn record_chat(&mut self, usage: &LlmUsage) -> bool {
        self.prompt_tokens += usage.input_tokens;
        self.completion_tokens += usage.output_tokens;
        self.total_cost_usd += usage.input_tokens as f64 * self.rates.input_per_million_usd
            / 1_000_000.0
            + usage.output_tokens as f64 * self.rates.output_per_million_usd / 1_000_000.0;
        self.budget_exceeded()
    }

    /// Record one embeddings round-trip. Returns `true` if the budget is now exceeded.
    pub fn record_embedding(&mut self, tokens: u64) -> bool {
        self.embedding_tokens += tokens;
        self.total_cost_usd +=
            tokens as f64 * self.rates.embedding_per_million_usd / 1_000_000.0;
        self.budget_exceeded()
    }

    pub fn budget_exceeded(&self) -> bool {
        self.budget_usd > 0.0 && self.total_cost_usd >= self.budget_usd
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens
    }

    pub fn completion_tokens(&self) -> u64 {
        self.completion_tokens
    }

    pub fn embedding_tokens(&self) -> u64 {
        self.embedding_tokens
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_usd
    }

    pub fn budget_usd(&self) -> f64 {
        self.budget_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> ModelRates {
        ModelRates {
            input_per_million_usd: 1.0,
            output_per_million_usd: 2.0,
            embedding_per_million_usd: 0.1,
        }
    }

    #[test]
    fn chat_cost_accumulates() {
        let mut m = CostMeter::new(rates(), 0.0);
        m.record_chat(&LlmUsage { input_tokens: 1_000_000, output_tokens: 500_000 });
        assert_eq!(m.prompt_tokens(), 1_000_000);
        assert_eq!(m.completion_tokens(), 500_000);
        // 1.0 for input + 1.0 for output
        assert!((m.total_cost_usd() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn embedding_cost_accumulates() {
        let mut m = CostMeter::new(rates(), 0.0);
        m.record_embedding(2_000_000);
        assert_eq!(m.embedding_tokens(), 2_000_000);
        assert!((m.total_cost_usd() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn zero_budget_never_exceeds() {
        let mut m = CostMeter::new(rates(), 0.0);
        let exceeded = m.record_chat(&LlmUsage { input_tokens: u64::MAX / 2, output_tokens: 0 });
        assert!(!exceeded);
    }

    #[test]
    fn budget_boundary_is_inclusive() {
        let mut m = CostMeter::new(rates(), 2.0);
        // exactly 2.0 USD
        let exceeded = m.record_chat(&LlmUsage { input_tokens: 1_000_000, output_tokens: 500_000 });
        assert!(exceeded);
        assert!(m.budget_exceeded());
    }

    #[test]
    fn under_budget_not_exceeded() {
        let mut m = CostMeter::new(rates(), 10.0);
        let exceeded = m.record_chat(&LlmUsage { input_tokens: 1000, output_tokens: 1000 });
        assert!(!exceeded);
    }
}
