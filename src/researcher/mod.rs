//! The research session — state and the turn loop.
//!
//! A session owns everything a run needs: the LLM provider, the optional
//! search clients, the ingestor, retrieval against local memory, and the
//! cost meter. Turns execute the protocol the planning prompt describes:
//! plan → search → ingest → summarize → answer sub-questions → attempt the
//! main question. The loop stops on an answer, the turn cap, the budget, or
//! cancellation — never any other way.

pub mod actions;
pub mod prompt;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ResearchConfig;
use crate::error::AppError;
use crate::ingest::Ingestor;
use crate::llm::cost::{CostMeter, ModelRates};
use crate::llm::embeddings::EmbeddingsClient;
use crate::llm::{ChatMessage, LlmProvider};
use crate::memory::ScoredChunk;
use crate::search::{PaperSearch, WebSearch};

/// A sub-question raised during research, with its answer once one exists.
#[derive(Debug, Clone)]
pub struct SubQuestion {
    pub text: String,
    pub answer: Option<String>,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Answered,
    TurnCapReached,
    BudgetExhausted,
    Cancelled,
}

/// What one turn did, for console progress output.
#[derive(Debug, Clone, Default)]
pub struct TurnReport {
    pub turn: u32,
    pub planned: bool,
    pub web_hits: usize,
    pub paper_hits: usize,
    pub answered: bool,
}

/// Result of a whole session.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub answer: Option<String>,
    pub final_summary: String,
    pub stop: StopReason,
    pub turns: u32,
    pub total_cost_usd: f64,
}

pub struct Researcher {
    provider: LlmProvider,
    embeddings: Option<EmbeddingsClient>,
    web: Option<WebSearch>,
    papers: Option<PaperSearch>,
    ingestor: Ingestor,
    cfg: ResearchConfig,

    question: String,
    context: Vec<String>,
    sub_questions: Vec<SubQuestion>,
    findings: Vec<String>,
    answer: Option<String>,
    turn: u32,
    cost: CostMeter,
}

impl Researcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: LlmProvider,
        embeddings: Option<EmbeddingsClient>,
        web: Option<WebSearch>,
        papers: Option<PaperSearch>,
        ingestor: Ingestor,
        cfg: ResearchConfig,
        rates: ModelRates,
        question: String,
        context: Vec<String>,
    ) -> Result<Self, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::Research("a research question is required".into()));
        }
        let budget = cfg.budget_usd;
        Ok(Self {
            provider,
            embeddings,
            web,
            papers,
            ingestor,
            cfg,
            question,
            context,
            sub_questions: Vec::new(),
            findings: Vec::new(),
            answer: None,
            turn: 0,
            cost: CostMeter::new(rates, budget),
        })
    }

    /// Drive turns until a stop condition, then produce the final summary.
    pub async fn run_loop(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<ResearchOutcome, AppError> {
        let stop = loop {
            if shutdown.is_cancelled() {
                break StopReason::Cancelled;
            }
            if self.turn >= self.cfg.max_turns {
                break StopReason::TurnCapReached;
            }
            if self.cost.budget_exceeded() {
                warn!(cost_usd = self.cost.total_cost_usd(), "session budget exhausted");
                break StopReason::BudgetExhausted;
            }

            let report = self.run_turn().await?;
            info!(
                turn = report.turn,
                planned = report.planned,
                web_hits = report.web_hits,
                paper_hits = report.paper_hits,
                cost_usd = self.cost.total_cost_usd(),
                "turn complete"
            );
            if report.answered {
                break StopReason::Answered;
            }
        };

        let final_summary = self.final_summary().await;

        Ok(ResearchOutcome {
            answer: self.answer.clone(),
            final_summary,
            stop,
            turns: self.turn,
            total_cost_usd: self.cost.total_cost_usd(),
        })
    }

    /// Execute one turn of the protocol.
    pub async fn run_turn(&mut self) -> Result<TurnReport, AppError> {
        self.turn += 1;
        let mut report = TurnReport { turn: self.turn, ..Default::default() };

        // Phase 1 — plan.
        let plan = match self.propose_actions().await? {
            Some(plan) => plan,
            None => {
                warn!(turn = self.turn, "model reply contained no parseable plan, skipping turn");
                return Ok(report);
            }
        };
        report.planned = true;

        if !plan.sub_questions.is_empty() {
            self.merge_sub_questions(&plan.sub_questions);
        }

        // Phase 2 — search and ingest.
        if plan.web_search && !plan.web_query.trim().is_empty() {
            report.web_hits = self.run_web_search(&plan.web_query).await;
        }
        if !plan.paper_query.trim().is_empty() {
            report.paper_hits = self.run_paper_search(&plan.paper_query).await;
        }

        // Phase 3 — read back evidence and reason over it.
        let evidence = self.retrieve_evidence().await?;
        if !evidence.is_empty() {
            self.summarize(&evidence).await?;
            self.answer_sub_questions(&evidence).await?;
        }

        // Phase 4 — attempt the main question.
        if !self.findings.is_empty() {
            if let Some(verdict) = self.attempt_main_answer().await? {
                if verdict.answered && !verdict.answer.trim().is_empty() {
                    self.answer = Some(verdict.answer);
                    report.answered = true;
                }
            }
        }

        Ok(report)
    }

    async fn propose_actions(&mut self) -> Result<Option<actions::ProposedActions>, AppError> {
        let sub_texts: Vec<String> = self.sub_questions.iter().map(|s| s.text.clone()).collect();
        let system = prompt::planning_prompt(
            &self.question,
            &self.context,
            &sub_texts,
            &self.findings,
            self.turn,
            self.cfg.max_turns,
            self.web.is_some(),
        );
        let reply = self
            .complete(vec![
                ChatMessage::system(system),
                ChatMessage::user("Propose your research plan for this turn as JSON."),
            ])
            .await?;
        Ok(actions::parse_actions(&reply))
    }

    async fn run_web_search(&mut self, query: &str) -> usize {
        let Some(web) = &self.web else {
            debug!("web search proposed but unavailable");
            return 0;
        };
        match web.search(query, self.cfg.max_web_results).await {
            Ok(hits) => {
                let count = hits.len();
                match self.ingestor.ingest_web_hits(&hits).await {
                    Ok(r) => {
                        self.cost.record_embedding(r.embedding_tokens);
                    }
                    Err(e) => warn!(error = %e, "web ingestion failed"),
                }
                count
            }
            Err(e) => {
                warn!(error = %e, %query, "web search failed, continuing without it");
                0
            }
        }
    }

    async fn run_paper_search(&mut self, query: &str) -> usize {
        let Some(papers) = &self.papers else {
            debug!("paper search proposed but unavailable");
            return 0;
        };
        match papers.search(query, self.cfg.max_paper_results).await {
            Ok(hits) => {
                let count = hits.len();
                match self.ingestor.ingest_paper_hits(&hits).await {
                    Ok(r) => {
                        self.cost.record_embedding(r.embedding_tokens);
                    }
                    Err(e) => warn!(error = %e, "paper ingestion failed"),
                }
                count
            }
            Err(e) => {
                warn!(error = %e, %query, "paper search failed, continuing without it");
                0
            }
        }
    }

    /// Top-k evidence: BM25 hits merged with cosine hits, deduped by chunk.
    async fn retrieve_evidence(&mut self) -> Result<Vec<ScoredChunk>, AppError> {
        let store = self.ingestor.store();
        let mut evidence = store.search_text(&self.question, self.cfg.top_k)?;

        if let Some(embedder) = &self.embeddings {
            match embedder.embed(std::slice::from_ref(&self.question)).await {
                Ok(batch) => {
                    self.cost.record_embedding(batch.tokens);
                    if let Some(query_vec) = batch.vectors.first() {
                        let vector_hits = store.search_vector(query_vec, self.cfg.top_k)?;
                        for hit in vector_hits {
                            if !evidence.iter().any(|e| e.chunk.id == hit.chunk.id) {
                                evidence.push(hit);
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, "query embedding failed, text search only"),
            }
        }

        evidence.truncate(self.cfg.top_k);
        debug!(chunks = evidence.len(), "evidence retrieved");
        Ok(evidence)
    }

    async fn summarize(&mut self, evidence: &[ScoredChunk]) -> Result<(), AppError> {
        let p = prompt::summarize_prompt(&self.question, evidence);
        let summary = self.complete(vec![ChatMessage::user(p)]).await?;
        self.findings.push(summary);
        Ok(())
    }

    async fn answer_sub_questions(&mut self, evidence: &[ScoredChunk]) -> Result<(), AppError> {
        let open: Vec<String> = self
            .sub_questions
            .iter()
            .filter(|s| s.answer.is_none())
            .map(|s| s.text.clone())
            .collect();
        if open.is_empty() {
            return Ok(());
        }

        let p = prompt::sub_questions_prompt(&self.question, &open, evidence);
        let reply = self.complete(vec![ChatMessage::user(p)]).await?;
        let parsed = parse_numbered_answers(&reply, open.len());

        for (open_idx, answer) in parsed.into_iter().enumerate() {
            let Some(answer) = answer else { continue };
            if answer.trim().eq_ignore_ascii_case("unknown") {
                continue;
            }
            let text = &open[open_idx];
            if let Some(sq) = self
                .sub_questions
                .iter_mut()
                .find(|s| s.answer.is_none() && s.text == *text)
            {
                sq.answer = Some(answer);
            }
        }
        Ok(())
    }

    async fn attempt_main_answer(&mut self) -> Result<Option<actions::MainAnswer>, AppError> {
        let sub_answers: Vec<(String, String)> = self
            .sub_questions
            .iter()
            .filter_map(|s| s.answer.as_ref().map(|a| (s.text.clone(), a.clone())))
            .collect();
        let p = prompt::main_answer_prompt(&self.question, &self.findings, &sub_answers);
        let reply = self.complete(vec![ChatMessage::user(p)]).await?;
        Ok(actions::parse_main_answer(&reply))
    }

    async fn final_summary(&mut self) -> String {
        if self.findings.is_empty() {
            return "No findings were gathered in this session.".to_string();
        }
        let p = prompt::final_summary_prompt(
            &self.question,
            &self.findings,
            self.answer.as_deref(),
        );
        match self.complete(vec![ChatMessage::user(p)]).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "final summary failed, joining findings verbatim");
                self.findings.join("\n")
            }
        }
    }

    /// One provider round-trip with usage recorded against the budget.
    async fn complete(&mut self, messages: Vec<ChatMessage>) -> Result<String, AppError> {
        let resp = self
            .provider
            .complete(&messages)
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;
        if let Some(usage) = &resp.usage {
            if self.cost.record_chat(usage) {
                warn!(
                    cost_usd = self.cost.total_cost_usd(),
                    budget_usd = self.cost.budget_usd(),
                    "budget crossed, session will stop at the turn boundary"
                );
            }
        }
        Ok(resp.text)
    }

    fn merge_sub_questions(&mut self, proposed: &[String]) {
        for text in proposed {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            if !self.sub_questions.iter().any(|s| s.text == text) {
                self.sub_questions.push(SubQuestion { text: text.to_string(), answer: None });
            }
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn cost(&self) -> &CostMeter {
        &self.cost
    }

    pub fn sub_questions(&self) -> &[SubQuestion] {
        &self.sub_questions
    }

    pub fn findings(&self) -> &[String] {
        &self.findings
    }
}

/// Map a numbered-list reply (`1. …`, `2) …`) back to answers by index.
/// Lines that do not start with a recognized number are folded into the
/// previous answer, so multi-line answers survive.
fn parse_numbered_answers(reply: &str, count: usize) -> Vec<Option<String>> {
    let mut answers: Vec<Option<String>> = vec![None; count];
    let mut current: Option<usize> = None;

    for line in reply.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let numbered = trimmed
            .split_once(['.', ')'])
            .and_then(|(num, rest)| num.trim().parse::<usize>().ok().map(|n| (n, rest.trim())));
        match numbered {
            Some((n, rest)) if n >= 1 && n <= count => {
                current = Some(n - 1);
                answers[n - 1] = Some(rest.to_string());
            }
            _ => {
                if let Some(idx) = current {
                    if let Some(existing) = &mut answers[idx] {
                        existing.push(' ');
                        existing.push_str(trimmed);
                    }
                }
            }
        }
    }
    answers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ingest::Ingestor;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::memory::PaperStore;
    use tempfile::TempDir;

    fn make_researcher(max_turns: u32) -> (TempDir, Researcher) {
        let temp = TempDir::new().expect("tempdir");
        let cfg = Config::test_default(temp.path());
        let store = PaperStore::open(temp.path()).expect("open store");
        let ingestor = Ingestor::new(store, None, cfg.research.chunk_size).expect("ingestor");
        let mut research_cfg = cfg.research.clone();
        research_cfg.max_turns = max_turns;
        let researcher = Researcher::new(
            LlmProvider::Dummy(DummyProvider),
            None,
            None,
            None,
            ingestor,
            research_cfg,
            ModelRates::default(),
            "What is the difference between low and high mass star formation?".into(),
            vec!["What is the mass cutoff for a low mass star?".into()],
        )
        .expect("researcher");
        (temp, researcher)
    }

    #[test]
    fn empty_question_is_rejected() {
        let temp = TempDir::new().unwrap();
        let cfg = Config::test_default(temp.path());
        let store = PaperStore::open(temp.path()).unwrap();
        let ingestor = Ingestor::new(store, None, 200).unwrap();
        let err = Researcher::new(
            LlmProvider::Dummy(DummyProvider),
            None,
            None,
            None,
            ingestor,
            cfg.research,
            ModelRates::default(),
            "   ".into(),
            vec![],
        )
        .err()
        .expect("should reject");
        assert!(err.to_string().contains("research question"));
    }

    #[tokio::test]
    async fn loop_terminates_at_turn_cap() {
        // The dummy provider echoes prose, so no plan ever parses; the loop
        // must still end exactly at the cap.
        let (_temp, mut r) = make_researcher(3);
        let shutdown = CancellationToken::new();
        let outcome = r.run_loop(&shutdown).await.unwrap();
        assert_eq!(outcome.stop, StopReason::TurnCapReached);
        assert_eq!(outcome.turns, 3);
        assert!(outcome.answer.is_none());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_any_turn() {
        let (_temp, mut r) = make_researcher(5);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let outcome = r.run_loop(&shutdown).await.unwrap();
        assert_eq!(outcome.stop, StopReason::Cancelled);
        assert_eq!(outcome.turns, 0);
    }

    #[tokio::test]
    async fn unparseable_plan_skips_turn_without_error() {
        let (_temp, mut r) = make_researcher(3);
        let report = r.run_turn().await.unwrap();
        assert_eq!(report.turn, 1);
        assert!(!report.planned);
        assert!(!report.answered);
    }

    #[test]
    fn merge_sub_questions_dedupes() {
        let (_temp, mut r) = make_researcher(1);
        r.merge_sub_questions(&["a".into(), "b".into(), "a".into(), " ".into()]);
        r.merge_sub_questions(&["b".into(), "c".into()]);
        let texts: Vec<_> = r.sub_questions().iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn numbered_answers_parse_by_index() {
        let reply = "1. eight solar masses\n2) unknown\n3. see Smith et al.\n   continued line";
        let parsed = parse_numbered_answers(reply, 3);
        assert_eq!(parsed[0].as_deref(), Some("eight solar masses"));
        assert_eq!(parsed[1].as_deref(), Some("unknown"));
        assert_eq!(parsed[2].as_deref(), Some("see Smith et al. continued line"));
    }

    #[test]
    fn out_of_range_numbers_ignored() {
        let parsed = parse_numbered_answers("7. out of range\nno numbering", 2);
        assert_eq!(parsed, vec![None, None]);
    }
}
