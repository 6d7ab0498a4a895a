//! Interactive console session over stdin/stdout.
//!
//! Plain input lines become research questions; slash commands manage the
//! local library. After a question is entered, further lines add context
//! until a blank line starts the run.

use std::io::IsTerminal;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::ingest::Ingestor;
use crate::llm::cost::ModelRates;
use crate::llm::embeddings::EmbeddingsClient;
use crate::llm::providers;
use crate::memory::PaperStore;
use crate::researcher::{Researcher, ResearchOutcome, StopReason};
use crate::search::{PaperSearch, WebSearch};

pub struct Console {
    config: Config,
    shutdown: CancellationToken,
}

impl Console {
    pub fn new(config: Config, shutdown: CancellationToken) -> Self {
        Self { config, shutdown }
    }

    /// Read lines until EOF, `/exit`, or cancellation.
    pub async fn run(&self) -> Result<(), AppError> {
        let interactive_tty = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
        if interactive_tty {
            println!("{} — ask a research question, or /help", self.config.assistant_name);
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            if interactive_tty {
                print_prompt("? ");
            }

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("console shutting down");
                    break;
                }

                line = lines.next_line() => {
                    let input = match line {
                        Ok(Some(l)) => l,
                        Ok(None) => {
                            info!("console stdin closed");
                            break;
                        }
                        Err(e) => {
                            warn!("console read error: {e}");
                            break;
                        }
                    };

                    match parse_command(&input) {
                        None => {}
                        Some(ConsoleCommand::Help) => print_usage(),
                        Some(ConsoleCommand::Exit) => {
                            self.shutdown.cancel();
                            break;
                        }
                        Some(ConsoleCommand::Papers) => {
                            if let Err(e) = self.print_papers() {
                                eprintln!("papers error: {e}");
                            }
                        }
                        Some(ConsoleCommand::Forget { paper_id }) => {
                            match self.forget_paper(&paper_id) {
                                Ok(true) => println!("forgot {paper_id}"),
                                Ok(false) => println!("no such paper: {paper_id}"),
                                Err(e) => eprintln!("forget error: {e}"),
                            }
                        }
                        Some(ConsoleCommand::Question(question)) => {
                            let context =
                                read_context_lines(&mut lines, interactive_tty).await;
                            match self.run_question(&question, context).await {
                                Ok(outcome) => print_outcome(&outcome),
                                Err(e) => eprintln!("research error: {e}"),
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// One full research run. Also used by the non-interactive `--question` path.
    pub async fn run_question(
        &self,
        question: &str,
        context: Vec<String>,
    ) -> Result<ResearchOutcome, AppError> {
        let mut researcher = self.build_researcher(question, context)?;
        info!(question, "starting research session");
        researcher.run_loop(&self.shutdown).await
    }

    fn build_researcher(
        &self,
        question: &str,
        context: Vec<String>,
    ) -> Result<Researcher, AppError> {
        let cfg = &self.config;

        let provider = providers::build(&cfg.llm, cfg.llm_api_key.clone())
            .map_err(|e| AppError::Llm(e.to_string()))?;

        // Embeddings only make sense with a real provider behind them.
        let embeddings = if cfg.llm.provider == "dummy" {
            None
        } else {
            Some(
                EmbeddingsClient::new(&cfg.llm.embeddings, cfg.llm_api_key.clone())
                    .map_err(|e| AppError::Llm(e.to_string()))?,
            )
        };

        let web = if cfg.web_search_available() {
            Some(WebSearch::new(
                &cfg.search.google,
                cfg.google_api_key.clone(),
                cfg.google_cse_id.clone(),
            )?)
        } else {
            info!("web search unavailable (disabled or unkeyed), running without it");
            None
        };

        let papers = if cfg.paper_search_available() {
            Some(PaperSearch::new(&cfg.search.papers, cfg.s2_api_key.clone())?)
        } else {
            info!("paper search disabled, running without it");
            None
        };

        let store = PaperStore::open(&cfg.work_dir)?;
        let ingestor = Ingestor::new(store, embeddings.clone(), cfg.research.chunk_size)?;

        Researcher::new(
            provider,
            embeddings,
            web,
            papers,
            ingestor,
            cfg.research.clone(),
            self.rates(),
            question.to_string(),
            context,
        )
    }

    fn rates(&self) -> ModelRates {
        ModelRates {
            input_per_million_usd: self.config.llm.openai.input_per_million_usd,
            output_per_million_usd: self.config.llm.openai.output_per_million_usd,
            embedding_per_million_usd: self.config.llm.embeddings.input_per_million_usd,
        }
    }

    fn print_papers(&self) -> Result<(), AppError> {
        let store = PaperStore::open(&self.config.work_dir)?;
        let papers = store.list_papers()?;
        if papers.is_empty() {
            println!("library is empty");
            return Ok(());
        }
        for p in &papers {
            println!("{}  [{}]  {}", p.paper_id, p.source, p.title);
        }
        println!("{} paper(s)", papers.len());
        Ok(())
    }

    fn forget_paper(&self, paper_id: &str) -> Result<bool, AppError> {
        let store = PaperStore::open(&self.config.work_dir)?;
        store.delete_paper(paper_id)
    }
}

/// Context entry after a question: lines until the first blank one.
async fn read_context_lines(
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
    interactive_tty: bool,
) -> Vec<String> {
    if interactive_tty {
        println!("context (one line each, blank line to start):");
    }
    let mut context = Vec::new();
    loop {
        if interactive_tty {
            print_prompt("+ ");
        }
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    break;
                }
                context.push(line.to_string());
            }
            Ok(None) => break,
            Err(e) => {
                warn!("console read error during context entry: {e}");
                break;
            }
        }
    }
    context
}

#[derive(Debug)]
enum ConsoleCommand {
    Question(String),
    Papers,
    Forget { paper_id: String },
    Help,
    Exit,
}

fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Some(cmdline) = trimmed.strip_prefix('/') else {
        return Some(ConsoleCommand::Question(trimmed.to_string()));
    };

    let mut parts = cmdline.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default().trim();
    let rest = parts.next().unwrap_or_default().trim();

    match command {
        "papers" => Some(ConsoleCommand::Papers),
        "forget" if !rest.is_empty() => Some(ConsoleCommand::Forget {
            paper_id: rest.to_string(),
        }),
        "exit" | "quit" => Some(ConsoleCommand::Exit),
        _ => Some(ConsoleCommand::Help),
    }
}

fn print_prompt(prompt: &str) {
    use std::io::Write as _;
    print!("{prompt}");
    let _ = std::io::stdout().flush();
}

fn print_usage() {
    eprintln!("commands:");
    eprintln!("  <question>        start a research session");
    eprintln!("  /papers           list stored papers");
    eprintln!("  /forget <id>      delete a stored paper");
    eprintln!("  /exit");
    eprintln!("  /help");
}

fn print_outcome(outcome: &ResearchOutcome) {
    match outcome.stop {
        StopReason::Answered => println!("\nanswer:"),
        StopReason::TurnCapReached => println!("\nturn cap reached without a conclusive answer"),
        StopReason::BudgetExhausted => println!("\nbudget exhausted before a conclusive answer"),
        StopReason::Cancelled => println!("\nsession cancelled"),
    }
    if let Some(answer) = &outcome.answer {
        println!("{answer}\n");
    }
    println!("summary:\n{}", outcome.final_summary);
    println!(
        "\n({} turn(s), ${:.4} spent)",
        outcome.turns, outcome.total_cost_usd
    );
}
