//! litrev — entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args
//!   3. Load config
//!   4. Init logger (RUST_LOG > CLI `-v` flags > config)
//!   5. Spawn Ctrl-C → shutdown watcher
//!   6. Run the console (interactive) or a single `--question` session

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::info;

use litrev::{config, console, error, logger};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), error::AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level)?;

    info!(
        assistant_name = %config.assistant_name,
        work_dir = %config.work_dir.display(),
        log_level = %effective_log_level,
        llm_provider = %config.llm.provider,
        web_search = config.web_search_available(),
        paper_search = config.paper_search_available(),
        "config loaded"
    );

    // Shared shutdown token — Ctrl-C cancels it, the session stops at the
    // next turn boundary.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let console = console::Console::new(config, shutdown.clone());

    match args.question {
        Some(question) => {
            let outcome = console.run_question(&question, args.context).await?;
            match &outcome.answer {
                Some(answer) => println!("{answer}\n"),
                None => println!("no conclusive answer after {} turn(s)\n", outcome.turns),
            }
            println!("{}", outcome.final_summary);
            info!(
                turns = outcome.turns,
                cost_usd = outcome.total_cost_usd,
                "session complete"
            );
        }
        None => {
            console.run().await?;
        }
    }

    shutdown.cancel();
    Ok(())
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<PathBuf>,
    question: Option<String>,
    context: Vec<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut question = None;
    let mut context = Vec::new();

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: litrev [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -q, --question <TEXT>      Run one research session and exit");
                println!("  -c, --context <TEXT>       Context line for --question (repeatable)");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-q" | "--question" => {
                if let Some(q) = iter.next() {
                    question = Some(q);
                } else {
                    eprintln!("error: -q/--question requires a text argument");
                    std::process::exit(1);
                }
            }
            "-c" | "--context" => {
                if let Some(c) = iter.next() {
                    context.push(c);
                } else {
                    eprintln!("error: -c/--context requires a text argument");
                    std::process::exit(1);
                }
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(Path::new(&path).to_path_buf());
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // Each -v raises verbosity one tier from the config default:
    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug
    //   -vvvv+  → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path, question, context }
}
