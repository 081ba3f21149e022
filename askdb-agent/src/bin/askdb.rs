//! askdb -- interactive natural-language database assistant.
//!
//! Resolves the configured backends once at startup, then loops:
//! question in, agent turn with database tools, answer out. Exits 0 on a
//! normal quit, 1 when no backend is reachable or initialization fails.

use std::io::{self, BufRead, Write};

use clap::Parser;

use askdb_agent::llm_client::LlmClient;
use askdb_agent::prompt;
use askdb_agent::tools::ToolContext;
use askdb_agent::turn;
use askdb_core::db::DbKind;
use askdb_core::settings::Settings;
use askdb_engine::connect;

// ── ANSI colors ──────────────────────────────────────────────────
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "askdb", about = "Ask questions of your SQL or MongoDB data")]
struct Cli {
    /// Backend to start on ("mongo" or "sql"); defaults to mongo when available
    #[arg(long)]
    database: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();
    let rt = connect::runtime();

    let relational = connect::resolve_relational(&settings, &rt);
    let document = connect::resolve_document(&settings, &rt);

    if relational.is_none() && document.is_none() {
        eprintln!(
            "{RED}{BOLD}Error:{RESET} No database connections available. Please check your configuration."
        );
        std::process::exit(1);
    }

    let Some(api_key) = settings.groq_api_key.clone() else {
        eprintln!("{RED}{BOLD}Error:{RESET} GROQ_API_KEY not set in the environment or .env");
        std::process::exit(1);
    };
    let llm = LlmClient::new(&settings.llm_base_url, &settings.llm_model, &api_key);

    let mut active = prompt::default_backend(document.is_some());
    if let Some(requested) = cli.database.as_deref() {
        active = match requested.to_lowercase().as_str() {
            "mongo" | "mongodb" if document.is_some() => DbKind::Document,
            "sql" | "relational" if relational.is_some() => DbKind::Relational,
            other => {
                eprintln!(
                    "{YELLOW}Warning:{RESET} Requested database '{other}' is not available; using {active}."
                );
                active
            }
        };
    }

    let mut ctx = ToolContext::new(&rt, relational.as_ref(), document.as_ref(), active);

    eprintln!("{CYAN}{BOLD}askdb{RESET} -- database assistant. Type 'exit' or 'quit' to end.");
    eprintln!("{CYAN}[status]{RESET} Current database type: {}", ctx.active);
    eprintln!(
        "{CYAN}[status]{RESET} MongoDB available: {}. SQL available: {}.",
        document.is_some(),
        relational.is_some()
    );

    let stdin = io::stdin();
    loop {
        eprint!("{GREEN}askdb>{RESET} ");
        let _ = io::stderr().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{RED}Error:{RESET} failed to read input: {e}");
                break;
            }
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "exit" | "quit") {
            eprintln!("Exiting...");
            break;
        }

        match turn::run_question(&rt, &llm, &mut ctx, question) {
            Ok(answer) => {
                println!("{answer}");
                println!();
            }
            Err(e) => eprintln!("{RED}Error:{RESET} {e}"),
        }
    }
}
