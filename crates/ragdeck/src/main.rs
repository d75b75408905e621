//! Terminal front end of the ragdeck profiles.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use ragdeck::core::{Answer, AnswerEvent};
use ragdeck::profile::{
    DEFAULT_FINANCE_MODEL, DEFAULT_RAG_MODEL, DEFAULT_TOP_K, GEMINI_API_KEY_VAR,
};
use ragdeck::{FinanceConfig, Profile, RagConfig, Session, bootstrap};
use ragdeck_knowledge::SourceStatus;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const BAR_CHAR: &str = "▎";

const HELP: &str = "\
Commands:
  /add <url>   add a knowledge source (URL or file path)
  /sources     list the knowledge sources and their status
  /help        show this message
  /quit        exit
Anything else is sent to the agent as a question.";

#[derive(Parser)]
#[command(version, about = "Chat with a finance analyst or your own documents")]
struct Cli {
    #[command(subcommand)]
    profile: ProfileCommand,
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Market analysis with Gemini, web search and market data.
    Finance(FinanceArgs),
    /// Questions over your own documents with a local Ollama model.
    Rag(RagArgs),
}

#[derive(Args)]
struct FinanceArgs {
    /// Chat model.
    #[arg(long, default_value = DEFAULT_FINANCE_MODEL)]
    model: String,
    /// OpenAI-compatible endpoint to use instead of Gemini's.
    #[arg(long)]
    base_url: Option<String>,
}

#[derive(Args)]
struct RagArgs {
    /// Chat model.
    #[arg(long, default_value = DEFAULT_RAG_MODEL)]
    model: String,
    /// OpenAI-compatible chat endpoint, defaults to `/v1` of the Ollama host.
    #[arg(long)]
    base_url: Option<String>,
    /// Embedding model.
    #[arg(long, default_value = ragdeck_ollama::DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,
    /// Ollama host.
    #[arg(
        long,
        env = "OLLAMA_HOST",
        default_value = ragdeck_ollama::DEFAULT_HOST
    )]
    ollama_host: String,
    /// Knowledge source to ingest at startup, can be repeated.
    #[arg(long = "source", value_name = "URL")]
    sources: Vec<String>,
    /// Passages returned by one knowledge search.
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,
}

impl ProfileCommand {
    fn into_profile(self) -> Profile {
        match self {
            ProfileCommand::Finance(args) => Profile::Finance(FinanceConfig {
                api_key: env::var(GEMINI_API_KEY_VAR).ok(),
                model: args.model,
                base_url: args.base_url,
                ..Default::default()
            }),
            ProfileCommand::Rag(args) => Profile::Rag(RagConfig {
                model: args.model,
                base_url: args.base_url,
                ollama_host: args.ollama_host,
                embedding_model: args.embedding_model,
                sources: args.sources,
                top_k: args.top_k,
            }),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Add(&'a str),
    Sources,
    Help,
    Quit,
    Ask(&'a str),
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Command::Ask(line);
    };
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .unwrap_or((command, ""));
    match name {
        "add" => Command::Add(rest.trim()),
        "sources" => Command::Sources,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(name),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // A missing `.env` is fine, the process environment is used as is.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut session = match bootstrap(cli.profile.into_profile()) {
        Ok(session) => session,
        Err(err) => {
            println!("{err}");
            return ExitCode::FAILURE;
        }
    };

    run_repl(&mut session).await;
    ExitCode::SUCCESS
}

async fn run_repl(session: &mut Session) {
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    println!(
        "{} {}",
        session.agent().name().bright_white().bold(),
        "(type /help for commands)".dimmed()
    );

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line(&mut lines).await else {
            break;
        };

        match parse_command(&line) {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Sources => print_sources(session),
            Command::Add(identifier) => match session.add_source(identifier) {
                Ok(source) => println!(
                    "{} added {}",
                    BAR_CHAR.bright_green(),
                    source.identifier().bright_white()
                ),
                Err(err) => print_error(&err),
            },
            Command::Unknown(name) => {
                println!("Unknown command /{name}, type /help for commands")
            }
            Command::Ask(query) => match session.ask(query) {
                Ok(answer) => print_answer(answer, &progress_style).await,
                Err(err) => print_error(&err),
            },
        }
    }
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Option<String> {
    match lines.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

fn print_sources(session: &Session) {
    if !session.has_knowledge() {
        println!("This agent has no knowledge base.");
        return;
    }
    if session.sources().is_empty() {
        println!("No sources yet, add one with /add <url>.");
        return;
    }
    for (i, source) in session.sources().iter().enumerate() {
        let status = match source.status() {
            SourceStatus::Pending => "pending".yellow().to_string(),
            SourceStatus::Ingested => "ingested".green().to_string(),
        };
        println!("{:>3}. {} [{status}]", i + 1, source.identifier());
    }
}

fn print_error(err: &dyn std::fmt::Display) {
    println!("{} {err}", "Error:".bright_red());
}

async fn print_answer(mut answer: Answer, progress_style: &ProgressStyle) {
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(progress_style.clone());
    progress_bar.set_message("🤔 Thinking...");

    let mut started = false;
    let mut in_text = false;
    loop {
        // Keep the spinner going until the first event arrives.
        let item = if started {
            answer.next().await
        } else {
            select! {
                item = answer.next() => item,
                _ = sleep(Duration::from_millis(100)) => {
                    progress_bar.inc(1);
                    continue;
                }
            }
        };

        if !started {
            progress_bar.finish_and_clear();
            started = true;
        }

        match item {
            Some(Ok(AnswerEvent::Text(fragment))) => {
                if !in_text {
                    print!("{}🤖 ", BAR_CHAR.bright_cyan());
                    in_text = true;
                }
                print!("{}", fragment.bright_white());
                std::io::stdout().flush().ok();
            }
            Some(Ok(AnswerEvent::ToolCall(call))) => {
                if in_text {
                    println!();
                    in_text = false;
                }
                println!("{}", format!("{BAR_CHAR} running {call}").dimmed());
            }
            Some(Err(err)) => {
                if in_text {
                    println!();
                }
                print_error(&err);
                return;
            }
            None => {
                println!();
                return;
            }
        }
    }
}
