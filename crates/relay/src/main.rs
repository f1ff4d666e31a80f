//! Interactive client that answers queries with a model and a tool server.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::PathBuf;
use std::pin::pin;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use relay::config::AppConfig;
use relay::mcp::McpToolHost;
use relay_core::artifact::{DEFAULT_REPORT_DIR, DEFAULT_TRANSCRIPT_DIR};
use relay_core::{FailurePolicy, Pipeline, PipelineBuilder, QueryOutcome};
use relay_openai_model::OpenAIProvider;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::time::sleep;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const BAR_CHAR: &str = "▎";
const QUIT_WORDS: [&str; 2] = ["退出", "quit"];

/// Answers queries by planning tool calls with a model.
#[derive(Debug, Parser)]
#[command(name = "relay", version)]
struct Cli {
    /// Tool server script, `.py` or `.js`.
    #[arg(long, default_value = "server.py")]
    server: PathBuf,

    /// Directory the sentiment reports are written to.
    #[arg(long, default_value = DEFAULT_REPORT_DIR)]
    report_dir: PathBuf,

    /// Directory the transcripts are written to.
    #[arg(long, default_value = DEFAULT_TRANSCRIPT_DIR)]
    transcript_dir: PathBuf,

    /// Answer this query and exit instead of prompting.
    #[arg(short, long)]
    query: Option<String>,

    /// Fail the query when any tool call fails.
    #[arg(long)]
    abort_on_tool_failure: bool,

    /// Log file, always written at info level.
    #[arg(long, default_value = "client.log")]
    log_file: PathBuf,

    /// Increase stderr logging (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _guard = init_logging(&cli);

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    info!("using model {}", config.model());

    let provider = match OpenAIProvider::new(config.openai_config()) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("failed to create the model client: {err}");
            return ExitCode::FAILURE;
        }
    };
    let tool_host = match McpToolHost::launch(&cli.server).await {
        Ok(tool_host) => tool_host,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let failure_policy = if cli.abort_on_tool_failure {
        FailurePolicy::Abort
    } else {
        FailurePolicy::Continue
    };
    let pipeline = PipelineBuilder::new(provider, Arc::new(tool_host))
        .with_report_dir(&cli.report_dir)
        .with_transcript_dir(&cli.transcript_dir)
        .with_failure_policy(failure_policy)
        .build();

    let tools = match pipeline.list_tools().await {
        Ok(tools) => tools,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let names: Vec<_> = tools.iter().map(|tool| tool.name.as_str()).collect();
    println!(
        "Connected to the tool server. Available tools: [{}]",
        names.join(", ")
    );

    if let Some(query) = &cli.query {
        return match run_query(&pipeline, query).await {
            Some(_) => ExitCode::SUCCESS,
            None => ExitCode::FAILURE,
        };
    }

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line(&mut lines).await else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if QUIT_WORDS.iter().any(|word| query.eq_ignore_ascii_case(word)) {
            break;
        }

        run_query(&pipeline, query).await;
        println!();
    }

    ExitCode::SUCCESS
}

/// Logs to stderr per `RUST_LOG` or `-v`, and to the log file at info.
fn init_logging(cli: &Cli) -> WorkerGuard {
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });

    let dir = cli
        .log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), |dir| dir.to_owned());
    let file_name = cli
        .log_file
        .file_name()
        .map_or_else(|| "client.log".into(), |name| name.to_owned());
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(stderr_filter),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(LevelFilter::INFO),
        )
        .init();
    guard
}

/// Runs one query behind a spinner and prints the outcome.
async fn run_query(pipeline: &Pipeline, query: &str) -> Option<QueryOutcome> {
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(
        ProgressStyle::with_template("{spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    progress_bar.set_message("🤔 Thinking...");

    let mut processing = pin!(pipeline.process_query(query));
    let result = loop {
        progress_bar.inc(1);
        select! {
            result = &mut processing => break result,
            _ = sleep(Duration::from_millis(100)) => {}
        }
    };
    progress_bar.finish_and_clear();

    match result {
        Ok(outcome) => {
            println!("{}🤖 {}", BAR_CHAR.bright_cyan(), outcome.answer.bright_white());
            println!(
                "{}transcript saved to {}",
                BAR_CHAR.bright_black(),
                outcome.artifacts.transcript_path.display()
            );
            Some(outcome)
        }
        Err(err) => {
            error!("query failed: {err}");
            println!("{}❌ {err}", BAR_CHAR.bright_red());
            None
        }
    }
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Option<String> {
    match lines.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {err}");
            None
        }
    }
}
