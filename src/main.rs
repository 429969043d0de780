//! Command-line entry point: digest course files into study material.
//!
//! Progress and diagnostics go to stderr through `tracing`; the JSON result goes to stdout or
//! to the file named by `--output`. Ctrl-C cancels the run at the next safe point.
use anyhow::{Context, Result};
use clap::Parser;
use coursedigest::{
    config::{self, Language},
    document, logging,
    processing::{ChatTurn, DigestService, RunResult},
};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "coursedigest",
    version,
    about = "Turn course material into a summary, revision notes, flashcards, and a quiz"
)]
struct Cli {
    /// PDF, text, or Markdown files and directories, processed in the order given.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Output language, `en` or `zh`; overrides DIGEST_LANGUAGE.
    #[arg(long, value_parser = parse_language)]
    language: Option<Language>,
    /// Follow-up question for the tutor; repeat to ask several in sequence.
    #[arg(long = "ask", value_name = "QUESTION")]
    questions: Vec<String>,
    /// Write the JSON result to this file instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Pretty-print the JSON result.
    #[arg(long)]
    pretty: bool,
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short)]
    verbose: bool,
    /// Append logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Do not write a log file.
    #[arg(long, conflicts_with = "log_file")]
    no_log_file: bool,
}

#[derive(Serialize)]
struct DigestOutput {
    #[serde(flatten)]
    result: RunResult,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tutor: Vec<ChatTurn>,
    /// Why the tutor stopped before answering every `--ask` question.
    #[serde(skip_serializing_if = "Option::is_none")]
    tutor_error: Option<String>,
}

fn parse_language(value: &str) -> Result<Language, String> {
    value
        .parse()
        .map_err(|_| format!("unknown language `{value}` (expected `en` or `zh`)"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&logging::LogOptions {
        verbose: cli.verbose,
        log_file: cli.log_file.clone(),
        disable_file: cli.no_log_file,
    });
    let config = config::init_config().context("failed to load configuration")?;

    let paths = cli.paths.clone();
    let text = tokio::task::spawn_blocking(move || document::load_documents(&paths))
        .await
        .context("document extraction task panicked")?
        .context("failed to extract course material")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; cancelling run");
            on_interrupt.cancel();
        }
    });

    let mut service = DigestService::from_config(config)
        .context("failed to initialize generation client")?
        .with_cancellation(cancel);
    if let Some(language) = cli.language {
        service = service.with_language(language);
    }

    let progress = |percent: u8| tracing::info!(percent, "Progress");
    let result = service.run(&text, &progress).await.map_err(|error| {
        let stage = error.stage();
        anyhow::Error::new(error).context(format!("digest failed during {stage} stage"))
    })?;

    let (tutor, tutor_error) = service
        .tutor_session(&result.summary, &cli.questions)
        .await;

    for warning in &result.warnings {
        tracing::warn!(artifact = %warning.artifact, reason = %warning.reason, "Degraded artifact");
    }

    let output = DigestOutput {
        result,
        tutor,
        tutor_error: tutor_error.map(|error| error.to_string()),
    };
    let json = if cli.pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .context("failed to serialize result")?;

    match &cli.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Result written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").context("failed to write result to stdout")?;
        }
    }
    Ok(())
}
