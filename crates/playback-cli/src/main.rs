//! Terminal front end for the evaluation playback engine.
//!
//! # Usage
//!
//! ```bash
//! # Submit a comparison and follow it
//! playback submit --job "Frontend Engineer" \
//!     --candidate-a https://www.linkedin.com/in/jane-doe \
//!     --candidate-b https://www.linkedin.com/in/john-roe --watch
//!
//! # Follow an existing evaluation, one JSON snapshot per line
//! playback --json watch 67c37dcde83f769118fe9276
//!
//! # Offline demo with the bundled sample
//! playback demo --complete
//! ```

mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use playback::client::{EvaluationClient, HttpEvaluationClient, InMemoryEvaluationClient};
use playback::config::PlaybackConfig;
use playback::record::{EvaluationId, EvaluationRecord};
use playback::sample::{sample_evaluation, DEMO_ID_PREFIX, SAMPLE_EVALUATION_ID};
use playback::session::{Session, SessionOutcome, SessionReport};
use playback::tree::{ThoughtTreeBuilder, DEFAULT_TEXT_BUDGET};
use playback::SubmissionRequest;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (fields not set keep their defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Evaluation service base URL (overrides EVALUATION_API_URL and the config file)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Print snapshots as JSON lines instead of text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit two candidate profiles for comparison
    Submit {
        /// Job description the candidates are compared against
        #[arg(long)]
        job: String,
        /// Profile URL (or bare id) of candidate A
        #[arg(long)]
        candidate_a: String,
        /// Profile URL (or bare id) of candidate B
        #[arg(long)]
        candidate_b: String,
        /// Follow the created evaluation until it completes
        #[arg(long, default_value_t = false)]
        watch: bool,
    },
    /// Poll an evaluation and play it back
    Watch { id: String },
    /// Print the thought tree of a record stored as JSON
    Tree {
        file: PathBuf,
        /// Character budget for node labels
        #[arg(long, default_value_t = DEFAULT_TEXT_BUDGET)]
        budget: usize,
    },
    /// Play back the bundled sample without a service
    Demo {
        /// Start from the decided record, exercising fast-forward
        #[arg(long, default_value_t = false)]
        complete: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.api_url.as_deref())?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping session");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        Command::Submit {
            job,
            candidate_a,
            candidate_b,
            watch,
        } => {
            let request = SubmissionRequest::from_urls(&job, &candidate_a, &candidate_b)
                .context("Invalid submission")?;
            let client = Arc::new(http_client(&config)?);
            let id = client
                .submit(&request)
                .await
                .with_context(|| format!("Submitting to {}", client.base_url()))?;
            println!("{id}");
            if watch {
                run_session(client, id, config, cancel, cli.json).await?;
            }
        }
        Command::Watch { id } => {
            let client = Arc::new(http_client(&config)?);
            run_session(client, EvaluationId::from(id), config, cancel, cli.json).await?;
        }
        Command::Tree { file, budget } => print_tree(&file, budget, cli.json)?,
        Command::Demo { complete } => {
            let client = Arc::new(InMemoryEvaluationClient::with_sample());
            let id = if complete {
                client.insert(SAMPLE_EVALUATION_ID, sample_evaluation());
                EvaluationId::from(SAMPLE_EVALUATION_ID)
            } else {
                EvaluationId::from(format!("{DEMO_ID_PREFIX}demo"))
            };
            run_session(client, id, config, cancel, cli.json).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>, api_url: Option<&str>) -> Result<PlaybackConfig> {
    let mut config = match path {
        Some(path) => PlaybackConfig::from_file(path)
            .with_context(|| format!("Loading config from {}", path.display()))?,
        None => PlaybackConfig::default(),
    };
    if let Some(url) = api_url {
        config = config.with_base_url(url);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn http_client(config: &PlaybackConfig) -> Result<HttpEvaluationClient> {
    HttpEvaluationClient::new(&config.api).context("Failed to create evaluation client")
}

/// Run a session, printing each snapshot as it is published.
async fn run_session<C>(
    client: Arc<C>,
    id: EvaluationId,
    config: PlaybackConfig,
    cancel: CancellationToken,
    json: bool,
) -> Result<()>
where
    C: EvaluationClient + ?Sized + 'static,
{
    let (session, mut rx) = Session::new(client, id.clone(), config);
    let session = session.with_cancellation(cancel);

    let printer = tokio::spawn(async move {
        let mut last_line = String::new();
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if json {
                match serde_json::to_string(&snapshot) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "Failed to encode snapshot"),
                }
                continue;
            }
            let line = render::status_line(&snapshot);
            if line != last_line {
                println!("{line}");
                last_line = line;
            }
        }
    });

    let report = session.run().await;
    printer.await.context("Snapshot printer panicked")?;
    print_report(&report, json)?;

    match report.outcome {
        SessionOutcome::Completed => Ok(()),
        SessionOutcome::Cancelled => {
            info!(evaluation_id = %id, "Session cancelled");
            Ok(())
        }
        outcome => bail!("Evaluation {id} ended without a result: {outcome:?}"),
    }
}

fn print_report(report: &SessionReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string(report).context("Encoding session report")?
        );
        return Ok(());
    }

    let playback = &report.snapshot.playback;
    if !playback.visible_nodes.is_empty() {
        println!();
        println!("{}", render::tree_view(&playback.visible_nodes));
    }
    if let Some(winner) = playback.winner {
        println!();
        println!("{}", render::vote_bar(playback.votes, 30));
        println!("{}", render::final_line(winner));
    }
    Ok(())
}

fn print_tree(file: &Path, budget: usize, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Reading {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing {} as JSON", file.display()))?;
    let record = EvaluationRecord::from_json(value).context("Not an evaluation record")?;
    let nodes = ThoughtTreeBuilder::new().with_text_budget(budget).build(&record);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&nodes).context("Encoding tree")?
        );
    } else {
        println!("{}", render::tree_view(&nodes));
    }
    Ok(())
}
