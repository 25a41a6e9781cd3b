//! oppsync: command-line front end for the opportunity sync engine.
//!
//! `watch` keeps a session running (both pollers, highlight tracking) and
//! serves the read-only observer API; the other commands are one-shot calls
//! against the sorter backend.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use opportunity_sync::metrics::Metrics;
use opportunity_sync::{
    api, ConsultationId, Decision, FeedbackOutcome, HttpBackend, Partition, Session,
    SessionConfig, SyncConfig, SyncEvent,
};

#[derive(Parser, Debug)]
#[command(name = "oppsync")]
#[command(
    about = "Track filtered/rejected procurement opportunities and send classification feedback"
)]
#[command(version)]
struct Cli {
    /// Config file (TOML or JSON)
    #[arg(short, long, env = "OPPSYNC_CONFIG_PATH", global = true)]
    config: Option<PathBuf>,

    /// Override the backend base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll both partitions, log new records, serve the observer API
    Watch {
        /// Listen address for the observer API (defaults to config listen_addr)
        #[arg(long)]
        listen: Option<SocketAddr>,
        /// Also expose /metrics
        #[arg(long)]
        metrics: bool,
    },
    /// Fetch one partition once and print it
    Show {
        partition: Partition,
        #[arg(long)]
        json: bool,
    },
    /// Keyword list management
    Keywords {
        #[command(subcommand)]
        action: KeywordCmd,
    },
    /// Ask the server to re-run classification
    Refilter,
    /// Send a keep/reject decision for one consultation
    Feedback {
        consultation_id: String,
        decision: Decision,
    },
}

#[derive(Subcommand, Debug)]
enum KeywordCmd {
    List,
    Add { text: String },
    Rm { id: i64 },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "opportunity_sync=info,oppsync=info,sync=info,feedback=info,keywords=info,warn",
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn load_config(cli: &Cli) -> Result<SyncConfig> {
    let mut cfg = match &cli.config {
        Some(path) => SyncConfig::load_from(path)?.with_env_overrides()?,
        None => SyncConfig::load_default()?,
    };
    if let Some(url) = &cli.base_url {
        cfg.base_url = url.trim_end_matches('/').to_string();
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    let backend = Arc::new(HttpBackend::from_config(&cfg).context("building HTTP client")?);
    let session = Arc::new(Session::connect(backend, SessionConfig::from(&cfg)).await);

    match cli.command {
        Command::Watch { listen, metrics } => watch(session, &cfg, listen, metrics).await,
        Command::Show { partition, json } => show(&session, partition, json).await,
        Command::Keywords { action } => keywords(&session, action).await,
        Command::Refilter => {
            session.refilter().await?;
            println!("refilter accepted");
            Ok(())
        }
        Command::Feedback {
            consultation_id,
            decision,
        } => feedback(&session, ConsultationId::new(consultation_id), decision).await,
    }
}

async fn watch(
    session: Arc<Session>,
    cfg: &SyncConfig,
    listen: Option<SocketAddr>,
    with_metrics: bool,
) -> Result<()> {
    let addr: SocketAddr = match listen {
        Some(a) => a,
        None => cfg
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen_addr '{}'", cfg.listen_addr))?,
    };

    let mut app = api::router(session.clone());
    if with_metrics {
        app = app.merge(Metrics::init()?.router());
    }

    let mut events = session.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::SnapshotApplied {
                    partition,
                    new_ids,
                    banner,
                    ..
                }) if !new_ids.is_empty() => {
                    let ids: Vec<String> = new_ids.iter().map(|i| i.to_string()).collect();
                    info!(%partition, banner, ids = %ids.join(","), "new opportunities");
                }
                Ok(SyncEvent::Reverted { partition, id }) => {
                    info!(%partition, %id, "feedback not applied by server");
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "event log lagging");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    session.start().await;
    info!(%addr, user = ?session.principal().username, "watching partitions");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("observer API server error")?;

    session.stop();
    info!("session stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
}

async fn show(session: &Session, partition: Partition, json: bool) -> Result<()> {
    session.refresh(partition).await?;
    let snap = session.snapshot(partition);
    if json {
        println!("{}", serde_json::to_string_pretty(&snap)?);
        return Ok(());
    }
    for row in &snap.records {
        let r = &row.record;
        println!(
            "{:<14} {:<12} {:<30} {}",
            r.consultation_id,
            r.publication_date.as_deref().unwrap_or("-"),
            r.client,
            r.title
        );
    }
    println!("{} records in {}", snap.records.len(), partition);
    Ok(())
}

async fn keywords(session: &Session, action: KeywordCmd) -> Result<()> {
    match action {
        KeywordCmd::List => {
            for k in session.list_keywords().await? {
                println!("{:>5}  {}", k.id, k.text);
            }
        }
        KeywordCmd::Add { text } => {
            session.add_keyword(&text).await?;
            println!("added '{}'", text.trim());
        }
        KeywordCmd::Rm { id } => {
            session.remove_keyword(id).await?;
            println!("removed keyword {id}");
        }
    }
    Ok(())
}

async fn feedback(session: &Session, id: ConsultationId, decision: Decision) -> Result<()> {
    // The record has to be in a local snapshot before it can be submitted.
    for p in Partition::ALL {
        if let Err(e) = session.refresh(p).await {
            tracing::warn!(partition = %p, error = %e, "could not load partition");
        }
    }
    match session.submit_feedback_for(&id, decision).await? {
        FeedbackOutcome::Sent { from } => {
            println!("{decision} sent for {id} (was in {from})");
            Ok(())
        }
        FeedbackOutcome::AlreadyRemoved => bail!("consultation {id} is not in either partition"),
    }
}
