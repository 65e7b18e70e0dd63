//! Outbox CLI - Command line host for the offline queue.
//!
//! Sends requests through the offline-aware client, inspects and edits the
//! persisted queue, and runs background sync until interrupted.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use outbox_app::{
    status_reason, Dispatch, Form, ItemId, Method, Outbox, OutboxConfig, Payload, Request,
    SyncOutcome,
};

#[derive(Parser)]
#[command(name = "outbox")]
#[command(about = "Outbox - Offline request queue and sync")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: platform config directory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the origin and show pending work.
    Status,

    /// Inspect or edit the queue.
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Send a request, queuing it if the origin is unreachable.
    Send {
        /// HTTP method.
        method: String,

        /// URL or origin-relative path.
        url: String,

        /// Header as `name:value` (repeatable).
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body.
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Submit a form that may be queued while offline.
    Submit {
        /// Form action URL or origin-relative path.
        url: String,

        /// Field as `name=value` (repeatable).
        #[arg(short, long = "field")]
        fields: Vec<String>,

        /// Form method.
        #[arg(short, long, default_value = "POST")]
        method: String,
    },

    /// Replay the queue now.
    Sync,

    /// Keep syncing in the background until interrupted.
    Run,

    /// Show or create the configuration file.
    Config {
        /// Write the effective configuration to the config path.
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// List queued items in replay order.
    List {
        /// Print raw JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove one item.
    Remove {
        /// Item id.
        id: String,
    },

    /// Drop every queued item.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => OutboxConfig::default_path().context("No platform config directory")?,
    };
    let config = OutboxConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match cli.command {
        Commands::Config { init } => cmd_config(&config, &config_path, init),
        Commands::Status => cmd_status(&open(config).await?).await,
        Commands::Queue { command } => {
            let outbox = open(config).await?;
            match command {
                QueueCommands::List { json } => cmd_queue_list(&outbox, json).await,
                QueueCommands::Remove { id } => cmd_queue_remove(&outbox, &id).await,
                QueueCommands::Clear => cmd_queue_clear(&outbox).await,
            }
        }
        Commands::Send {
            method,
            url,
            headers,
            data,
        } => cmd_send(&open(config).await?, &method, &url, &headers, data).await,
        Commands::Submit {
            url,
            fields,
            method,
        } => cmd_submit(&open(config).await?, &url, &fields, &method).await,
        Commands::Sync => cmd_sync(&open(config).await?).await,
        Commands::Run => cmd_run(&open(config).await?).await,
    }
}

async fn open(config: OutboxConfig) -> Result<Outbox> {
    Outbox::open(config).await.context("Failed to open outbox")
}

/// Show the effective configuration, optionally writing it out.
fn cmd_config(config: &OutboxConfig, path: &Path, init: bool) -> Result<()> {
    if init {
        config.save(path).context("Failed to write config")?;
        println!("Configuration written to {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Probe and report.
async fn cmd_status(outbox: &Outbox) -> Result<()> {
    let state = outbox.monitor().check_connection().await;
    let pending = outbox.store().size().await;

    println!("Origin: {}", outbox.config().origin);
    println!("  State: {}", state);
    if let Some((at, outcome)) = outbox.monitor().last_probe() {
        println!("  Last probe: {:?} at {}", outcome, at.to_rfc3339());
    }
    println!("  Pending: {}", pending);
    println!("  Queue: {}", outbox.store().backend_name());

    Ok(())
}

/// List queued items.
async fn cmd_queue_list(outbox: &Outbox, json: bool) -> Result<()> {
    let items = outbox.store().all().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    let now = chrono::Utc::now();
    println!("{} queued item(s):", items.len());
    for item in items {
        println!("  {} - {}s old", item, item.age(now).num_seconds());
        if let Payload::FormSubmission { fields } = &item.payload {
            for (name, value) in fields {
                println!("      {} = {}", name, value);
            }
        }
    }

    Ok(())
}

/// Remove one item.
async fn cmd_queue_remove(outbox: &Outbox, id: &str) -> Result<()> {
    let id: ItemId = id.parse().context("Invalid item id")?;

    if outbox
        .store()
        .remove(id)
        .await
        .context("Failed to remove item")?
    {
        println!("Removed item {}", id);
    } else {
        println!("No item {} in the queue", id);
    }

    Ok(())
}

/// Drop everything.
async fn cmd_queue_clear(outbox: &Outbox) -> Result<()> {
    let count = outbox.store().size().await;
    outbox.store().clear().await.context("Failed to clear queue")?;
    println!("Cleared {} item(s)", count);
    Ok(())
}

/// Send a request through the offline client.
async fn cmd_send(
    outbox: &Outbox,
    method: &str,
    url: &str,
    headers: &[String],
    data: Option<String>,
) -> Result<()> {
    let method: Method = method.parse().context("Invalid method")?;
    let url = outbox.config().resolve(url)?;

    let mut request = Request::new(method, url);
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("Header '{}' is not name:value", header))?;
        request = request.header(name.trim(), value.trim());
    }
    if let Some(data) = data {
        request = request.body(data);
    }

    outbox.monitor().check_connection().await;
    let dispatch = outbox
        .client()
        .dispatch(request)
        .await
        .context("Request failed")?;
    print_dispatch(dispatch);

    Ok(())
}

/// Submit a form.
async fn cmd_submit(outbox: &Outbox, url: &str, fields: &[String], method: &str) -> Result<()> {
    let method: Method = method.parse().context("Invalid method")?;
    let action = outbox.config().resolve(url)?;

    let mut form = Form::new(action).method(method).offline(true);
    for field in fields {
        let (name, value) = field
            .split_once('=')
            .with_context(|| format!("Field '{}' is not name=value", field))?;
        form = form.field(name, value);
    }

    outbox.monitor().check_connection().await;
    let dispatch = outbox
        .client()
        .submit_form(&form)
        .await
        .context("Form submission failed")?;
    print_dispatch(dispatch);

    Ok(())
}

fn print_dispatch(dispatch: Dispatch) {
    match dispatch {
        Dispatch::Delivered(response) => {
            println!("{} {}", response.status, status_reason(response.status));
            let text = response.text();
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        Dispatch::Queued { item, durability } => {
            if durability.is_persisted() {
                println!("Queued as item {}", item.id);
            } else {
                println!("Queued as item {} (in memory only, not saved)", item.id);
            }
        }
    }
}

/// Manual retry.
async fn cmd_sync(outbox: &Outbox) -> Result<()> {
    let state = outbox.monitor().check_connection().await;
    info!("Origin is {}", state);

    match outbox.engine().sync().await {
        SyncOutcome::Completed(report) => {
            println!("{}", report);
            for failure in &report.failures {
                println!("  #{} {}: {}", failure.id, failure.url, failure.reason);
            }
        }
        SyncOutcome::Skipped => println!("A sync pass is already running"),
    }

    Ok(())
}

/// Run background sync until ctrl-c.
async fn cmd_run(outbox: &Outbox) -> Result<()> {
    let running = outbox.start().await;
    println!(
        "Syncing {} pending item(s) to {}. Press Ctrl+C to stop.",
        outbox.store().size().await,
        outbox.config().origin
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Stopping");
    running.shutdown().await;

    Ok(())
}
