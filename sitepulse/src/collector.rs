//! sitepulse-collector - CLI front end for the sitepulse collector
//!
//! This tool provides commands for:
//! - Checking collector configuration and consent
//! - Granting or revoking consent
//! - Tracking page views, interactions and custom events
//! - Querying the ingestion endpoint
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/sitepulse/config.toml (~/.config/sitepulse/config.toml)
//! - Consent: $XDG_STATE_HOME/sitepulse/consent.json (~/.local/state/sitepulse/consent.json)

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sitepulse_core::collector::{
    Collector, ConsentStore, EventDraft, FileConsentStore, HttpTransport,
};
use sitepulse_core::Config;

#[derive(Parser)]
#[command(name = "sitepulse-collector")]
#[command(about = "Track events and query a sitepulse ingestion server")]
#[command(version)]
struct Args {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Ingestion server base URL (overrides collector.server_url)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show collector configuration and consent
    Status,

    /// Grant or revoke consent for tracking
    Consent {
        #[arg(value_enum)]
        state: ConsentState,
    },

    /// Track a page view and deliver it
    Page {
        /// Page path (e.g. /pricing)
        path: String,

        /// Page title
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Track an interaction and deliver it
    Interaction {
        category: String,
        action: String,

        #[arg(short, long)]
        label: Option<String>,

        #[arg(long)]
        value: Option<f64>,
    },

    /// Track a custom event and deliver it
    Custom {
        name: String,

        /// Properties as a JSON object
        #[arg(short, long)]
        properties: Option<String>,
    },

    /// Show aggregate counters, or the batches of one session
    Summary {
        #[arg(short, long)]
        session: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ConsentState {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(server) = args.server {
        config.collector.server_url = Some(server);
    }

    // Keep the guard alive for the whole command
    let _log_guard = if args.verbose {
        Some(
            sitepulse_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    let consent = FileConsentStore::default_location();

    match args.command {
        Command::Status => cmd_status(&config, &consent),
        Command::Consent { state } => cmd_consent(&consent, matches!(state, ConsentState::On)),
        Command::Page { path, title } => {
            cmd_track(&config, consent, EventDraft::page_view(&path, title.as_deref())).await
        }
        Command::Interaction {
            category,
            action,
            label,
            value,
        } => {
            let draft = EventDraft::interaction(&category, &action, label.as_deref(), value);
            cmd_track(&config, consent, draft).await
        }
        Command::Custom { name, properties } => {
            let properties = properties.as_deref().map(parse_properties).transpose()?;
            cmd_track(&config, consent, EventDraft::custom(&name, properties)).await
        }
        Command::Summary { session } => cmd_summary(&config, session.as_deref()).await,
    }
}

fn parse_properties(raw: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str(raw).context("properties must be valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("properties must be a JSON object"),
    }
}

fn cmd_status(config: &Config, consent: &FileConsentStore) -> Result<()> {
    println!("sitepulse Collector Configuration");
    println!("=================================");
    println!();

    let collector = &config.collector;
    let stored = consent.load().context("failed to read consent")?;

    match stored {
        Some(true) => println!("Consent:         granted"),
        Some(false) => println!("Consent:         revoked"),
        None => println!(
            "Consent:         not set (default: {})",
            if collector.enabled { "enabled" } else { "disabled" }
        ),
    }
    println!(
        "Server URL:      {}",
        collector.server_url.as_deref().unwrap_or("<not set>")
    );
    println!("Batch Size:      {}", collector.batch_size);
    println!("Flush Interval:  {}s", collector.flush_interval_secs);
    println!("Timeout:         {}s", collector.timeout_secs);
    println!("Max Buffered:    {}", collector.max_buffered_events);
    println!("Consent File:    {}", consent.path().display());

    println!();
    let enabled = stored.unwrap_or(collector.enabled);
    if enabled && collector.server_url.is_some() {
        println!("Status: Ready to track");
    } else if !enabled {
        println!("Status: Tracking disabled (run 'consent on' to enable)");
    } else {
        println!("Status: Not ready (collector.server_url is not set)");
    }

    Ok(())
}

fn cmd_consent(consent: &FileConsentStore, enabled: bool) -> Result<()> {
    consent
        .save(enabled)
        .with_context(|| format!("failed to write {}", consent.path().display()))?;

    if enabled {
        println!("Consent granted. Events will be tracked.");
    } else {
        println!("Consent revoked. Events will not be tracked.");
    }
    Ok(())
}

async fn cmd_track(config: &Config, consent: FileConsentStore, draft: EventDraft) -> Result<()> {
    if !config.collector.enabled && consent.load()? != Some(true) {
        println!("Tracking is disabled. Run 'consent on' to enable.");
        return Ok(());
    }
    if config.collector.server_url.is_none() {
        bail!("no server configured: set collector.server_url or pass --server");
    }

    let transport = Arc::new(HttpTransport::new(&config.collector)?);
    let collector = Collector::create(
        &config.collector,
        config.client.context(),
        transport,
        Arc::new(consent),
    )
    .context("failed to start collector")?;

    if !collector.is_enabled() {
        println!("Tracking is disabled. Run 'consent on' to enable.");
        collector.destroy().await;
        return Ok(());
    }

    collector.track(draft);
    let delivered = collector.flush_and_wait().await;
    let session_id = collector.session_id().to_string();
    collector.destroy().await;

    let delivered = delivered.context("failed to deliver batch")?;
    println!("Delivered {} event(s) for session {}", delivered, session_id);
    Ok(())
}

async fn cmd_summary(config: &Config, session: Option<&str>) -> Result<()> {
    if config.collector.server_url.is_none() {
        bail!("no server configured: set collector.server_url or pass --server");
    }
    let transport = HttpTransport::new(&config.collector)?;

    let rendered = match session {
        Some(session_id) => {
            let batches = transport
                .session_batches(session_id)
                .await
                .context("failed to fetch session batches")?;
            serde_json::to_string_pretty(&batches)?
        }
        None => {
            let summary = transport
                .summary()
                .await
                .context("failed to fetch summary")?;
            serde_json::to_string_pretty(&summary)?
        }
    };

    println!("{}", rendered);
    Ok(())
}
