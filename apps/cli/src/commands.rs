//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use nzbrelay_core::{
    Announcer, FileKeywords, JobOutcome, KeywordSource, Listener, Pipeline, Router,
};
use nzbrelay_fetch::{MetadataClient, Uploader, build_client};
use nzbrelay_grammar::{AnnouncementParser, RecentYears, normalize, verdict};
use nzbrelay_shared::{
    AppConfig, IrcServerConfig, expand_path, init_config, load_config, load_config_from,
    validate_config,
};
use nzbrelay_storage::{DedupStore, MemoryStore, Storage};
use tokio::sync::mpsc;
use tracing::info;

use crate::irc;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// nzbrelay: relay release announcements and fulfil them.
#[derive(Parser)]
#[command(
    name = "nzbrelay",
    version,
    about = "Watch IRC release announcements, fetch their artifacts and re-announce them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.nzbrelay/nzbrelay.toml).
    #[arg(long, global = true, env = "NZBRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Connect to IRC and relay announcements until interrupted.
    Run,

    /// Run one release through the pipeline and print the outcome.
    Process {
        /// Release name to look up.
        release: String,

        /// Category label used for routing.
        #[arg(short, long, default_value = "XXX: HD-CLIPS")]
        category: String,

        /// Use an in-memory dedup store instead of the database.
        #[arg(long)]
        memory: bool,
    },

    /// Show how a raw announcement line is normalized, parsed and classified.
    Parse {
        /// Raw line, formatting codes allowed.
        text: String,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "nzbrelay=info",
        1 => "nzbrelay=debug",
        _ => "nzbrelay=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run => cmd_run(config_path).await,
        Command::Process {
            release,
            category,
            memory,
        } => cmd_process(config_path, &release, &category, memory).await,
        Command::Parse { text } => cmd_parse(config_path, &text).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    validate_config(&config)?;
    Ok(config)
}

/// Assemble the pipeline from config plus the given store and announcer.
fn build_pipeline(
    config: &AppConfig,
    store: Arc<dyn DedupStore>,
    announcer: Arc<dyn Announcer>,
) -> Result<Pipeline> {
    let client = build_client(None)?;
    let metadata = MetadataClient::from_config(client.clone(), &config.indexer)?;

    let mut pipeline = Pipeline::new(
        client.clone(),
        metadata,
        Router::new(&config.channels),
        store,
        announcer,
        expand_path(&config.paths.work_dir),
        expand_path(&config.paths.output_dir),
    );

    if config.upload.url.is_empty() {
        tracing::warn!("upload.url is not set, uploads will be reported as failed");
    } else {
        pipeline = pipeline.with_uploader(Uploader::from_config(client, &config.upload)?);
    }
    Ok(pipeline)
}

/// Channels a connection joins: its own list, or every destination channel.
fn join_list(server: &IrcServerConfig, config: &AppConfig) -> Vec<String> {
    if server.channels.is_empty() {
        config.channels.all()
    } else {
        server.channels.clone()
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;

    let store = Storage::open(&expand_path(&config.paths.database)).await?;

    let (inbound_tx, mut inbound_rx) = mpsc::channel(256);
    let (listen_sender, listen_conn) = irc::connection(
        "listener",
        config.listener.clone(),
        join_list(&config.listener, &config),
        Some(inbound_tx),
    );

    let mut announce_task = None;
    let announcer: Arc<dyn Announcer> = if config.has_separate_announcer() {
        let server = config.announcer();
        let (sender, conn) =
            irc::connection("announcer", server.clone(), join_list(server, &config), None);
        announce_task = Some(tokio::spawn(conn.run()));
        Arc::new(sender)
    } else {
        Arc::new(listen_sender)
    };

    let pipeline = build_pipeline(&config, Arc::new(store), announcer)?;
    pipeline.prepare().await?;

    let keywords: Arc<dyn KeywordSource> =
        Arc::new(FileKeywords::new(expand_path(&config.paths.keywords_file)));
    let listener = Listener::new(
        config.listener.watched_senders.clone(),
        AnnouncementParser::new(RecentYears::from(&config.grammar)),
        keywords,
        Arc::new(pipeline),
    );

    let mut listen_task = tokio::spawn(listen_conn.run());
    info!(
        host = %config.listener.host,
        separate_announcer = config.has_separate_announcer(),
        "relay started"
    );

    let result = loop {
        tokio::select! {
            Some(message) = inbound_rx.recv() => {
                // Runs are detached; failures are reported through the event sink.
                let _ = listener.handle(&message).await;
            }
            joined = &mut listen_task => {
                break match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(e) => Err(eyre!("listener connection task failed: {e}")),
                };
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break Ok(());
            }
        }
    };

    listen_task.abort();
    if let Some(task) = announce_task {
        task.abort();
    }
    result
}

/// Prints announcements instead of sending them.
struct StdoutAnnouncer;

#[async_trait]
impl Announcer for StdoutAnnouncer {
    async fn send(&self, channel: &str, text: &str) -> nzbrelay_shared::Result<()> {
        println!("  announce {channel}: {}", normalize(text));
        Ok(())
    }
}

async fn cmd_process(
    config_path: Option<&Path>,
    release: &str,
    category: &str,
    memory: bool,
) -> Result<()> {
    let config = resolve_config(config_path)?;

    let store: Arc<dyn DedupStore> = if memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(Storage::open(&expand_path(&config.paths.database)).await?)
    };

    let pipeline = build_pipeline(&config, store, Arc::new(StdoutAnnouncer))?;
    pipeline.prepare().await?;

    println!("Processing {release} [{category}]");
    match pipeline.run(release, category).await {
        JobOutcome::Completed(report) => {
            println!("  completed (job {})", report.job_id);
            if let Some(path) = &report.image_path {
                println!("  image:    {}", path.display());
            }
            if let Some(path) = &report.artifact_path {
                println!("  artifact: {}", path.display());
            }
            if let Some(name) = &report.final_name {
                println!("  final:    {name}");
            }
            println!(
                "  uploaded: {}  recorded: {}  duplicate: {}",
                report.uploaded, report.recorded, report.skip_upload
            );
            Ok(())
        }
        JobOutcome::Failed { stage, error } => Err(eyre!("failed at {stage:?}: {error}")),
    }
}

async fn cmd_parse(config_path: Option<&Path>, text: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let clean = normalize(text);
    println!("normalized: {clean}");

    let parser = AnnouncementParser::new(RecentYears::from(&config.grammar));
    let Some(parsed) = parser.parse(&clean) else {
        println!("no match");
        return Ok(());
    };
    println!("{}", serde_json::to_string_pretty(&parsed)?);

    let keywords = FileKeywords::new(expand_path(&config.paths.keywords_file)).snapshot().await;
    match verdict(&parsed, &keywords) {
        Some(v) => println!("actionable: {v:?}"),
        None => println!("not actionable"),
    }

    let route = Router::new(&config.channels).route(
        &parsed.category,
        &parsed.release_name,
        "<image>",
    )?;
    println!("route: {}", route.channel);
    Ok(())
}

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = init_config(path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
