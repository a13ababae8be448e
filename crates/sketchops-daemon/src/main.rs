//! sketchops - turns security chat and uploaded evidence into Timesketch
//! timelines.
//!
//! Each poller runs as its own process (`sketchops chat`,
//! `sketchops evidence`); both share the platform database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{error, info};

use sketchops::evidence::{ApiEvidenceStore, EvidenceStore, LocalEvidenceStore};
use sketchops::importer::{timeline_name, ImportRequest, TimelineImporter, TimesketchCli};
use sketchops::logging::{self, LogFormat};
use sketchops::provider::ProviderRegistry;
use sketchops::{
    artifact, load_from_env, Database, Pipeline, PipelineConfig, Poller, PollerConfig,
    ServiceConfig, Shutdown, SourceKind, TickReport,
};

#[derive(Parser)]
#[command(name = "sketchops")]
#[command(about = "Security chat and evidence to Timesketch timelines")]
#[command(version)]
struct Cli {
    /// Log output format (json or pretty); overrides LOG_FORMAT
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Load environment variables from this file before reading config
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chat-message poller
    Chat,

    /// Run the uploaded-evidence poller
    Evidence,

    /// Run a single tick and print its report
    Once {
        #[arg(value_enum)]
        source: SourceArg,
    },

    /// Create a sketch and print its id
    CreateSketch {
        #[arg(long)]
        name: String,
    },

    /// Import an artifact into a sketch
    Import {
        #[arg(long)]
        sketch: i64,
        /// JSONL file to import
        file: PathBuf,
        /// Timeline name (generated when omitted)
        #[arg(long)]
        timeline: Option<String>,
    },

    /// Check that every line of an artifact is a JSON object
    VerifyArtifact { file: PathBuf },

    /// Create or upgrade the database schema
    Migrate,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Chat,
    Evidence,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Chat => SourceKind::Chat,
            SourceArg::Evidence => SourceKind::Evidence,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    logging::init(cli.log_format.unwrap_or_else(LogFormat::from_env))?;

    if let Commands::VerifyArtifact { file } = &cli.command {
        return verify_artifact(file);
    }

    let config = match load_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("sketchops v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Chat => run_poller(SourceKind::Chat, &config).await,
        Commands::Evidence => run_poller(SourceKind::Evidence, &config).await,
        Commands::Once { source } => {
            let mut poller = build_poller(source.into(), &config)?;
            let report = poller.tick().await?;
            println!("{}", report_json(poller.source(), &report));
            Ok(())
        }
        Commands::CreateSketch { name } => {
            let id = importer(&config).create_collection(&name).await?;
            println!("{}", json!({ "sketch_id": id, "name": name }));
            Ok(())
        }
        Commands::Import {
            sketch,
            file,
            timeline,
        } => {
            let records = artifact::verify(&file)?;
            let request = ImportRequest {
                collection_id: sketch,
                artifact: file,
                timeline_name: timeline.unwrap_or_else(|| timeline_name(SourceKind::Evidence)),
            };
            importer(&config).import(&request).await?;
            println!(
                "{}",
                json!({
                    "sketch_id": sketch,
                    "timeline": request.timeline_name,
                    "records": records,
                })
            );
            Ok(())
        }
        Commands::Migrate => {
            Database::open(&config.database_path)?;
            info!("Schema is up to date");
            Ok(())
        }
        Commands::VerifyArtifact { file } => verify_artifact(&file),
    }
}

fn verify_artifact(file: &Path) -> Result<()> {
    let records = artifact::verify(file)?;
    println!("{}", json!({ "file": file, "records": records }));
    Ok(())
}

fn importer(config: &ServiceConfig) -> TimesketchCli {
    TimesketchCli::new(&config.timesketch_bin, config.import_timeout)
}

fn build_poller(source: SourceKind, config: &ServiceConfig) -> Result<Poller> {
    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open database {}", config.database_path.display()))?;

    let evidence: Arc<dyn EvidenceStore> = match &config.api_url {
        Some(url) => Arc::new(ApiEvidenceStore::new(
            url,
            config.api_key.clone(),
            config.import_timeout,
        )),
        None => Arc::new(LocalEvidenceStore::new(&config.uploads_dir)),
    };

    let pipeline = Pipeline::new(
        db.clone(),
        Arc::new(importer(config)),
        evidence,
        Arc::new(PipelineConfig::from_service(config)),
    );

    Ok(Poller::new(
        source,
        db,
        pipeline,
        ProviderRegistry::new(),
        PollerConfig::for_source(source, config),
    )
    .with_fallback_gemini_key(config.google_api_key.clone()))
}

async fn run_poller(source: SourceKind, config: &ServiceConfig) -> Result<()> {
    let mut poller = build_poller(source, config)?;

    let shutdown = Shutdown::new();
    let handler = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Shutdown requested");
        handler.trigger();
    })
    .context("failed to install signal handler")?;

    poller.run(&shutdown).await;
    Ok(())
}

fn report_json(source: SourceKind, report: &TickReport) -> serde_json::Value {
    match report {
        TickReport::Paused(reason) => json!({
            "source": source.as_str(),
            "status": "paused",
            "reason": reason.to_string(),
        }),
        TickReport::Completed {
            origins,
            succeeded,
            no_content,
            failed,
        } => json!({
            "source": source.as_str(),
            "status": "completed",
            "origins": origins,
            "imported": succeeded,
            "no_relevant_content": no_content,
            "failed": failed,
        }),
    }
}
