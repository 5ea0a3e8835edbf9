//! Planview CLI - shell bridge to the configurator engine
//!
//! Commands: floors, validate, apply, render, hotspots, summary
//! Outputs JSON to stdout, logs to stderr (LOG_LEVEL)
//! Returns non-zero on rejection or validation failure

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use planview_core::catalog::CatalogSource;
use planview_core::compositor::{BaseUrlResolver, FsImageLoader};
use planview_core::validation::FailureMode;
use planview_core::{
    Action, Catalog, FileStore, FloorId, JsonCatalogSource, ModelId, OptionId, Session,
    SessionDeps, SessionError, Settings, Validator,
};

#[derive(Parser)]
#[command(name = "planview-cli")]
#[command(about = "Planview CLI - option configurator engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalog document (JSON)
    #[arg(short, long, default_value = "catalog.json")]
    catalog: PathBuf,

    /// Settings file (JSON); defaults apply when absent
    #[arg(short, long, default_value = "planview.json")]
    settings: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Verb {
    Select,
    Deselect,
}

#[derive(Subcommand)]
enum Commands {
    /// List a model's floors in display order
    Floors {
        #[arg(short, long)]
        model: u64,
    },

    /// Lint the catalog document
    Validate {
        /// Report errors without failing
        #[arg(long)]
        warn_only: bool,
    },

    /// Select or deselect an option and persist the result
    Apply {
        #[arg(short, long)]
        model: u64,

        #[arg(value_enum)]
        verb: Verb,

        option: u64,

        /// Floor the change is made on (drives elevation exclusivity)
        #[arg(short, long)]
        floor: Option<u64>,
    },

    /// Render a floor and print the resulting scene
    Render {
        #[arg(short, long)]
        model: u64,

        #[arg(short, long)]
        floor: Option<u64>,

        /// Directory image identifiers are read from
        #[arg(long, default_value = ".")]
        assets: PathBuf,
    },

    /// List hotspots of a floor, or the panel behind one key
    Hotspots {
        #[arg(short, long)]
        model: u64,

        #[arg(short, long)]
        floor: Option<u64>,

        #[arg(short, long)]
        key: Option<String>,
    },

    /// Review the current selection
    Summary {
        #[arg(short, long)]
        model: u64,
    },
}

fn init_tracing() -> Result<()> {
    let level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout is reserved for JSON
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_session(cli: &Cli, settings: &Settings, model: u64, assets: PathBuf) -> Result<Session> {
    let deps = SessionDeps {
        source: Arc::new(JsonCatalogSource::new(&cli.catalog)),
        store: Arc::new(FileStore::new(&settings.store_dir)),
        assets: Arc::new(BaseUrlResolver::new(settings.asset_base_url.clone())),
        loader: Arc::new(FsImageLoader::new(assets)),
        settings: settings.clone(),
    };
    Session::open(deps, ModelId(model))
        .await
        .with_context(|| format!("Failed to open session from {}", cli.catalog.display()))
}

fn select_floor(session: &mut Session, floor: Option<u64>) -> Result<()> {
    if let Some(floor) = floor {
        session.set_floor(FloorId(floor))?;
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::load(&cli.settings)?;

    match &cli.command {
        Commands::Floors { model } => {
            let data = JsonCatalogSource::new(&cli.catalog).fetch().await?;
            let catalog = Catalog::build(data)?;
            let floors: Vec<_> = catalog
                .floors_for_model(ModelId(*model))
                .into_iter()
                .map(|f| serde_json::json!({
                    "id": f.id,
                    "name": f.name,
                    "kind": f.kind(),
                    "option_sets": catalog.option_sets_for_floor(f.id).len(),
                }))
                .collect();
            print_json(&floors)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate { warn_only } => {
            let data = JsonCatalogSource::new(&cli.catalog).fetch().await?;
            let mode = if *warn_only { FailureMode::Warn } else { FailureMode::Block };
            let result = Validator::new().with_failure_mode(mode).validate(&data);
            print_json(&result)?;
            if result.valid {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(2)) // Validation failure
            }
        }

        Commands::Apply { model, verb, option, floor } => {
            let mut session = open_session(&cli, &settings, *model, PathBuf::from(".")).await?;
            select_floor(&mut session, *floor)?;

            let action = match verb {
                Verb::Select => Action::Select(OptionId(*option)),
                Verb::Deselect => Action::Deselect(OptionId(*option)),
            };
            match session.apply(action) {
                Ok(selection) => {
                    print_json(&serde_json::json!({ "selection": selection, "error": null }))?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(SessionError::Rejected(rejection)) => {
                    print_json(&serde_json::json!({
                        "selection": session.selection(),
                        "error": { "message": rejection.to_string(), "detail": rejection },
                    }))?;
                    Ok(ExitCode::from(2)) // Rejected change
                }
                Err(e) => Err(e.into()),
            }
        }

        Commands::Render { model, floor, assets } => {
            let mut session = open_session(&cli, &settings, *model, assets.clone()).await?;
            select_floor(&mut session, *floor)?;
            let report = session.render().await?;
            print_json(&serde_json::json!({ "report": report, "scene": session.scene() }))?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Hotspots { model, floor, key } => {
            let mut session = open_session(&cli, &settings, *model, PathBuf::from(".")).await?;
            select_floor(&mut session, *floor)?;
            match key {
                Some(key) => print_json(&session.panel(key))?,
                None => print_json(&session.hotspots())?,
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Summary { model } => {
            let session = open_session(&cli, &settings, *model, PathBuf::from(".")).await?;
            print_json(&session.summary()?)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialise logging: {e}");
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            let output = serde_json::json!({ "error": format!("{e:#}") });
            println!("{output}");
            ExitCode::FAILURE
        }
    }
}
