//! semsql CLI - Ask a database questions in plain language
//!
//! Usage:
//!   semsql serve [--host <host>] [--port <port>] [--config <file>]
//!   semsql compile <layer.json>
//!   semsql ask "<question>"
//!   semsql introspect
//!
//! Examples:
//!   semsql serve --port 8080
//!   semsql compile config/semantic_layer.json
//!   semsql ask "total revenue by month"

use clap::{Parser, Subcommand};
use semsql::config::{Settings, SettingsError};
use semsql::db::connect;
use semsql::llm::LlmGateway;
use semsql::pipeline::{QueryOutcome, QueryService};
use semsql::semantic::{SemanticLayer, SemanticLayerStore};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "semsql")]
#[command(about = "semsql - Natural-language questions to SQL, guided by a semantic layer")]
#[command(version)]
struct Cli {
    /// Config file (defaults: $SEMSQL_CONFIG, ./semsql.toml, ~/.config/semsql/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Listen address
        #[arg(long)]
        host: Option<String>,

        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the prompt text compiled from a semantic layer file
    Compile {
        /// Path to the semantic layer JSON
        file: PathBuf,
    },

    /// Answer one question and print the SQL and rows as JSON
    Ask {
        /// The question
        question: String,
    },

    /// Print the live database schema as JSON
    Introspect,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "semsql=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => cmd_serve(cli.config, host, port).await,
        Commands::Compile { file } => cmd_compile(file),
        Commands::Ask { question } => cmd_ask(cli.config, &question).await,
        Commands::Introspect => cmd_introspect(cli.config).await,
    }
}

/// Load settings, reporting failures on stderr.
fn settings_or_exit(config: Option<PathBuf>) -> Result<Settings, ExitCode> {
    load_settings(config).map_err(|e| {
        eprintln!("Configuration error: {}", e);
        ExitCode::FAILURE
    })
}

fn load_settings(config: Option<PathBuf>) -> Result<Settings, SettingsError> {
    match config {
        Some(path) => {
            let mut settings = Settings::from_file(path)?;
            settings.apply_overrides(|key| std::env::var(key).ok())?;
            Ok(settings)
        }
        None => Settings::load(),
    }
}

async fn cmd_serve(config: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> ExitCode {
    let mut settings = match settings_or_exit(config) {
        Ok(s) => s,
        Err(code) => return code,
    };
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    match semsql::web::serve(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_compile(file: PathBuf) -> ExitCode {
    let source = match fs::read_to_string(&file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let layer: SemanticLayer = match serde_json::from_str(&source) {
        Ok(layer) => layer,
        Err(e) => {
            eprintln!("Invalid semantic layer '{}': {}", file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = layer.validate() {
        eprintln!("Invalid semantic layer '{}': {}", file.display(), e);
        return ExitCode::FAILURE;
    }

    println!("{}", layer.compile());
    ExitCode::SUCCESS
}

async fn cmd_ask(config: Option<PathBuf>, question: &str) -> ExitCode {
    let settings = match settings_or_exit(config) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let db = match connect(&settings.database) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Database error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let service = QueryService::new(
        Arc::new(SemanticLayerStore::open(settings.semantic.path.clone())),
        Arc::new(LlmGateway::with_builtins(settings.llm.clone())),
        db,
        settings.database.dialect(),
    );

    match service.ask(question).await {
        Ok(QueryOutcome::Executed(result)) => {
            let failed = !result.is_success();
            print_json(&result);
            if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Ok(QueryOutcome::NotGenerated { error }) => {
            eprintln!("{}", error);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_introspect(config: Option<PathBuf>) -> ExitCode {
    let settings = match settings_or_exit(config) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let db = match connect(&settings.database) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Database error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match semsql::metadata::introspect(db.as_ref()).await {
        Ok(schema) => {
            print_json(&schema);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Introspection failed: {}", db.redact(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to render JSON: {}", e),
    }
}
