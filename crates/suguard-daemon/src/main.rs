//! suguard
//!
//! Decides superuser requests: prompts on the terminal, persists the outcome
//! as a policy, and manages stored policies.

mod policy_cmd;
mod request_cmd;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use suguard_core::config::{self, Config};
use suguard_daemon::auth::CommandGate;
use suguard_daemon::channel::JsonLineChannel;
use suguard_daemon::context::{AppResolver, StaticAppResolver};
use suguard_daemon::management::PolicyManager;
use suguard_daemon::policy::Uid;
use suguard_daemon::request::{EngineDeps, RequestHandler};
use suguard_daemon::settings::PromptSettings;
use suguard_daemon::storage::Database;

use crate::policy_cmd::PolicyAction;

#[derive(Parser, Debug)]
#[command(name = "suguard")]
#[command(version, about = "suguard - superuser request decision engine")]
struct Cli {
    /// Config file (JSON), applied over the global settings file
    #[arg(long, global = true, env = "SUGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Policy database file path
    #[arg(long, global = true, env = "SUGUARD_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, global = true, env = "SUGUARD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true, env = "SUGUARD_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decide a superuser request from the given caller
    Request {
        /// Caller uid
        #[arg(long)]
        uid: Uid,
        /// JSON file of known applications, instead of the system user database
        #[arg(long, env = "SUGUARD_APPS")]
        apps: Option<PathBuf>,
    },
    /// Manage stored policies
    #[command(subcommand)]
    Policy(PolicyAction),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.daemon.log_level.clone());
    suguard_core::tracing_init::init_tracing(&format!("suguard_daemon={log_level}"), cli.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting suguard");

    let db_path = resolve_db_path(cli.db_path, &config)?;
    info!(path = %db_path.display(), "Opening database");
    let db = Arc::new(Database::open(&db_path).await?);

    let settings = Arc::new(PromptSettings::from_config(&config.superuser));
    let gate = Arc::new(CommandGate::new(config.superuser.auth_command.clone()));

    match cli.command {
        Commands::Request { uid, apps } => {
            let handler = RequestHandler::new(EngineDeps {
                apps: app_resolver(apps.as_deref())?,
                policies: Arc::clone(&db) as _,
                choices: db,
                gate,
                channel: Arc::new(JsonLineChannel::new(tokio::io::stdout())),
                settings,
            });
            let code = request_cmd::run(&handler, uid).await?;
            // The stdin reader sits in a blocking read that would stall runtime shutdown.
            std::process::exit(code)
        }
        Commands::Policy(action) => {
            let manager = PolicyManager::new(db, gate, settings);
            policy_cmd::run(&manager, action).await
        }
    }
}

fn resolve_db_path(explicit: Option<PathBuf>, config: &Config) -> anyhow::Result<PathBuf> {
    explicit
        .or_else(|| config.daemon.database_path.clone())
        .or_else(config::database_path)
        .context("Cannot determine database path: set --db-path or HOME")
}

fn app_resolver(apps: Option<&Path>) -> anyhow::Result<Arc<dyn AppResolver>> {
    if let Some(path) = apps {
        let resolver = StaticAppResolver::from_json_file(path)
            .with_context(|| format!("Failed to load applications from {}", path.display()))?;
        return Ok(Arc::new(resolver));
    }

    #[cfg(unix)]
    {
        Ok(Arc::new(suguard_daemon::context::SystemAppResolver))
    }
    #[cfg(not(unix))]
    {
        anyhow::bail!("--apps is required on this platform")
    }
}
