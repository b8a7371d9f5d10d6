//! Parlance - streaming conversation engine CLI
//!
#![doc = "Parlance - streaming conversation engine CLI"]
#![doc = "Main entry point for the Parlance application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parlance::cli::{Cli, Commands};
use parlance::commands;
use parlance::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first so --verbose can shape the filter
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let mut config = Config::load(config_path)?;

    // CLI store override wins over the config file
    if let Some(store_path) = &cli.store_path {
        tracing::info!("Using store override from CLI: {}", store_path);
        config.store.path = store_path.clone();
    }

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Send {
            prompt,
            session,
            file,
        } => {
            tracing::info!("Starting turn");
            commands::run_send(config, prompt, session, file).await?;
            Ok(())
        }
        Commands::Resume {
            session,
            prior_file,
        } => {
            tracing::info!("Resuming latest assistant reply in {}", session);
            commands::run_resume(config, session, prior_file).await?;
            Ok(())
        }
        Commands::Sessions { json } => {
            commands::run_sessions(config, json).await?;
            Ok(())
        }
        Commands::Purge { session } => {
            tracing::info!("Purging session {}", session);
            commands::run_purge(config, session).await?;
            Ok(())
        }
        Commands::Reconcile { session } => {
            tracing::info!("Reconciling session {}", session);
            commands::run_reconcile(config, session).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "parlance=debug"
    } else {
        "parlance=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
