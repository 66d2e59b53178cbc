//! Apollo CLI
//!
//! Thin command-line front end over `apollo-client`:
//! - `get`   prints one value
//! - `keys`  lists a namespace
//! - `watch` keeps the long poll running and prints change events

#![allow(clippy::print_stdout, reason = "CLI tool outputs to stdout")]

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use apollo_client::ClientOptions;
use apollo_types::Env;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = build_options(&cli)?;

    match cli.command {
        Commands::Get { key, namespace, default } => {
            commands::get_value(options, &namespace, &key, default.as_deref()).await
        },
        Commands::Keys { namespace, prefix, json } => {
            commands::list_keys(options, &namespace, prefix.as_deref(), json).await
        },
        Commands::Watch { namespace } => commands::watch(options, &namespace).await,
    }
}

/// Bootstrap file first, then explicit flags on top.
fn build_options(cli: &Cli) -> Result<ClientOptions> {
    let mut options = match &cli.config_file {
        Some(path) => ClientOptions::from_bootstrap_file(path)
            .with_context(|| format!("Failed to read bootstrap file {}", path.display()))?,
        None => ClientOptions::default(),
    };

    if let Some(app_id) = &cli.app_id {
        options.app_id = app_id.clone();
    }
    if let Some(env) = &cli.env {
        options.env = env.clone();
    }
    if options.app_id.is_empty() || options.env.is_empty() {
        anyhow::bail!("Specify --config-file, or both --app-id and --env");
    }

    options = options.with_cluster(cli.cluster.clone());

    if let Some(meta) = &cli.meta {
        let env: Env = options.env.parse().context("Cannot apply --meta")?;
        options = options.with_meta_server(env, meta.clone());
    }
    if let Some(dir) = &cli.cache_dir {
        options = options.with_cache_dir(dir.clone());
    }

    Ok(options)
}
