use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "apollo",
    about = "Apollo config client - fetch, inspect and watch namespaces",
    version = env!("CARGO_PKG_VERSION"),
    author,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'c',
        long,
        global = true,
        env = "APOLLO_CONFIG_FILE",
        help = "JSON file with \"app.id\" and \"env\""
    )]
    pub config_file: Option<PathBuf>,

    #[arg(short, long, global = true, env = "APOLLO_APP_ID", help = "Application id")]
    pub app_id: Option<String>,

    #[arg(short, long, global = true, env = "APOLLO_ENV", help = "Environment (dev, fat, uat, pro or an alias)")]
    pub env: Option<String>,

    #[arg(long, global = true, env = "APOLLO_CLUSTER", default_value = "default")]
    pub cluster: String,

    #[arg(long, global = true, help = "Meta server URL for the selected environment")]
    pub meta: Option<String>,

    #[arg(long, global = true, help = "Root directory for fallback snapshots")]
    pub cache_dir: Option<PathBuf>,

    #[arg(short, long, global = true, env = "RUST_LOG", default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Print a single value")]
    Get {
        #[arg(help = "Configuration key")]
        key: String,

        #[arg(short, long, default_value = "application")]
        namespace: String,

        #[arg(short, long, help = "Printed when the key is absent")]
        default: Option<String>,
    },

    #[command(about = "List keys and values of a namespace")]
    Keys {
        #[arg(short, long, default_value = "application")]
        namespace: String,

        #[arg(short, long, help = "Only keys starting with this prefix")]
        prefix: Option<String>,

        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },

    #[command(about = "Stay connected and print every change until Ctrl-C")]
    Watch {
        #[arg(short, long, help = "Extra namespaces to watch besides the default one")]
        namespace: Vec<String>,
    },
}
