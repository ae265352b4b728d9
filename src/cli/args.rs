//! CLI argument definitions using clap derive

use crate::http::{Destination, Method};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Offcache - offline cache manager for a static site
///
/// Installs versioned cache generations of a site's assets, answers
/// requests cache-first and falls back to a cached page when offline.
#[derive(Parser, Debug)]
#[command(name = "offcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "OFFCACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the manifest into the configured generation
    Install,

    /// Purge other generations and start serving the configured one
    Activate,

    /// Install, then activate if the worker asked to skip waiting
    Update,

    /// Intercept one request the way a controlled page would
    Fetch(FetchArgs),

    /// List stored cache generations
    Generations(GenerationsArgs),

    /// Fire a background sync event
    Sync(SyncArgs),

    /// Deliver a push event and show its notification
    Push(PushArgs),

    /// Click a notification action
    Click(ClickArgs),

    /// Post a message to the worker
    Message(MessageArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Absolute URL, or a path resolved against the scope
    pub url: String,

    /// Treat the request as a page navigation
    #[arg(short, long)]
    pub navigate: bool,

    /// Request method
    #[arg(short, long, default_value = "GET")]
    pub method: Method,

    /// What the response is for (document, script, style, image, font, manifest)
    #[arg(short, long)]
    pub destination: Option<Destination>,

    /// Write the response body to a file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the generations command
#[derive(Parser, Debug)]
pub struct GenerationsArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the sync command
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Sync tag (defaults to the configured tag)
    pub tag: Option<String>,
}

/// Arguments for the push command
#[derive(Parser, Debug)]
pub struct PushArgs {
    /// Text payload shown as the notification body
    pub payload: Option<String>,
}

/// Arguments for the click command
#[derive(Parser, Debug)]
pub struct ClickArgs {
    /// Action button clicked (omit for the notification body)
    pub action: Option<String>,

    /// A page already open in a window, as a URL or a path under the scope
    #[arg(long = "open", value_name = "URL")]
    pub open: Vec<String>,
}

/// Arguments for the message command
#[derive(Parser, Debug)]
pub struct MessageArgs {
    /// Message data as JSON, e.g. '{"type":"SKIP_WAITING"}'
    pub data: String,
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
