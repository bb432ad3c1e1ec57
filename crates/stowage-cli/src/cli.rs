use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "stowage",
    about = "Store files and secrets behind one lifecycle-managed interface",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "STOWAGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Round-trip a probe file and secret through the configured backends.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Save, load, or delete files through the persister.
    #[command(subcommand)]
    File(FileCommand),
    /// Set, get, or delete secrets through the secrets keeper.
    #[command(subcommand)]
    Secret(SecretCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init {
        /// Embed a freshly generated master key for the encrypted keeper.
        #[arg(long)]
        generate_key: bool,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum FileCommand {
    /// Save content (from --content, --from, or stdin) as <path>/<name>.
    Save {
        path: String,
        name: String,
        #[arg(long, conflicts_with = "from")]
        content: Option<String>,
        /// Read content from a local file.
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Print the content of <path>/<name>.
    Load { path: String, name: String },
    /// Delete <path>/<name> if present.
    Delete { path: String, name: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SecretCommand {
    /// Store a secret; reads stdin when --value is omitted.
    Set {
        path: String,
        #[arg(long)]
        value: Option<String>,
    },
    /// Print a secret.
    Get { path: String },
    /// Delete a secret if present.
    Delete { path: String },
}
