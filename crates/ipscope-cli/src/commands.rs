//! CLI command definitions.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Show the current public address
    Show,

    /// Check whether the address changed since the last lookup
    Check,

    /// Watch for address changes in the background
    Watch {
        /// Seconds between checks
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show previously observed addresses
    History {
        /// Forget every recorded address
        #[arg(long)]
        clear: bool,
    },

    /// Manage the offline cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show the installed cache version
    Version,

    /// List cache partitions and their entries
    List,

    /// Delete every cache partition
    Clear,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}
