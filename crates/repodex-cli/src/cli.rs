use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "repodex",
    about = "Index and query RPM repository metadata",
    version,
    arg_required_else_help = true
)]
pub struct Args {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print results and logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Disable progress spinners
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize metadata of every enabled repository
    Sync {
        /// Refetch repomd.xml even inside the expiry window
        #[arg(short, long)]
        force: bool,
    },

    /// List packages, optionally filtered by name patterns
    #[command(alias = "ls")]
    List {
        /// Package names or glob patterns
        #[arg(required = false)]
        patterns: Vec<String>,

        /// Show every version instead of only the newest
        #[arg(short, long)]
        all: bool,
    },

    /// Find packages providing a capability or file
    #[command(arg_required_else_help = true)]
    Provides {
        /// Capability name or absolute file path
        name: String,
    },

    /// Find packages requiring a capability
    #[command(arg_required_else_help = true)]
    Requires {
        /// Capability name
        name: String,
    },

    /// Show details of a package
    #[command(arg_required_else_help = true)]
    Info {
        /// Full name-[epoch:]version-release.arch, or a package name
        package: String,

        /// Number of changelog entries to show
        #[arg(long, default_value_t = 3)]
        changelog: usize,
    },

    /// List configured repositories
    #[command(alias = "repolist")]
    Repos,
}
