use std::path::PathBuf;

use clap::Parser;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// fncore - control plane of a multi-language FaaS platform
#[derive(Debug, Parser)]
#[command(name = "fncore", author, about, version)]
pub struct FncoreArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: FncoreSubcommand,
}

/// Available subcommands
#[derive(Debug, Parser)]
pub enum FncoreSubcommand {
    /// Run the control-plane daemon: task queue worker and trigger scheduler
    #[command(name = "serve")]
    Serve {
        /// Path to the YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Ensure the function namespace exists in the cluster
    #[command(name = "init")]
    Init {
        /// Path to the YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
