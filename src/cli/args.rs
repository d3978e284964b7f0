use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "xocopy", version, about = "Copy Xen Orchestra backup images to removable media")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Ingest today's jobs and copy every pending one
    Copy(CopyArgs),
    /// Decrypt one encrypted backup image
    Recover(RecoverArgs),
    /// List jobs not yet copied
    Pending,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CopyArgs {
    #[arg(long)]
    pub progress: bool,
    /// Skip the upstream fetch and only work through the ledger
    #[arg(long)]
    pub no_fetch: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RecoverArgs {
    #[arg(long)]
    pub progress: bool,
    /// Ledger to read the key from instead of the configured one
    #[arg(long)]
    pub ledger: Option<PathBuf>,
    pub source_path: PathBuf,
    pub destination_directory: PathBuf,
}
