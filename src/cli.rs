//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::orchestrator::TriggerType;

/// Domain-aware context maintenance gateway
#[derive(Parser, Debug)]
#[command(name = "context-gateway")]
#[command(about = "Keeps per-domain context documents consistent with source changes")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Project root (default: current directory)
    #[arg(short, long, value_name = "PATH", global = true, env = "CONTEXT_GATEWAY_PROJECT")]
    pub project: Option<PathBuf>,

    /// Configuration file (default: <project>/.context-gateway/config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the MCP server on stdio
    Serve,

    /// Print the health report
    Health,

    /// Run a coordinated context update
    #[command(visible_alias = "u")]
    Update(UpdateArgs),

    /// Predict the impact of changed files
    #[command(visible_alias = "i")]
    Impact(ImpactArgs),

    /// Print the domain map
    Domains(DomainsArgs),

    /// Run rollback retention and cache pruning once
    Maintenance,

    /// List or recover leftover transactions
    Recover(RecoverArgs),
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Changed files, relative to the project root or absolute
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Use the files touched by this commit
    #[arg(long, value_name = "SHA", conflicts_with = "since")]
    pub commit: Option<String>,

    /// Use the files changed since this ref
    #[arg(long, value_name = "REF")]
    pub since: Option<String>,

    /// Per-domain update budget in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Build the plan without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

impl UpdateArgs {
    pub fn trigger_type(&self) -> TriggerType {
        if self.commit.is_some() || self.since.is_some() {
            TriggerType::GitCommit
        } else {
            TriggerType::Manual
        }
    }
}

#[derive(Args, Debug)]
pub struct ImpactArgs {
    /// Changed files, relative to the project root or absolute
    #[arg(value_name = "FILES", required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DomainsArgs {
    /// Print a Mermaid graph instead of JSON
    #[arg(long)]
    pub mermaid: bool,
}

#[derive(Args, Debug)]
pub struct RecoverArgs {
    /// List leftover transactions instead of recovering one
    #[arg(long, conflicts_with = "transaction_id")]
    pub list: bool,

    /// Transaction to recover
    #[arg(value_name = "ID")]
    pub transaction_id: Option<String>,
}
