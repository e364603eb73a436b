use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "consolidate",
    version,
    about = "Tournament-based consolidation of multi-version Markdown documents"
)]
pub struct Cli {
    /// Debug-level logging; overrides `log_level` unless RUST_LOG is set.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Warnings and errors only; overrides `log_level` unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("warn")
        } else {
            None
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every stage and write all artifacts.
    Full(PipelineArgs),
    /// Score each version family and pick champions.
    Tournament(PipelineArgs),
    /// Collect improvements from non-champion versions.
    Extract(PipelineArgs),
    /// Merge improvements into the champions.
    Integrate(PipelineArgs),
    /// Check the merged documents.
    Verify(PipelineArgs),
}

impl Commands {
    pub fn args(&self) -> &PipelineArgs {
        match self {
            Self::Full(args)
            | Self::Tournament(args)
            | Self::Extract(args)
            | Self::Integrate(args)
            | Self::Verify(args) => args,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    #[arg(long, env = "CONSOLIDATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long = "source-folder")]
    pub source_folders: Vec<String>,

    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,

    /// Recompute upstream stages even when their manifests exist.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,
}
