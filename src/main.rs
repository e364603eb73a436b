mod citations;
mod cli;
mod commands;
mod config;
mod error;
mod markdown;
mod model;
mod similarity;
mod storage;
mod util;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::cli::{Cli, Commands};
use crate::commands::RunContext;
use crate::config::{LOG_FILE_NAME, Settings};
use crate::util::open_append;

fn main() {
    let cli = Cli::parse();
    let settings = commands::resolve_settings(cli.command.args());

    let level = cli
        .log_level_override()
        .or_else(|| settings.as_ref().ok().and_then(|s| s.log_filter().ok()))
        .unwrap_or("info");
    let log_dir = settings.as_ref().ok().map(Settings::log_directory);
    init_tracing(level, log_dir.as_deref());

    let result = settings
        .and_then(|settings| RunContext::new(settings, cli.command.args()))
        .and_then(|context| run(&cli.command, context));

    if let Err(err) = result {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run(command: &Commands, context: RunContext) -> Result<()> {
    match command {
        Commands::Full(_) => commands::full::run(context),
        Commands::Tournament(_) => commands::tournament::run(context),
        Commands::Extract(_) => commands::extract::run(context),
        Commands::Integrate(_) => commands::integrate::run(context),
        Commands::Verify(_) => commands::verify::run(context),
    }
}

/// Console logging to stderr, plus a plain-text copy in `log_dir` when the
/// log file can be opened.
fn init_tracing(default_level: &str, log_dir: Option<&Path>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (log_file, file_error) = match log_dir
        .map(|dir| open_append(&dir.join(LOG_FILE_NAME)))
        .transpose()
    {
        Ok(file) => (file, None),
        Err(err) => (None, Some(err)),
    };
    let file_layer = log_file.map(|file| fmt::layer().with_ansi(false).with_writer(Arc::new(file)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    if let Some(err) = file_error {
        warn!(error = %format!("{err:#}"), "file logging disabled");
    }
}
