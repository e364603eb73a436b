pub mod extract;
pub mod full;
pub mod integrate;
pub mod report;
pub mod tournament;
pub mod verify;

use std::path::{self, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::PipelineArgs;
use crate::config::Settings;
use crate::storage::FileSystemStore;
use crate::util::ensure_directory;

/// Everything a stage command needs: validated settings, the document
/// store and where manifests live.
pub struct RunContext {
    pub settings: Settings,
    pub store: FileSystemStore,
    pub manifest_dir: PathBuf,
    pub refresh: bool,
}

impl RunContext {
    pub fn new(settings: Settings, args: &PipelineArgs) -> Result<Self> {
        let manifest_dir = args
            .manifest_dir
            .clone()
            .unwrap_or_else(|| settings.output_directory().join("manifests"));
        ensure_directory(&manifest_dir)?;

        info!(
            input_directory = %settings.input_directory.display(),
            output_directory = %settings.output_directory().display(),
            manifest_dir = %manifest_dir.display(),
            refresh = args.refresh,
            "configuration loaded"
        );

        Ok(Self {
            settings,
            store: FileSystemStore::new(),
            manifest_dir,
            refresh: args.refresh,
        })
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.manifest_dir.join(name)
    }
}

/// Config file and environment first, then command-line overrides. A
/// relative `--output-dir` is taken from the working directory.
pub fn resolve_settings(args: &PipelineArgs) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())?;

    if let Some(input_dir) = &args.input_dir {
        settings.input_directory = input_dir.clone();
    }
    if let Some(output_dir) = &args.output_dir {
        settings.output_dir = path::absolute(output_dir).with_context(|| {
            format!("failed to resolve output directory {}", output_dir.display())
        })?;
    }
    if !args.source_folders.is_empty() {
        settings.source_folders = args.source_folders.clone();
    }

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use std::env;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn relative_output_dir_flag_resolves_against_working_directory() {
        let args = PipelineArgs {
            input_dir: Some(PathBuf::from("/docs")),
            output_dir: Some(PathBuf::from("out")),
            ..PipelineArgs::default()
        };

        let settings = resolve_settings(&args).expect("settings should resolve");

        let cwd = env::current_dir().expect("working directory");
        assert_eq!(settings.output_directory(), cwd.join("out"));
        assert_eq!(
            settings.output_path_for("brief.md"),
            cwd.join("out").join("COMPREHENSIVE_brief.md")
        );
    }

    #[test]
    fn absolute_output_dir_flag_is_kept() {
        let args = PipelineArgs {
            output_dir: Some(PathBuf::from("/srv/merged")),
            ..PipelineArgs::default()
        };
        let settings = resolve_settings(&args).expect("settings should resolve");
        assert_eq!(settings.output_directory(), PathBuf::from("/srv/merged"));
    }

    #[test]
    fn context_creates_default_manifest_directory() {
        let dir = TempDir::new().expect("temp dir");
        let settings = Settings {
            input_directory: dir.path().to_path_buf(),
            ..Settings::default()
        };

        let context = RunContext::new(settings, &PipelineArgs::default()).expect("context");

        let expected = dir.path().join("output").join("manifests");
        assert_eq!(context.manifest_dir, expected);
        assert!(expected.is_dir());
        assert_eq!(
            context.manifest_path("improvements.json"),
            expected.join("improvements.json")
        );
    }
}
