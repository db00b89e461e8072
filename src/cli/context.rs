use std::path::{Path, PathBuf};

use anyhow::Result;
use quota_gate::StoreSettings;

use super::backend::{apply_override, BackendKind, OpenedBucket};
use super::output::OutputFormat;
use crate::config::Config;

pub struct CliContext {
    config: Config,
    config_path: PathBuf,
    output: OutputFormat,
    store: StoreSettings,
}

impl CliContext {
    pub fn new(
        config: Config,
        config_path: PathBuf,
        output: OutputFormat,
        backend: Option<BackendKind>,
    ) -> Self {
        let store = apply_override(&config.store, backend);
        Self {
            config,
            config_path,
            output,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    /// Store settings after command line overrides.
    pub fn store(&self) -> &StoreSettings {
        &self.store
    }

    /// Configuration as the commands will actually use it.
    pub fn effective_config(&self) -> Config {
        Config {
            store: self.store.clone(),
            ..self.config.clone()
        }
    }

    pub async fn open_bucket(&self) -> Result<OpenedBucket> {
        OpenedBucket::open(&self.store, &self.config.quota).await
    }
}
