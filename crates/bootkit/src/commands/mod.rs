//! CLI command implementations

pub mod cleanup;
pub mod gate;
pub mod manifest;
pub mod run;
pub mod status;
pub mod version;

use anyhow::{Context as _, Result};
use bootkit_core::types::RunConfig;
use bootkit_core::{Architecture, ConfigLoader, Paths};
use bootkit_engine::StatusStore;
use camino::Utf8PathBuf;

/// Options shared by every command
#[derive(Debug, Clone, Default)]
pub struct Context {
    preferences: Option<Utf8PathBuf>,
    base_dir: Option<Utf8PathBuf>,
}

impl Context {
    pub fn new(preferences: Option<Utf8PathBuf>, base_dir: Option<Utf8PathBuf>) -> Self {
        Self {
            preferences,
            base_dir,
        }
    }

    pub fn loader(&self) -> ConfigLoader {
        match &self.preferences {
            Some(path) => ConfigLoader::with_preferences(path.clone()),
            None => ConfigLoader::new(),
        }
    }

    /// Resolve configuration below the CLI layer, honoring `--base-dir`
    pub fn load_config(&self) -> Result<RunConfig> {
        let mut config = self
            .loader()
            .load()
            .context("Failed to load configuration")?;
        if let Some(base_dir) = &self.base_dir {
            config.base_dir = base_dir.clone();
        }
        Ok(config)
    }

    /// Base directory layout; falls back to defaults if configuration is unreadable
    pub fn paths(&self) -> Paths {
        match (&self.base_dir, self.loader().load()) {
            (Some(base_dir), _) => Paths::new(base_dir.clone()),
            (None, Ok(config)) => Paths::new(config.base_dir),
            (None, Err(_)) => Paths::default(),
        }
    }

    pub fn status_store(&self) -> StatusStore {
        StatusStore::new(self.paths(), Architecture::current())
    }
}
