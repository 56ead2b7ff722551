// src/state.rs

use crate::{
    core::{
        paths,
        settings::{Settings, SettingsError},
    },
    system::host::HostEnv,
};
use std::path::{Path, PathBuf};

/// What every command needs from outside its own arguments.
///
/// Built once per invocation; nothing in it changes afterwards.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub host: HostEnv,
    /// The envlock home directory (may not exist).
    pub home: PathBuf,
    pub settings: Settings,
    /// Directory the command was started from.
    pub cwd: PathBuf,
}

impl AppContext {
    /// Captures the host environment and loads the configuration.
    ///
    /// `config` overrides the default `<home>/config.toml`.
    pub fn load(config: Option<&Path>) -> Result<Self, SettingsError> {
        let host = HostEnv::capture();
        let home = paths::envlock_home(&host)?;
        let config_path = config.map_or_else(|| paths::config_file(&home), Path::to_path_buf);
        let settings = Settings::load(&config_path)?;
        let cwd = std::env::current_dir().map_err(|e| SettingsError::Io {
            path: ".".to_string(),
            source: e,
        })?;
        log::debug!(
            "Home {}, config {}, cwd {}",
            home.display(),
            config_path.display(),
            cwd.display()
        );
        Ok(Self {
            host,
            home,
            settings,
            cwd,
        })
    }

    /// A context assembled from explicit parts.
    pub fn with_parts(host: HostEnv, home: PathBuf, settings: Settings, cwd: PathBuf) -> Self {
        Self {
            host,
            home,
            settings,
            cwd,
        }
    }
}
