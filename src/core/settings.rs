// src/core/settings.rs

use crate::{
    constants::{DEFAULT_LOCK_FILENAME, DEFAULT_PROFILE, EXIT_FAILURE},
    core::{
        loader::SearchPath,
        paths::{self, PathError},
    },
    models::IsolationMode,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Could not read configuration '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Error parsing TOML in '{path}': {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Path(#[from] PathError),
}

impl SettingsError {
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }
}

/// User configuration (`config.toml` in the envlock home).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directories searched for named profiles, in order. Empty means `<home>/profiles`.
    pub profile_dirs: Vec<String>,
    /// Profiles used when the command line names none.
    pub default_profiles: Vec<String>,
    pub mode: IsolationMode,
    /// Host variables that references may read in isolated mode.
    pub allow_host: Vec<String>,
    pub lock_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profile_dirs: Vec::new(),
            default_profiles: vec![DEFAULT_PROFILE.to_string()],
            mode: IsolationMode::default(),
            allow_host: Vec::new(),
            lock_file: DEFAULT_LOCK_FILENAME.to_string(),
        }
    }
}

impl Settings {
    /// Loads the configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!(
                    "No configuration at {}, using defaults",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(SettingsError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        toml::from_str(&content).map_err(|e| SettingsError::TomlParse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// The profile search path: `extra` first, then the configured directories.
    ///
    /// Relative configured directories are anchored at `home`.
    pub fn search_path(&self, home: &Path, extra: &[PathBuf]) -> Result<SearchPath, SettingsError> {
        let mut dirs: Vec<PathBuf> = extra.to_vec();
        if self.profile_dirs.is_empty() {
            dirs.push(paths::profiles_dir(home));
        } else {
            for template in &self.profile_dirs {
                dirs.push(paths::expand_relative_to(template, home)?);
            }
        }
        Ok(SearchPath::new(dirs))
    }
}
