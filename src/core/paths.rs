// src/core/paths.rs

use crate::{
    constants::{CONFIG_FILENAME, ENVLOCK_DIR, ENVLOCK_HOME_ENV, PROFILES_DIR},
    system::host::HostEnv,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find the user's home directory. Set {} instead.", ENVLOCK_HOME_ENV)]
    HomeDirNotFound,
    #[error("Could not expand path '{template}': {reason}")]
    Expansion { template: String, reason: String },
}

/// The envlock home: `$ENVLOCK_HOME` when set, `~/.envlock` otherwise.
pub fn envlock_home(host: &HostEnv) -> Result<PathBuf, PathError> {
    match host.get(ENVLOCK_HOME_ENV) {
        Some(value) if !value.trim().is_empty() => expand_path(value),
        _ => dirs::home_dir()
            .map(|home| home.join(ENVLOCK_DIR))
            .ok_or(PathError::HomeDirNotFound),
    }
}

/// Default location of the configuration file.
pub fn config_file(home: &Path) -> PathBuf {
    home.join(CONFIG_FILENAME)
}

/// Default directory for named profiles.
pub fn profiles_dir(home: &Path) -> PathBuf {
    home.join(PROFILES_DIR)
}

/// Expands `~` and `$VAR` / `${VAR}` in a path.
pub fn expand_path(template: &str) -> Result<PathBuf, PathError> {
    shellexpand::full(template)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| PathError::Expansion {
            template: template.to_string(),
            reason: e.to_string(),
        })
}

/// Expands `template` and anchors it at `base` when it is still relative.
pub fn expand_relative_to(template: &str, base: &Path) -> Result<PathBuf, PathError> {
    let expanded = expand_path(template)?;
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base.join(expanded))
    }
}
