// src/core/report.rs

use crate::{
    constants::{DIGEST_TRUNCATE_LENGTH, EXIT_REPORT, LOCK_FORMAT_VERSION, REDACTED_VALUE},
    core::session::SessionError,
    models::{IsolationMode, ResolvedEnvironment},
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Cannot report on an environment that failed to resolve: {source}")]
    ResolutionFailed {
        #[source]
        source: SessionError,
    },
    #[error("Could not access lock file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid lock file '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Lock file '{path}' has format version {found}, expected {expected}.")]
    UnsupportedVersion {
        path: String,
        found: u32,
        expected: u32,
    },
    #[error("Lock file '{path}' was modified by hand (digest {found}, content hashes to {expected}).")]
    DigestMismatch {
        path: String,
        expected: String,
        found: String,
    },
}

impl ReportError {
    /// A wrapped resolution failure keeps its own exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ResolutionFailed { source } => source.exit_code(),
            _ => EXIT_REPORT,
        }
    }
}

/// Gatekeeper for every report: a failed resolution never turns into output.
pub fn ensure_resolved(
    outcome: Result<ResolvedEnvironment, SessionError>,
) -> Result<ResolvedEnvironment, ReportError> {
    outcome.map_err(|source| ReportError::ResolutionFailed { source })
}

// --- Rendering ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Aligned `KEY=value` lines with the supplying profile.
    #[default]
    Text,
    /// `export KEY='value'` lines for `eval`.
    Shell,
    /// The resolved environment with provenance, as JSON.
    Json,
}

/// Renders a resolved environment. `redact` hides every value.
pub fn render(
    env: &ResolvedEnvironment,
    format: OutputFormat,
    redact: bool,
) -> Result<String, ReportError> {
    let shown = |value: &str| -> String {
        if redact {
            REDACTED_VALUE.to_string()
        } else {
            value.to_string()
        }
    };

    let mut out = String::new();
    match format {
        OutputFormat::Shell => {
            for (key, var) in &env.variables {
                let _ = writeln!(out, "export {}={}", key, shell_quote(&shown(&var.value)));
            }
            for key in &env.unset {
                let _ = writeln!(out, "unset {}", key);
            }
        }
        OutputFormat::Json => {
            let mut view = env.clone();
            if redact {
                for var in view.variables.values_mut() {
                    var.value = REDACTED_VALUE.to_string();
                }
            }
            out = serde_json::to_string_pretty(&view).map_err(|e| ReportError::Json {
                path: "<stdout>".to_string(),
                source: e,
            })?;
            out.push('\n');
        }
        OutputFormat::Text => {
            let width = env
                .variables
                .keys()
                .chain(&env.unset)
                .map(String::len)
                .max()
                .unwrap_or(0);
            for (key, var) in &env.variables {
                let origin = if var.provenance.shadowed.is_empty() {
                    var.provenance.profile.clone()
                } else {
                    format!(
                        "{} (over {})",
                        var.provenance.profile,
                        var.provenance.shadowed.join(", ")
                    )
                };
                let _ = writeln!(
                    out,
                    "{} = {}  {}",
                    format!("{:<width$}", key, width = width).cyan(),
                    shown(&var.value),
                    format!("[{}]", origin).dimmed()
                );
            }
            for key in &env.unset {
                let _ = writeln!(
                    out,
                    "{}   {}",
                    format!("{:<width$}", key, width = width).cyan(),
                    "(unset)".dimmed()
                );
            }
        }
    }
    Ok(out)
}

/// Single-quotes a value for POSIX shells.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

// --- Lock snapshots ---

/// One locked variable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub key: String,
    pub value: String,
    pub profile: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shadowed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_inputs: Vec<String>,
}

/// The on-disk record of a resolved environment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LockSnapshot {
    pub version: u32,
    pub profiles: Vec<String>,
    pub layers: Vec<String>,
    pub mode: IsolationMode,
    pub digest: String,
    pub entries: Vec<LockEntry>,
    /// Keys the session removes, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unset: Vec<String>,
}

impl LockSnapshot {
    pub fn from_environment(env: &ResolvedEnvironment) -> Self {
        let entries: Vec<LockEntry> = env
            .variables
            .iter()
            .map(|(key, var)| LockEntry {
                key: key.clone(),
                value: var.value.clone(),
                profile: var.provenance.profile.clone(),
                shadowed: var.provenance.shadowed.clone(),
                host_inputs: var.provenance.host_inputs.clone(),
            })
            .collect();
        Self {
            version: LOCK_FORMAT_VERSION,
            profiles: env.profiles.clone(),
            layers: env.layers.clone(),
            mode: env.mode,
            digest: digest(&entries, &env.unset),
            entries,
            unset: env.unset.clone(),
        }
    }

    /// Pretty JSON with a trailing newline. Identical environments give identical bytes.
    pub fn to_json(&self) -> Result<String, ReportError> {
        let mut json = serde_json::to_string_pretty(self).map_err(|e| ReportError::Json {
            path: "<memory>".to_string(),
            source: e,
        })?;
        json.push('\n');
        Ok(json)
    }

    pub fn values(&self) -> BTreeMap<&str, &LockEntry> {
        self.entries.iter().map(|e| (e.key.as_str(), e)).collect()
    }
}

/// Truncated BLAKE3 over `key\0value\0profile\n` for every entry in key order,
/// then `!key\n` for every unset key.
fn digest(entries: &[LockEntry], unset: &[String]) -> String {
    let mut sorted: Vec<&LockEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let mut hasher = blake3::Hasher::new();
    for entry in sorted {
        hasher.update(entry.key.as_bytes());
        hasher.update(b"\0");
        hasher.update(entry.value.as_bytes());
        hasher.update(b"\0");
        hasher.update(entry.profile.as_bytes());
        hasher.update(b"\n");
    }
    let mut removed: Vec<&String> = unset.iter().collect();
    removed.sort();
    for key in removed {
        hasher.update(b"!");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
    }
    let hash = hasher.finalize();
    let bytes = hash.as_bytes();
    hex::encode(bytes.get(..DIGEST_TRUNCATE_LENGTH).unwrap_or(bytes))
}

/// Reads a lock file and checks its version and digest.
pub fn read_lock(path: &Path) -> Result<LockSnapshot, ReportError> {
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| ReportError::Io {
        path: display.clone(),
        source: e,
    })?;
    let snapshot: LockSnapshot = serde_json::from_str(&content).map_err(|e| ReportError::Json {
        path: display.clone(),
        source: e,
    })?;

    if snapshot.version != LOCK_FORMAT_VERSION {
        return Err(ReportError::UnsupportedVersion {
            path: display,
            found: snapshot.version,
            expected: LOCK_FORMAT_VERSION,
        });
    }
    let expected = digest(&snapshot.entries, &snapshot.unset);
    if expected != snapshot.digest {
        return Err(ReportError::DigestMismatch {
            path: display,
            expected,
            found: snapshot.digest,
        });
    }
    Ok(snapshot)
}

/// Writes a lock file atomically: a temporary file next to it is renamed into place.
pub fn write_lock(path: &Path, snapshot: &LockSnapshot) -> Result<(), ReportError> {
    let display = path.display().to_string();
    let io_err = |source: std::io::Error| ReportError::Io {
        path: display.clone(),
        source,
    };

    let json = snapshot.to_json()?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
    temp.write_all(json.as_bytes()).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;
    log::info!("Wrote lock file {}", display);
    Ok(())
}

// --- Diffs ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added { key: String, value: String },
    Removed { key: String, value: String },
    Changed {
        key: String,
        old_value: String,
        new_value: String,
        old_profile: String,
        new_profile: String,
    },
}

impl Change {
    pub fn key(&self) -> &str {
        match self {
            Self::Added { key, .. } | Self::Removed { key, .. } | Self::Changed { key, .. } => key,
        }
    }
}

/// Differences going from `old` to `new`, sorted by key.
///
/// A key whose value is unchanged but now comes from another profile is
/// reported as changed.
pub fn diff(old: &LockSnapshot, new: &LockSnapshot) -> Vec<Change> {
    let before = old.values();
    let after = new.values();
    let mut changes = Vec::new();

    for (key, entry) in &before {
        match after.get(key) {
            None => changes.push(Change::Removed {
                key: key.to_string(),
                value: entry.value.clone(),
            }),
            Some(now) if now.value != entry.value || now.profile != entry.profile => {
                changes.push(Change::Changed {
                    key: key.to_string(),
                    old_value: entry.value.clone(),
                    new_value: now.value.clone(),
                    old_profile: entry.profile.clone(),
                    new_profile: now.profile.clone(),
                });
            }
            Some(_) => {}
        }
    }
    for (key, entry) in &after {
        if !before.contains_key(key) {
            changes.push(Change::Added {
                key: key.to_string(),
                value: entry.value.clone(),
            });
        }
    }

    changes.sort_by(|a, b| a.key().cmp(b.key()));
    changes
}

/// `+`, `-` and `~` lines for a list of changes.
pub fn render_diff(changes: &[Change], redact: bool) -> String {
    let shown = |value: &str| -> String {
        if redact {
            REDACTED_VALUE.to_string()
        } else {
            value.to_string()
        }
    };

    let mut out = String::new();
    for change in changes {
        let _ = match change {
            Change::Added { key, value } => {
                writeln!(out, "{}", format!("+ {}={}", key, shown(value)).green())
            }
            Change::Removed { key, value } => {
                writeln!(out, "{}", format!("- {}={}", key, shown(value)).red())
            }
            Change::Changed {
                key,
                old_value,
                new_value,
                old_profile,
                new_profile,
            } => {
                let origin = if old_profile == new_profile {
                    format!("[{}]", new_profile)
                } else {
                    format!("[{} -> {}]", old_profile, new_profile)
                };
                writeln!(
                    out,
                    "{} {}",
                    format!("~ {}={} -> {}", key, shown(old_value), shown(new_value)).yellow(),
                    origin.dimmed()
                )
            }
        };
    }
    out
}
