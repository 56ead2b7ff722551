// src/constants.rs

/// Environment variable that relocates the envlock home directory (default `~/.envlock`).
pub const ENVLOCK_HOME_ENV: &str = "ENVLOCK_HOME";

/// The name of the envlock home directory inside the user's home.
pub const ENVLOCK_DIR: &str = ".envlock";

/// Directory (inside the envlock home) searched for named profiles.
pub const PROFILES_DIR: &str = "profiles";

/// The user configuration file (inside the envlock home).
pub const CONFIG_FILENAME: &str = "config.toml";

/// File extension of profile documents.
pub const PROFILE_EXTENSION: &str = "json";

/// Profile used when a session names none and the configuration has no defaults.
pub const DEFAULT_PROFILE: &str = "default";

/// Default file name of a lock snapshot.
pub const DEFAULT_LOCK_FILENAME: &str = "envlock.lock.json";

/// Format version written into lock snapshots.
pub const LOCK_FORMAT_VERSION: u32 = 1;

/// Number of BLAKE3 bytes kept for the lock digest (hex-encoded to twice this length).
pub const DIGEST_TRUNCATE_LENGTH: usize = 16;

/// Separator of path lists such as `PATH`, selected by `"separator": "os"`.
pub const OS_LIST_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

/// Placeholder printed instead of a value when output is redacted.
pub const REDACTED_VALUE: &str = "***";

// --- Exit codes ---
// A child that exits normally passes its own code through unchanged.

/// Everything went fine.
pub const EXIT_SUCCESS: i32 = 0;
/// I/O or configuration failure outside the resolution pipeline.
pub const EXIT_FAILURE: i32 = 1;
/// Invalid command-line usage.
pub const EXIT_USAGE: i32 = 2;
/// A profile document failed schema validation.
pub const EXIT_SCHEMA: i32 = 3;
/// A reference or inheritance cycle was found.
pub const EXIT_CYCLIC_REFERENCE: i32 = 4;
/// A reference could not be resolved.
pub const EXIT_UNRESOLVED_VARIABLE: i32 = 5;
/// A locked key was redefined by a later profile.
pub const EXIT_OVERRIDE_CONFLICT: i32 = 6;
/// A report or lock snapshot could not be produced or read.
pub const EXIT_REPORT: i32 = 7;
/// `diff` found differences between the snapshot and the current resolution.
pub const EXIT_DRIFT: i32 = 8;
/// The command exists but could not be executed.
pub const EXIT_CANNOT_EXECUTE: i32 = 126;
/// The command was not found.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;
/// Base added to the signal number when the child dies from a signal.
pub const EXIT_SIGNAL_BASE: i32 = 128;
