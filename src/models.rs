// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

// --- Profile documents (as written on disk) ---

/// A profile document exactly as it appears in a `.json` file.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ProfileDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub variables: Vec<VariableDocument>,
    /// Edits applied on top of what lower layers or the host provide.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ops: Vec<OpDocument>,
}

/// One `{ "key": ..., "value": ..., "locked": ... }` entry of a profile document.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct VariableDocument {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub locked: bool,
}

/// One entry of a profile's `ops` list, tagged by `"op"`.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum OpDocument {
    /// Puts `value` in front of the list held by `key`.
    Prepend {
        key: String,
        value: String,
        /// `"os"` (the default) is the platform's path-list separator.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        separator: Option<String>,
        #[serde(default)]
        dedup: bool,
    },
    /// Puts `value` at the end of the list held by `key`.
    Append {
        key: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        separator: Option<String>,
        #[serde(default)]
        dedup: bool,
    },
    /// Removes `key` from the session, including an inherited host value.
    Unset { key: String },
}

// --- Validated profiles ---

/// One piece of a parsed value expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// A `${NAME}` reference to another variable.
    Reference(String),
}

/// A value expression split into literal text and references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub raw: String,
    pub segments: Vec<Segment>,
}

impl Template {
    /// Names referenced by this template, left to right (duplicates kept).
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Reference(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

/// Separator and duplicate handling of a list edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEdit {
    pub separator: String,
    /// Keep only the first occurrence of each element.
    pub dedup: bool,
}

/// How a declaration combines with the value below it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EntryAction {
    /// Replaces whatever is below.
    #[default]
    Set,
    Prepend(ListEdit),
    Append(ListEdit),
    /// Removes the key.
    Unset,
}

/// A single validated variable declaration.
#[derive(Debug, Clone)]
pub struct VariableEntry {
    pub key: String,
    /// Empty for [`EntryAction::Unset`].
    pub template: Template,
    pub locked: bool,
    pub action: EntryAction,
}

/// A schema-validated profile. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub description: Option<String>,
    /// Parent profile names, in declared order.
    pub extends: Vec<String>,
    /// Declarations in document order.
    pub variables: Vec<VariableEntry>,
    /// File the profile was read from.
    pub source: PathBuf,
}

/// How the user pointed at a profile on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProfileRef {
    /// Looked up as `<dir>/<name>.json` along the search path.
    Name(String),
    /// An explicit document path.
    Path(PathBuf),
}

impl fmt::Display for ProfileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{}", name),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

// --- Sessions ---

/// Whether the child process also sees the host environment.
#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// The child sees only the resolved variables.
    Isolated,
    /// Host variables pass through unless a profile defines them.
    #[default]
    Inherit,
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isolated => write!(f, "isolated"),
            Self::Inherit => write!(f, "inherit"),
        }
    }
}

/// One invocation: which profiles, how to isolate, and what to run where.
#[derive(Debug, Clone)]
pub struct Session {
    /// Profiles in application order; later entries take precedence.
    pub profiles: Vec<ProfileRef>,
    pub mode: IsolationMode,
    /// Host keys that references may read in isolated mode.
    pub allow_host: BTreeSet<String>,
    pub cwd: PathBuf,
    /// Program followed by its arguments. Empty when nothing is executed.
    pub command: Vec<String>,
}

// --- Resolution results ---

/// Where a resolved value came from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Provenance {
    /// The profile whose declaration supplied the final value.
    pub profile: String,
    /// Profiles whose declarations of the same key were shadowed, bottom to top.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shadowed: Vec<String>,
    /// Host variables the value read, directly or through other keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_inputs: Vec<String>,
}

/// A fully expanded variable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVariable {
    pub value: String,
    pub provenance: Provenance,
}

/// The output of a successful resolution: a key-sorted, fully expanded mapping.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    /// Profile names as requested for the session.
    pub profiles: Vec<String>,
    /// The applied layer stack, lowest precedence first.
    pub layers: Vec<String>,
    pub mode: IsolationMode,
    pub variables: BTreeMap<String, ResolvedVariable>,
    /// Keys removed by an `unset` op, sorted. Never present in the child environment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unset: Vec<String>,
}

impl ResolvedEnvironment {
    /// Plain `key -> value` view of the environment.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .map(|(key, var)| (key.clone(), var.value.clone()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(|var| var.value.as_str())
    }
}

/// What a command handler asks the process to do once it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exit with this code.
    Exit(i32),
    /// The child died from this signal; terminate the same way.
    Signaled(i32),
}
