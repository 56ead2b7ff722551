// src/core/loader.rs

use crate::{
    constants::{EXIT_SCHEMA, OS_LIST_SEPARATOR, PROFILE_EXTENSION},
    core::template::{self, TemplateError},
    models::{
        EntryAction, ListEdit, OpDocument, Profile, ProfileDocument, ProfileRef, Template,
        VariableEntry,
    },
};
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

lazy_static! {
    static ref PROFILE_NAME_RE: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid profile name regex");
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Could not read profile '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid profile document '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid profile name '{name}' in '{path}'.")]
    InvalidName { name: String, path: String },
    #[error("Profile file '{path}' declares name '{found}', expected '{expected}'.")]
    NameMismatch {
        path: String,
        expected: String,
        found: String,
    },
    #[error("Profile '{profile}' declares an invalid key '{key}'.")]
    InvalidKey { profile: String, key: String },
    #[error("Profile '{profile}' declares key '{key}' more than once.")]
    DuplicateKey { profile: String, key: String },
    #[error("Profile '{profile}' lists parent '{parent}' more than once.")]
    DuplicateParent { profile: String, parent: String },
    #[error("Profile '{profile}' has an invalid value for '{key}': {source}")]
    InvalidTemplate {
        profile: String,
        key: String,
        #[source]
        source: TemplateError,
    },
    #[error("Profile '{profile}' uses an empty list separator for '{key}'.")]
    EmptySeparator { profile: String, key: String },
    #[error("Profile '{name}' not found (searched: {searched}).")]
    ProfileNotFound { name: String, searched: String },
    #[error("Profile '{profile}' extends '{parent}', which was not found (searched: {searched}).")]
    UnknownParent {
        profile: String,
        parent: String,
        searched: String,
    },
    #[error("Profile name '{name}' is declared by both '{first}' and '{second}'.")]
    DuplicateProfile {
        name: String,
        first: String,
        second: String,
    },
}

impl SchemaError {
    pub fn exit_code(&self) -> i32 {
        EXIT_SCHEMA
    }
}

// --- Search path ---

/// Ordered list of directories where named profiles are looked up.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        let mut seen = HashSet::new();
        let dirs = dirs
            .into_iter()
            .filter(|dir| seen.insert(dir.clone()))
            .collect();
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// First `<dir>/<name>.json` that exists, in search order.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let file_name = format!("{}.{}", name, PROFILE_EXTENSION);
        self.dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
    }

    fn describe(&self) -> String {
        if self.dirs.is_empty() {
            return "<no profile directories>".to_string();
        }
        self.dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Interprets a command-line profile argument.
///
/// Anything that looks like a file (`.json` suffix or a path separator) is a
/// path; everything else is a profile name.
pub fn parse_profile_ref(arg: &str) -> ProfileRef {
    let looks_like_path = arg.ends_with(&format!(".{}", PROFILE_EXTENSION))
        || arg.contains('/')
        || arg.contains(std::path::MAIN_SEPARATOR);
    if looks_like_path {
        ProfileRef::Path(PathBuf::from(arg))
    } else {
        ProfileRef::Name(arg.to_string())
    }
}

// --- Single documents ---

/// Reads and validates one profile document.
pub fn read_profile(path: &Path) -> Result<Profile, SchemaError> {
    let content = fs::read_to_string(path).map_err(|e| SchemaError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let source = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    parse_document(&content, &source)
}

/// Parses and validates a profile document. `source` is recorded on the profile.
pub fn parse_document(content: &str, source: &Path) -> Result<Profile, SchemaError> {
    let document: ProfileDocument =
        serde_json::from_str(content).map_err(|e| SchemaError::Json {
            path: source.display().to_string(),
            source: e,
        })?;
    validate_document(document, source)
}

fn validate_document(document: ProfileDocument, source: &Path) -> Result<Profile, SchemaError> {
    let name = document.name;
    if !PROFILE_NAME_RE.is_match(&name) {
        return Err(SchemaError::InvalidName {
            name,
            path: source.display().to_string(),
        });
    }

    let mut parents = HashSet::new();
    for parent in &document.extends {
        if !PROFILE_NAME_RE.is_match(parent) {
            return Err(SchemaError::InvalidName {
                name: parent.clone(),
                path: source.display().to_string(),
            });
        }
        if !parents.insert(parent.as_str()) {
            return Err(SchemaError::DuplicateParent {
                profile: name,
                parent: parent.clone(),
            });
        }
    }

    // Plain variables and ops share one namespace: a profile declares a key once.
    let mut pending: Vec<(String, String, bool, EntryAction)> = document
        .variables
        .into_iter()
        .map(|entry| (entry.key, entry.value, entry.locked, EntryAction::Set))
        .collect();
    for op in document.ops {
        let entry = match op {
            OpDocument::Prepend {
                key,
                value,
                separator,
                dedup,
            } => {
                let edit = list_edit(&name, &key, separator, dedup)?;
                (key, value, false, EntryAction::Prepend(edit))
            }
            OpDocument::Append {
                key,
                value,
                separator,
                dedup,
            } => {
                let edit = list_edit(&name, &key, separator, dedup)?;
                (key, value, false, EntryAction::Append(edit))
            }
            OpDocument::Unset { key } => (key, String::new(), false, EntryAction::Unset),
        };
        pending.push(entry);
    }

    let mut keys = HashSet::new();
    let mut variables = Vec::with_capacity(pending.len());
    for (key, value, locked, action) in pending {
        if !template::is_valid_name(&key) {
            return Err(SchemaError::InvalidKey { profile: name, key });
        }
        if !keys.insert(key.clone()) {
            return Err(SchemaError::DuplicateKey { profile: name, key });
        }
        let parsed = if action == EntryAction::Unset {
            Template {
                raw: String::new(),
                segments: Vec::new(),
            }
        } else {
            match template::parse(&value) {
                Ok(parsed) => parsed,
                Err(e) => {
                    return Err(SchemaError::InvalidTemplate {
                        profile: name,
                        key,
                        source: e,
                    });
                }
            }
        };
        variables.push(VariableEntry {
            key,
            template: parsed,
            locked,
            action,
        });
    }

    Ok(Profile {
        name,
        description: document.description,
        extends: document.extends,
        variables,
        source: source.to_path_buf(),
    })
}

/// `None` and `"os"` mean the platform's path-list separator.
fn list_edit(
    profile: &str,
    key: &str,
    separator: Option<String>,
    dedup: bool,
) -> Result<ListEdit, SchemaError> {
    let separator = match separator.as_deref() {
        None | Some("os") => OS_LIST_SEPARATOR.to_string(),
        Some("") => {
            return Err(SchemaError::EmptySeparator {
                profile: profile.to_string(),
                key: key.to_string(),
            });
        }
        Some(other) => other.to_string(),
    };
    Ok(ListEdit { separator, dedup })
}

// --- Catalog ---

/// Index of a profile in a [`ProfileCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileId(pub usize);

#[derive(Debug, Clone)]
pub struct ProfileNode {
    pub profile: Profile,
    /// `extends` mapped to catalog indices, in declared order.
    pub parents: Vec<ProfileId>,
}

/// Every profile needed by a session, addressed by index and sorted by name.
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    nodes: Vec<ProfileNode>,
    by_name: HashMap<String, ProfileId>,
}

impl ProfileCatalog {
    pub fn node(&self, id: ProfileId) -> Option<&ProfileNode> {
        self.nodes.get(id.0)
    }

    pub fn profile(&self, id: ProfileId) -> Option<&Profile> {
        self.node(id).map(|node| &node.profile)
    }

    pub fn name(&self, id: ProfileId) -> &str {
        self.profile(id).map_or("<unknown>", |p| p.name.as_str())
    }

    pub fn parents(&self, id: ProfileId) -> &[ProfileId] {
        self.node(id)
            .map(|node| node.parents.as_slice())
            .unwrap_or_default()
    }

    pub fn id_of(&self, name: &str) -> Option<ProfileId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Builds a catalog from already validated profiles. Every parent must be present.
    pub fn from_profiles(profiles: Vec<Profile>) -> Result<Self, SchemaError> {
        let mut sorted: BTreeMap<String, Profile> = BTreeMap::new();
        for profile in profiles {
            if let Some(existing) = sorted.get(&profile.name) {
                if existing.source != profile.source {
                    return Err(SchemaError::DuplicateProfile {
                        name: profile.name.clone(),
                        first: existing.source.display().to_string(),
                        second: profile.source.display().to_string(),
                    });
                }
                continue;
            }
            sorted.insert(profile.name.clone(), profile);
        }

        let by_name: HashMap<String, ProfileId> = sorted
            .keys()
            .enumerate()
            .map(|(i, name)| (name.clone(), ProfileId(i)))
            .collect();

        let mut nodes = Vec::with_capacity(sorted.len());
        for profile in sorted.into_values() {
            let mut parents = Vec::with_capacity(profile.extends.len());
            for parent in &profile.extends {
                let Some(id) = by_name.get(parent) else {
                    return Err(SchemaError::UnknownParent {
                        profile: profile.name.clone(),
                        parent: parent.clone(),
                        searched: "<catalog>".to_string(),
                    });
                };
                parents.push(*id);
            }
            nodes.push(ProfileNode { profile, parents });
        }

        Ok(Self { nodes, by_name })
    }
}

/// A document waiting to be read during catalog loading.
#[derive(Debug, Clone)]
enum Pending {
    Requested(ProfileRef),
    Parent { name: String, child: String },
}

impl Pending {
    fn load(&self, search: &SearchPath) -> Result<Profile, SchemaError> {
        match self {
            Self::Requested(ProfileRef::Path(path)) => read_profile(path),
            Self::Requested(ProfileRef::Name(name)) => {
                let path = search
                    .locate(name)
                    .ok_or_else(|| SchemaError::ProfileNotFound {
                        name: name.clone(),
                        searched: search.describe(),
                    })?;
                read_named(name, &path)
            }
            Self::Parent { name, child } => {
                let path = search
                    .locate(name)
                    .ok_or_else(|| SchemaError::UnknownParent {
                        profile: child.clone(),
                        parent: name.clone(),
                        searched: search.describe(),
                    })?;
                read_named(name, &path)
            }
        }
    }
}

fn read_named(name: &str, path: &Path) -> Result<Profile, SchemaError> {
    let profile = read_profile(path)?;
    if profile.name != name {
        return Err(SchemaError::NameMismatch {
            path: path.display().to_string(),
            expected: name.to_string(),
            found: profile.name,
        });
    }
    Ok(profile)
}

/// Loads the requested profiles and all of their ancestors.
///
/// Documents are read one frontier at a time, each frontier in parallel.
/// Errors are checked in frontier order, so the reported failure does not
/// depend on thread scheduling. Returns the catalog and the ids of the
/// requested profiles in request order.
pub fn load_catalog(
    requests: &[ProfileRef],
    search: &SearchPath,
) -> Result<(ProfileCatalog, Vec<ProfileId>), SchemaError> {
    let mut loaded: BTreeMap<String, Profile> = BTreeMap::new();
    let mut requested_names = Vec::with_capacity(requests.len());
    let mut frontier: Vec<Pending> = requests.iter().cloned().map(Pending::Requested).collect();
    let mut depth = 0usize;

    while !frontier.is_empty() {
        log::debug!("Loading frontier {} ({} profiles)", depth, frontier.len());
        let results: Vec<Result<Profile, SchemaError>> =
            frontier.par_iter().map(|pending| pending.load(search)).collect();

        let mut next = Vec::new();
        let mut queued = HashSet::new();
        for (pending, result) in frontier.iter().zip(results) {
            let profile = result?;
            if matches!(pending, Pending::Requested(_)) {
                requested_names.push(profile.name.clone());
            }
            if let Some(existing) = loaded.get(&profile.name) {
                if existing.source != profile.source {
                    return Err(SchemaError::DuplicateProfile {
                        name: profile.name.clone(),
                        first: existing.source.display().to_string(),
                        second: profile.source.display().to_string(),
                    });
                }
                continue;
            }
            for parent in &profile.extends {
                if !loaded.contains_key(parent) && queued.insert(parent.clone()) {
                    next.push(Pending::Parent {
                        name: parent.clone(),
                        child: profile.name.clone(),
                    });
                }
            }
            log::trace!(
                "Loaded profile '{}' from {}",
                profile.name,
                profile.source.display()
            );
            loaded.insert(profile.name.clone(), profile);
        }

        next.retain(|pending| match pending {
            Pending::Parent { name, .. } => !loaded.contains_key(name),
            Pending::Requested(_) => true,
        });
        frontier = next;
        depth += 1;
    }

    let catalog = ProfileCatalog::from_profiles(loaded.into_values().collect())?;
    let ids = requested_names
        .iter()
        .filter_map(|name| catalog.id_of(name))
        .collect();
    Ok((catalog, ids))
}

/// Every profile document found directly inside the search directories.
///
/// Documents that fail validation are returned as errors rather than
/// aborting the scan. Names shadowed by an earlier directory are skipped.
pub fn discover(search: &SearchPath) -> Vec<(PathBuf, Result<Profile, SchemaError>)> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for dir in search.dirs() {
        if !dir.is_dir() {
            log::debug!("Skipping missing profile directory {}", dir.display());
            continue;
        }
        let entries = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry.path().extension().and_then(|e| e.to_str()) == Some(PROFILE_EXTENSION)
            });
        for entry in entries {
            let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !seen.insert(stem.to_string()) {
                log::debug!("'{}' is shadowed by an earlier directory", entry.path().display());
                continue;
            }
            let path = entry.path().to_path_buf();
            let result = read_named(stem, &path);
            found.push((path, result));
        }
    }
    found
}
