// src/core/merge.rs

use crate::{
    constants::EXIT_OVERRIDE_CONFLICT,
    core::loader::{ProfileCatalog, ProfileId},
    models::{EntryAction, Provenance, Template},
};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Key '{key}' is locked by profile '{locked_by}' and cannot be overridden by '{overridden_by}'.")]
pub struct OverrideConflictError {
    pub key: String,
    pub locked_by: String,
    pub overridden_by: String,
}

impl OverrideConflictError {
    pub fn exit_code(&self) -> i32 {
        EXIT_OVERRIDE_CONFLICT
    }
}

/// One profile's declaration of a key, positioned in the layer stack.
#[derive(Debug, Clone)]
pub struct Declaration {
    /// Index into [`MergedLayers::layers`].
    pub layer: usize,
    pub template: Template,
    pub locked: bool,
    pub action: EntryAction,
}

/// Every declaration of every key across the layer stack.
///
/// Declarations of a key are kept bottom to top, so the last one is the
/// effective value and the ones below it are what a self-reference sees.
#[derive(Debug, Clone, Default)]
pub struct MergedLayers {
    /// Profile names, lowest precedence first.
    pub layers: Vec<String>,
    pub declarations: BTreeMap<String, Vec<Declaration>>,
}

impl MergedLayers {
    pub fn layer_name(&self, layer: usize) -> &str {
        self.layers.get(layer).map_or("<unknown>", String::as_str)
    }

    /// The winning declaration of `key` and its position among the key's declarations.
    pub fn effective(&self, key: &str) -> Option<(usize, &Declaration)> {
        let declarations = self.declarations.get(key)?;
        let top = declarations.len().checked_sub(1)?;
        declarations.get(top).map(|declaration| (top, declaration))
    }

    /// Which profile supplies `key` and which ones it shadows.
    pub fn provenance(&self, key: &str) -> Option<Provenance> {
        let declarations = self.declarations.get(key)?;
        let (top, shadowed) = declarations.split_last()?;
        Some(Provenance {
            profile: self.layer_name(top.layer).to_string(),
            shadowed: shadowed
                .iter()
                .map(|d| self.layer_name(d.layer).to_string())
                .collect(),
            host_inputs: Vec::new(),
        })
    }
}

/// Stacks the profiles' declarations in layer order and enforces locks.
///
/// A locked declaration may not be followed by any higher declaration of the
/// same key. Keys are checked in sorted order, so the reported conflict is the
/// same no matter how the profiles were written.
pub fn compose(
    catalog: &ProfileCatalog,
    stack: &[ProfileId],
) -> Result<MergedLayers, OverrideConflictError> {
    let mut merged = MergedLayers::default();

    for (layer, &id) in stack.iter().enumerate() {
        let Some(profile) = catalog.profile(id) else {
            continue;
        };
        merged.layers.push(profile.name.clone());
        for entry in &profile.variables {
            merged
                .declarations
                .entry(entry.key.clone())
                .or_default()
                .push(Declaration {
                    layer,
                    template: entry.template.clone(),
                    locked: entry.locked,
                    action: entry.action.clone(),
                });
        }
    }

    for (key, declarations) in &merged.declarations {
        let locked = declarations
            .iter()
            .zip(declarations.iter().skip(1))
            .find(|(lower, _)| lower.locked);
        if let Some((lower, higher)) = locked {
            return Err(OverrideConflictError {
                key: key.clone(),
                locked_by: merged.layer_name(lower.layer).to_string(),
                overridden_by: merged.layer_name(higher.layer).to_string(),
            });
        }
    }

    log::debug!(
        "Merged {} keys from {} layers",
        merged.declarations.len(),
        merged.layers.len()
    );
    Ok(merged)
}
