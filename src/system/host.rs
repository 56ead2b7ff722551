// src/system/host.rs

use crate::models::IsolationMode;
use std::collections::{BTreeMap, BTreeSet};

/// Read-only snapshot of the host environment, captured once per invocation.
///
/// Resolution and execution only see the host through this value, so tests
/// can hand in any environment they like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnv {
    vars: BTreeMap<String, String>,
}

impl HostEnv {
    /// Captures the current process environment. Non UTF-8 entries are skipped.
    pub fn capture() -> Self {
        let mut skipped = 0usize;
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                _ => {
                    skipped += 1;
                    None
                }
            })
            .collect();
        if skipped > 0 {
            log::debug!("Ignored {} non UTF-8 host variables", skipped);
        }
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }
}

/// The part of the host a resolution is allowed to read.
#[derive(Debug, Clone, Copy)]
pub struct HostView<'a> {
    host: &'a HostEnv,
    mode: IsolationMode,
    allow: &'a BTreeSet<String>,
}

impl<'a> HostView<'a> {
    pub fn new(host: &'a HostEnv, mode: IsolationMode, allow: &'a BTreeSet<String>) -> Self {
        Self { host, mode, allow }
    }

    /// Inherit mode reads any host variable; isolated mode only allow-listed ones.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        match self.mode {
            IsolationMode::Inherit => self.host.get(key),
            IsolationMode::Isolated if self.allow.contains(key) => self.host.get(key),
            IsolationMode::Isolated => None,
        }
    }
}
