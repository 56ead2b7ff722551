// src/core/session.rs

use crate::{
    core::{
        inheritance,
        loader::{self, ProfileCatalog, ProfileId, SchemaError, SearchPath},
        merge::{self, OverrideConflictError},
        resolver::{self, ResolveError},
    },
    models::{IsolationMode, ResolvedEnvironment, Session},
    system::host::{HostEnv, HostView},
};
use std::collections::BTreeSet;
use thiserror::Error;

/// Any failure of the load / merge / resolve pipeline.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Conflict(#[from] OverrideConflictError),
}

impl SessionError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Schema(e) => e.exit_code(),
            Self::Resolve(e) => e.exit_code(),
            Self::Conflict(e) => e.exit_code(),
        }
    }
}

/// Loads, merges and resolves the profiles of a session.
///
/// Nothing is executed and nothing outside the profile files is touched; the
/// host environment is only read through `host`.
pub fn resolve_session(
    session: &Session,
    search: &SearchPath,
    host: &HostEnv,
) -> Result<ResolvedEnvironment, SessionError> {
    log::debug!(
        "Resolving session [{}] in {} mode",
        session
            .profiles
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        session.mode
    );
    let (catalog, requested) = loader::load_catalog(&session.profiles, search)?;
    resolve_loaded(&catalog, &requested, session.mode, &session.allow_host, host)
}

/// Resolves profiles that are already in a catalog.
pub fn resolve_loaded(
    catalog: &ProfileCatalog,
    requested: &[ProfileId],
    mode: IsolationMode,
    allow_host: &BTreeSet<String>,
    host: &HostEnv,
) -> Result<ResolvedEnvironment, SessionError> {
    let stack = inheritance::session_stack(catalog, requested)?;
    let merged = merge::compose(catalog, &stack)?;
    let resolution = resolver::resolve(&merged, HostView::new(host, mode, allow_host))?;

    log::info!(
        "Resolved {} variables ({} unset) from {} layers",
        resolution.variables.len(),
        resolution.unset.len(),
        merged.layers.len()
    );
    Ok(ResolvedEnvironment {
        profiles: requested
            .iter()
            .map(|&id| catalog.name(id).to_string())
            .collect(),
        layers: merged.layers,
        mode,
        variables: resolution.variables,
        unset: resolution.unset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loader::parse_document;
    use crate::models::ProfileRef;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn catalog(docs: &[serde_json::Value]) -> ProfileCatalog {
        let profiles = docs
            .iter()
            .map(|doc| {
                let name = doc["name"].as_str().expect("name");
                parse_document(&doc.to_string(), &PathBuf::from(format!("{}.json", name)))
                    .expect("valid")
            })
            .collect();
        ProfileCatalog::from_profiles(profiles).expect("catalog")
    }

    fn ids(catalog: &ProfileCatalog, names: &[&str]) -> Vec<ProfileId> {
        names
            .iter()
            .map(|n| catalog.id_of(n).expect("known"))
            .collect()
    }

    fn run(
        catalog: &ProfileCatalog,
        names: &[&str],
        mode: IsolationMode,
        host: &HostEnv,
    ) -> Result<ResolvedEnvironment, SessionError> {
        resolve_loaded(catalog, &ids(catalog, names), mode, &BTreeSet::new(), host)
    }

    fn base_and_prod() -> ProfileCatalog {
        catalog(&[
            serde_json::json!({ "name": "base", "variables": [
                { "key": "HOST", "value": "api.example.com" },
                { "key": "URL", "value": "https://${HOST}/v1" }
            ]}),
            serde_json::json!({ "name": "prod", "extends": ["base"], "variables": [
                { "key": "HOST", "value": "prod.example.com" }
            ]}),
        ])
    }

    #[test]
    fn test_prod_overlay_rewrites_url_through_inheritance() {
        let cat = base_and_prod();
        let env = run(&cat, &["prod"], IsolationMode::Isolated, &HostEnv::default())
            .expect("resolves");

        assert_eq!(env.get("URL"), Some("https://prod.example.com/v1"));
        assert_eq!(env.layers, vec!["base", "prod"]);
        assert_eq!(env.profiles, vec!["prod"]);
    }

    #[test]
    fn test_prod_overlay_rewrites_url_when_listed_explicitly() {
        let cat = base_and_prod();
        let env = run(&cat, &["base", "prod"], IsolationMode::Isolated, &HostEnv::default())
            .expect("resolves");
        assert_eq!(env.get("URL"), Some("https://prod.example.com/v1"));
    }

    #[test]
    fn test_later_profile_wins_regardless_of_declaration_order() {
        let cat = catalog(&[
            serde_json::json!({ "name": "a", "variables": [
                { "key": "X", "value": "from-a" },
                { "key": "K", "value": "a" }
            ]}),
            serde_json::json!({ "name": "b", "variables": [
                { "key": "K", "value": "b" },
                { "key": "Y", "value": "from-b" }
            ]}),
        ]);
        let host = HostEnv::default();

        let ab = run(&cat, &["a", "b"], IsolationMode::Isolated, &host).expect("resolves");
        let ba = run(&cat, &["b", "a"], IsolationMode::Isolated, &host).expect("resolves");
        assert_eq!(ab.get("K"), Some("b"));
        assert_eq!(ba.get("K"), Some("a"));
        assert_eq!(ab.variables.get("K").expect("K").provenance.shadowed, vec!["a"]);
    }

    #[test]
    fn test_lock_in_earlier_profile_rejects_later_override() {
        let cat = catalog(&[
            serde_json::json!({ "name": "a", "variables": [
                { "key": "REGION", "value": "eu-west-1", "locked": true }
            ]}),
            serde_json::json!({ "name": "b", "variables": [
                { "key": "REGION", "value": "us-east-1" }
            ]}),
        ]);
        let err = run(&cat, &["a", "b"], IsolationMode::Isolated, &HostEnv::default())
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(ref c) if c.key == "REGION"));
        assert_eq!(err.exit_code(), crate::constants::EXIT_OVERRIDE_CONFLICT);
    }

    #[test]
    fn test_locked_key_cannot_be_undone_by_host_in_inherit_mode() {
        let cat = catalog(&[serde_json::json!({ "name": "a", "variables": [
            { "key": "REGION", "value": "eu-west-1", "locked": true }
        ]})]);
        let host = HostEnv::from_pairs([("REGION", "us-east-1")]);
        let env = run(&cat, &["a"], IsolationMode::Inherit, &host).expect("resolves");
        assert_eq!(env.get("REGION"), Some("eu-west-1"));
    }

    #[test]
    fn test_cycle_is_reported_before_anything_else() {
        let cat = catalog(&[serde_json::json!({ "name": "x", "variables": [
            { "key": "A", "value": "${B}" },
            { "key": "B", "value": "${A}" }
        ]})]);
        let err = run(&cat, &["x"], IsolationMode::Isolated, &HostEnv::default()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Resolve(ResolveError::CyclicReference { ref cycle })
                if cycle == &vec!["A".to_string(), "B".to_string()]
        ));
        assert_eq!(err.exit_code(), crate::constants::EXIT_CYCLIC_REFERENCE);
    }

    #[test]
    fn test_resolving_twice_is_identical() {
        let cat = base_and_prod();
        let host = HostEnv::from_pairs([("HOME", "/home/dev")]);
        let first = run(&cat, &["prod"], IsolationMode::Inherit, &host).expect("resolves");
        let second = run(&cat, &["prod"], IsolationMode::Inherit, &host).expect("resolves");
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).expect("json"),
            serde_json::to_string(&second).expect("json")
        );
    }

    #[test]
    fn test_resolve_session_reads_profiles_from_disk() {
        // --- Setup ---
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("base.json"),
            r#"{ "name": "base", "variables": [ { "key": "HOST", "value": "api.example.com" },
                                                 { "key": "URL", "value": "https://${HOST}/v1" } ] }"#,
        )
        .expect("write");
        fs::write(
            dir.path().join("prod.json"),
            r#"{ "name": "prod", "extends": ["base"],
                 "variables": [ { "key": "HOST", "value": "prod.example.com" } ] }"#,
        )
        .expect("write");
        let session = Session {
            profiles: vec![ProfileRef::Name("prod".into())],
            mode: IsolationMode::Isolated,
            allow_host: BTreeSet::new(),
            cwd: dir.path().to_path_buf(),
            command: vec![],
        };
        let search = SearchPath::new(vec![dir.path().to_path_buf()]);

        // --- Execute ---
        let env = resolve_session(&session, &search, &HostEnv::default()).expect("resolves");

        // --- Assert ---
        assert_eq!(env.get("URL"), Some("https://prod.example.com/v1"));
        assert_eq!(env.variables.get("HOST").expect("HOST").provenance.profile, "prod");
    }

    #[test]
    fn test_missing_profile_is_a_schema_failure() {
        let dir = tempdir().expect("tempdir");
        let session = Session {
            profiles: vec![ProfileRef::Name("ghost".into())],
            mode: IsolationMode::Isolated,
            allow_host: BTreeSet::new(),
            cwd: dir.path().to_path_buf(),
            command: vec![],
        };
        let search = SearchPath::new(vec![dir.path().to_path_buf()]);
        let err = resolve_session(&session, &search, &HostEnv::default()).unwrap_err();
        assert_eq!(err.exit_code(), crate::constants::EXIT_SCHEMA);
    }
}
