// src/core/inheritance.rs

use crate::core::{
    loader::{ProfileCatalog, ProfileId},
    resolver::ResolveError,
};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Fails if `root` can reach itself through `extends`.
///
/// Parents are walked in declared order, so the reported cycle starts at the
/// first profile that is visited twice.
pub fn check_acyclic(catalog: &ProfileCatalog, root: ProfileId) -> Result<(), ResolveError> {
    let mut marks = HashMap::new();
    let mut path = Vec::new();
    visit(catalog, root, &mut marks, &mut path).map_err(|cycle| ResolveError::CyclicInheritance {
        cycle: cycle
            .into_iter()
            .map(|id| catalog.name(id).to_string())
            .collect(),
    })
}

fn visit(
    catalog: &ProfileCatalog,
    id: ProfileId,
    marks: &mut HashMap<ProfileId, Mark>,
    path: &mut Vec<ProfileId>,
) -> Result<(), Vec<ProfileId>> {
    marks.insert(id, Mark::Visiting);
    path.push(id);
    for &parent in catalog.parents(id) {
        match marks.get(&parent) {
            Some(Mark::Done) => continue,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|&p| p == parent).unwrap_or(0);
                return Err(path.get(start..).unwrap_or_default().to_vec());
            }
            None => visit(catalog, parent, marks, path)?,
        }
    }
    path.pop();
    marks.insert(id, Mark::Done);
    Ok(())
}

/// Lookup order for `root`: the profile itself, then its ancestors.
///
/// Every profile comes before all of its own parents. Among the profiles that
/// are free to go next, the one closest to `root` wins, then the one whose
/// `extends` entry was declared first.
pub fn lookup_order(
    catalog: &ProfileCatalog,
    root: ProfileId,
) -> Result<Vec<ProfileId>, ResolveError> {
    check_acyclic(catalog, root)?;

    // --- Distance and discovery order (breadth-first) ---
    let mut rank: HashMap<ProfileId, (usize, usize)> = HashMap::new();
    let mut queue = VecDeque::from([(root, 0usize)]);
    rank.insert(root, (0, 0));
    while let Some((id, depth)) = queue.pop_front() {
        for &parent in catalog.parents(id) {
            if !rank.contains_key(&parent) {
                let discovered = rank.len();
                rank.insert(parent, (depth + 1, discovered));
                queue.push_back((parent, depth + 1));
            }
        }
    }

    // --- Topological order (children first) ---
    let mut pending_children: HashMap<ProfileId, usize> = rank.keys().map(|&id| (id, 0)).collect();
    for &id in rank.keys() {
        for parent in catalog.parents(id) {
            if let Some(count) = pending_children.get_mut(parent) {
                *count += 1;
            }
        }
    }

    let mut ready = BTreeSet::new();
    ready.insert((0usize, 0usize, root));
    let mut order = Vec::with_capacity(rank.len());
    while let Some(next) = ready.pop_first() {
        let (_, _, id) = next;
        order.push(id);
        for parent in catalog.parents(id) {
            let Some(count) = pending_children.get_mut(parent) else {
                continue;
            };
            *count = count.saturating_sub(1);
            if *count == 0 {
                if let Some(&(depth, discovered)) = rank.get(parent) {
                    ready.insert((depth, discovered, *parent));
                }
            }
        }
    }

    Ok(order)
}

/// The layer stack of a single profile: its most distant ancestors first, itself last.
pub fn linearize(catalog: &ProfileCatalog, root: ProfileId) -> Result<Vec<ProfileId>, ResolveError> {
    let mut order = lookup_order(catalog, root)?;
    order.reverse();
    Ok(order)
}

/// The layer stack of a whole session, lowest precedence first.
///
/// Each session profile contributes its own stack. A profile is applied only
/// once; if it is also named explicitly later in the session, it is applied
/// at that later position instead, so later session entries always sit
/// above earlier ones.
pub fn session_stack(
    catalog: &ProfileCatalog,
    session: &[ProfileId],
) -> Result<Vec<ProfileId>, ResolveError> {
    let last_position: HashMap<ProfileId, usize> = session
        .iter()
        .enumerate()
        .map(|(position, &id)| (id, position))
        .collect();

    let mut applied = HashSet::new();
    let mut stack = Vec::new();
    for (position, &id) in session.iter().enumerate() {
        for layer in linearize(catalog, id)? {
            if last_position.get(&layer).is_some_and(|&last| last > position) {
                continue;
            }
            if applied.insert(layer) {
                stack.push(layer);
            }
        }
    }

    log::debug!(
        "Layer stack: {}",
        stack
            .iter()
            .map(|&id| catalog.name(id))
            .collect::<Vec<_>>()
            .join(" < ")
    );
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loader::parse_document;
    use std::path::PathBuf;

    fn catalog(docs: &[(&str, &[&str])]) -> ProfileCatalog {
        let profiles = docs
            .iter()
            .map(|(name, extends)| {
                let doc = serde_json::json!({ "name": name, "extends": extends }).to_string();
                parse_document(&doc, &PathBuf::from(format!("{}.json", name))).expect("valid")
            })
            .collect();
        ProfileCatalog::from_profiles(profiles).expect("catalog")
    }

    fn names(catalog: &ProfileCatalog, ids: &[ProfileId]) -> Vec<String> {
        ids.iter().map(|&id| catalog.name(id).to_string()).collect()
    }

    fn id(catalog: &ProfileCatalog, name: &str) -> ProfileId {
        catalog.id_of(name).expect("known profile")
    }

    #[test]
    fn test_single_chain_puts_ancestors_at_the_bottom() {
        let cat = catalog(&[("root", &[]), ("base", &["root"]), ("prod", &["base"])]);
        let stack = linearize(&cat, id(&cat, "prod")).expect("acyclic");
        assert_eq!(names(&cat, &stack), vec!["root", "base", "prod"]);
    }

    #[test]
    fn test_closest_ancestor_and_declared_order_win_lookup() {
        // app extends [web, db]; both extend common.
        let cat = catalog(&[
            ("common", &[]),
            ("web", &["common"]),
            ("db", &["common"]),
            ("app", &["web", "db"]),
        ]);
        let order = lookup_order(&cat, id(&cat, "app")).expect("acyclic");
        assert_eq!(names(&cat, &order), vec!["app", "web", "db", "common"]);
    }

    #[test]
    fn test_parent_never_precedes_its_own_child() {
        // `top` lists `low` first, but `mid` extends `low` and must stay above it.
        let cat = catalog(&[("low", &[]), ("mid", &["low"]), ("top", &["low", "mid"])]);
        let order = lookup_order(&cat, id(&cat, "top")).expect("acyclic");
        assert_eq!(names(&cat, &order), vec!["top", "mid", "low"]);
    }

    #[test]
    fn test_self_extension_is_a_cycle() {
        let cat = catalog(&[("loop", &["loop"])]);
        let err = linearize(&cat, id(&cat, "loop")).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::CyclicInheritance { ref cycle } if cycle == &vec!["loop".to_string()]
        ));
    }

    #[test]
    fn test_transitive_cycle_names_members_in_visit_order() {
        let cat = catalog(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &["a"])]);
        let err = linearize(&cat, id(&cat, "d")).unwrap_err();
        match err {
            ResolveError::CyclicInheritance { cycle } => assert_eq!(cycle, vec!["a", "b", "c"]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_session_stack_shares_common_ancestors_once() {
        let cat = catalog(&[("x", &[]), ("base", &["x"]), ("other", &["x"])]);
        let stack =
            session_stack(&cat, &[id(&cat, "base"), id(&cat, "other")]).expect("acyclic");
        assert_eq!(names(&cat, &stack), vec!["x", "base", "other"]);
    }

    #[test]
    fn test_session_order_overrides_inheritance_position() {
        // `prod` extends `base`, but the session asks for `base` last.
        let cat = catalog(&[("base", &[]), ("prod", &["base"])]);
        let stack = session_stack(&cat, &[id(&cat, "prod"), id(&cat, "base")]).expect("ok");
        assert_eq!(names(&cat, &stack), vec!["prod", "base"]);
    }

    #[test]
    fn test_repeated_session_entry_is_applied_at_last_position() {
        let cat = catalog(&[("a", &[]), ("b", &[])]);
        let stack = session_stack(&cat, &[id(&cat, "a"), id(&cat, "b"), id(&cat, "a")])
            .expect("ok");
        assert_eq!(names(&cat, &stack), vec!["b", "a"]);
    }
}
