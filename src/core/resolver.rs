// src/core/resolver.rs

use crate::{
    constants::{EXIT_CYCLIC_REFERENCE, EXIT_UNRESOLVED_VARIABLE},
    core::merge::{Declaration, MergedLayers},
    models::{EntryAction, ListEdit, ResolvedVariable, Segment},
    system::host::HostView,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Circular reference between variables: {}", format_cycle(.cycle))]
    CyclicReference { cycle: Vec<String> },
    #[error("Circular inheritance between profiles: {}", format_cycle(.cycle))]
    CyclicInheritance { cycle: Vec<String> },
    #[error(
        "Variable '{key}' is not defined (referenced by '{referenced_by}' in profile '{profile}')."
    )]
    UnresolvedVariable {
        key: String,
        profile: String,
        referenced_by: String,
    },
}

impl ResolveError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CyclicReference { .. } | Self::CyclicInheritance { .. } => EXIT_CYCLIC_REFERENCE,
            Self::UnresolvedVariable { .. } => EXIT_UNRESOLVED_VARIABLE,
        }
    }
}

/// Renders `[a, b]` as `a -> b -> a`.
fn format_cycle(cycle: &[String]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(String::as_str).collect();
    if let Some(first) = cycle.first() {
        parts.push(first);
    }
    parts.join(" -> ")
}

/// A graph node: one declaration of a key.
type Node<'a> = (&'a str, usize);

#[derive(Debug, Clone, Default)]
struct Expanded {
    value: String,
    host_inputs: BTreeSet<String>,
    /// The declaration removes the key; there is no value to read.
    removed: bool,
}

/// A declaration whose expansion is in progress.
struct Frame<'a> {
    node: Node<'a>,
    declaration: &'a Declaration,
    /// Next template segment to expand. Equal to the segment count once only
    /// the list base (for prepend/append) is left.
    next: usize,
    out: Expanded,
}

enum Step<'a> {
    /// The frame's value is complete.
    Done,
    /// The frame needs this declaration expanded first.
    Needs(Node<'a>),
}

struct Expander<'a> {
    merged: &'a MergedLayers,
    host: HostView<'a>,
    memo: HashMap<Node<'a>, Expanded>,
}

impl<'a> Expander<'a> {
    /// Depth-first, post-order expansion of one declaration.
    ///
    /// The walk keeps its own stack of frames, so the length of a reference
    /// chain is bounded by memory rather than by the thread's stack.
    fn expand(&mut self, root: Node<'a>) -> Result<Expanded, ResolveError> {
        let mut stack: Vec<Frame<'a>> = Vec::new();
        let mut on_path: HashSet<Node<'a>> = HashSet::new();
        self.enter(root, &mut stack, &mut on_path);

        while let Some(frame) = stack.last_mut() {
            match self.advance(frame)? {
                Step::Needs(target) => {
                    if on_path.contains(&target) {
                        return Err(cycle_from(&stack, target));
                    }
                    self.enter(target, &mut stack, &mut on_path);
                }
                Step::Done => {
                    if let Some(frame) = stack.pop() {
                        on_path.remove(&frame.node);
                        let (key, position) = frame.node;
                        log::trace!("{}[{}] = {:?}", key, position, frame.out.value);
                        self.memo.insert(frame.node, frame.out);
                    }
                }
            }
        }
        Ok(self.memo.get(&root).cloned().unwrap_or_default())
    }

    /// Pushes a frame for `node`, or memoizes an empty value if it does not exist.
    fn enter(
        &mut self,
        node: Node<'a>,
        stack: &mut Vec<Frame<'a>>,
        on_path: &mut HashSet<Node<'a>>,
    ) {
        if self.memo.contains_key(&node) {
            return;
        }
        let merged = self.merged;
        let (key, position) = node;
        match merged.declarations.get(key).and_then(|d| d.get(position)) {
            Some(declaration) => {
                on_path.insert(node);
                stack.push(Frame {
                    node,
                    declaration,
                    next: 0,
                    out: Expanded::default(),
                });
            }
            None => {
                self.memo.insert(node, Expanded::default());
            }
        }
    }

    /// Expands as much of `frame` as the memo allows.
    fn advance(&self, frame: &mut Frame<'a>) -> Result<Step<'a>, ResolveError> {
        let (key, position) = frame.node;
        let declaration = frame.declaration;
        if declaration.action == EntryAction::Unset {
            frame.out.removed = true;
            return Ok(Step::Done);
        }

        while let Some(segment) = declaration.template.segments.get(frame.next) {
            match segment {
                Segment::Literal(text) => frame.out.value.push_str(text),
                Segment::Reference(name) => match self.target_of(key, position, name) {
                    Some(target) => {
                        let Some(inner) = self.memo.get(&target) else {
                            return Ok(Step::Needs(target));
                        };
                        if inner.removed {
                            return Err(self.unresolved(name, frame));
                        }
                        frame.out.value.push_str(&inner.value);
                        frame.out.host_inputs.extend(inner.host_inputs.iter().cloned());
                    }
                    None => match self.host.get(name) {
                        Some(value) => {
                            frame.out.value.push_str(value);
                            frame.out.host_inputs.insert(name.to_string());
                        }
                        None => return Err(self.unresolved(name, frame)),
                    },
                },
            }
            frame.next += 1;
        }

        let (edit, prepend) = match &declaration.action {
            EntryAction::Prepend(edit) => (edit, true),
            EntryAction::Append(edit) => (edit, false),
            EntryAction::Set | EntryAction::Unset => return Ok(Step::Done),
        };

        // The list being edited: the declaration below, else the host value.
        let base = match position.checked_sub(1) {
            Some(below) => {
                let Some(inner) = self.memo.get(&(key, below)) else {
                    return Ok(Step::Needs((key, below)));
                };
                if inner.removed {
                    None
                } else {
                    frame.out.host_inputs.extend(inner.host_inputs.iter().cloned());
                    Some(inner.value.clone())
                }
            }
            None => self.host.get(key).map(|value| {
                frame.out.host_inputs.insert(key.to_string());
                value.to_string()
            }),
        };
        frame.out.value = edit_list(edit, prepend, &frame.out.value, base.as_deref());
        Ok(Step::Done)
    }

    fn unresolved(&self, name: &str, frame: &Frame<'a>) -> ResolveError {
        ResolveError::UnresolvedVariable {
            key: name.to_string(),
            profile: self.merged.layer_name(frame.declaration.layer).to_string(),
            referenced_by: frame.node.0.to_string(),
        }
    }

    /// The declaration a `${name}` inside declaration `(key, position)` refers to.
    ///
    /// A key referring to itself sees the declaration it shadows; any other
    /// name sees the top-most declaration in the stack.
    fn target_of(&self, key: &'a str, position: usize, name: &str) -> Option<Node<'a>> {
        if name == key {
            return position.checked_sub(1).map(|below| (key, below));
        }
        let (target, declarations) = self.merged.declarations.get_key_value(name)?;
        let top = declarations.len().checked_sub(1)?;
        Some((target.as_str(), top))
    }
}

/// The keys on the stack from the first visit of `target`, each named once.
fn cycle_from(stack: &[Frame<'_>], target: Node<'_>) -> ResolveError {
    let start = stack.iter().position(|f| f.node == target).unwrap_or(0);
    let mut cycle: Vec<String> = Vec::new();
    for frame in stack.get(start..).unwrap_or_default() {
        let key = frame.node.0;
        if !cycle.iter().any(|k| k == key) {
            cycle.push(key.to_string());
        }
    }
    ResolveError::CyclicReference { cycle }
}

/// Joins `value` onto `base` with the edit's separator.
///
/// An absent or empty base leaves just `value`. With `dedup`, empty elements
/// are dropped and only the first occurrence of each element is kept.
fn edit_list(edit: &ListEdit, prepend: bool, value: &str, base: Option<&str>) -> String {
    let sep = edit.separator.as_str();
    let joined = match base {
        None | Some("") => value.to_string(),
        Some(base) if prepend => format!("{}{}{}", value, sep, base),
        Some(base) => format!("{}{}{}", base, sep, value),
    };
    if !edit.dedup {
        return joined;
    }
    let mut seen = HashSet::new();
    joined
        .split(sep)
        .filter(|part| !part.is_empty() && seen.insert(*part))
        .collect::<Vec<_>>()
        .join(sep)
}

/// Fully expanded variables plus the keys removed from the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub variables: BTreeMap<String, ResolvedVariable>,
    /// Sorted.
    pub unset: Vec<String>,
}

/// Expands every effective key of the merged stack into its final value.
///
/// Keys are visited in sorted order and references left to right, so both
/// the result and the first reported cycle are independent of how the
/// profiles were written. Only the effective declarations and what they
/// depend on are evaluated.
pub fn resolve(merged: &MergedLayers, host: HostView<'_>) -> Result<Resolution, ResolveError> {
    let mut expander = Expander {
        merged,
        host,
        memo: HashMap::new(),
    };

    let mut resolution = Resolution::default();
    for key in merged.declarations.keys() {
        let Some((top, declaration)) = merged.effective(key) else {
            continue;
        };
        if declaration.action == EntryAction::Unset {
            resolution.unset.push(key.clone());
            continue;
        }
        let expanded = expander.expand((key.as_str(), top))?;
        let mut provenance = merged.provenance(key).unwrap_or_default();
        provenance.host_inputs = expanded.host_inputs.into_iter().collect();
        resolution.variables.insert(
            key.clone(),
            ResolvedVariable {
                value: expanded.value,
                provenance,
            },
        );
    }
    Ok(resolution)
}
