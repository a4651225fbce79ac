//! Object naming - stable paths for live nodes
//!
//! A node's segment is its explicit name, or a positional fallback
//! `<TypeTag><ordinal>` when unnamed. The ordinal counts preceding siblings
//! with the same tag and the same visibility, so visible and invisible
//! nodes are numbered independently and reordering one class never shifts
//! the other.

use crate::error::{Error, Result};
use crate::host::Host;
use crate::node::NodeId;
use crate::path::{is_positional, positional_name, ObjectPath};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

pub struct ObjectNaming {
    host: Rc<dyn Host>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Path of the parent whose child is badly named.
    pub parent: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum ViolationKind {
    Unnamed { tag: String },
    Duplicate { name: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::Unnamed { tag } => {
                write!(f, "{}: unnamed child of type {}", self.parent, tag)
            }
            ViolationKind::Duplicate { name } => {
                write!(f, "{}: duplicate child name `{}`", self.parent, name)
            }
        }
    }
}

impl ObjectNaming {
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    /// Siblings of `node` in toolkit order, top-level roots for a root.
    fn siblings(&self, node: NodeId) -> Vec<NodeId> {
        match self.host.parent(node) {
            Some(p) => self.host.children(p),
            None => self.host.top_level(),
        }
    }

    /// Segment names for a sibling list, computed in one pass.
    fn segment_names(&self, siblings: &[NodeId]) -> Vec<Option<String>> {
        let mut counters: HashMap<(String, bool), usize> = HashMap::new();
        siblings
            .iter()
            .map(|&n| {
                let tag = self.host.type_tag(n);
                let visible = self.host.is_visible(n);
                let ordinal = counters.entry((tag.clone(), visible)).or_insert(0);
                let this = *ordinal;
                *ordinal += 1;

                let name = self.host.name(n);
                if !name.is_empty() {
                    Some(name)
                } else if tag.is_empty() {
                    None
                } else {
                    Some(positional_name(&tag, this, visible))
                }
            })
            .collect()
    }

    /// The segment `node` contributes to its path.
    pub fn segment(&self, node: NodeId) -> Option<String> {
        let siblings = self.siblings(node);
        let idx = siblings.iter().position(|&s| s == node)?;
        self.segment_names(&siblings).swap_remove(idx)
    }

    pub fn path_of(&self, node: NodeId) -> Result<ObjectPath> {
        if !self.host.exists(node) {
            return Err(Error::incomplete_naming(format!(
                "node {} no longer exists",
                node
            )));
        }

        let mut segments = Vec::new();
        let mut cur = node;
        loop {
            let segment = self.segment(cur).ok_or_else(|| {
                Error::incomplete_naming(format!(
                    "node {} has neither a name nor a type tag",
                    cur
                ))
            })?;
            segments.push(segment);
            match self.host.parent(cur) {
                Some(p) => cur = p,
                None => break,
            }
        }

        if !self.host.top_level().contains(&cur) {
            return Err(Error::incomplete_naming(format!(
                "topmost ancestor {} of {} is not a top-level root",
                cur, node
            )));
        }

        segments.reverse();
        Ok(ObjectPath::from_segments(segments))
    }

    fn find_among(&self, candidates: &[NodeId], segment: &str) -> Option<NodeId> {
        if let Some(&n) = candidates.iter().find(|&&n| self.host.name(n) == segment) {
            return Some(n);
        }
        self.segment_names(candidates)
            .into_iter()
            .zip(candidates)
            .find(|(name, n)| self.host.name(**n).is_empty() && name.as_deref() == Some(segment))
            .map(|(_, n)| *n)
    }

    pub fn resolve_str(&self, path: &str) -> Result<NodeId> {
        self.resolve(&ObjectPath::parse(path))
    }

    pub fn resolve(&self, path: &ObjectPath) -> Result<NodeId> {
        let segments = path.segments();
        let Some(first) = segments.first() else {
            return Err(Error::object_not_found(""));
        };

        let Some(mut cur) = self.find_among(&self.host.top_level(), first) else {
            return Err(self.not_found(path, 0, None));
        };

        for (i, segment) in segments.iter().enumerate().skip(1) {
            let children = self.host.children(cur);
            if let Some(n) = self.find_among(&children, segment) {
                cur = n;
                continue;
            }
            if is_positional(segment) {
                let skipped = children
                    .iter()
                    .find_map(|&c| self.find_among(&self.host.children(c), segment));
                if let Some(n) = skipped {
                    debug!(path = %path, segment = %segment, "resolved by skipping a generation");
                    cur = n;
                    continue;
                }
            }
            return Err(self.not_found(path, i, Some(cur)));
        }
        Ok(cur)
    }

    /// Diagnostic for a failed lookup: how far resolution got and every
    /// node whose segment matches the final segment of the path.
    fn not_found(&self, path: &ObjectPath, unresolved: usize, deepest: Option<NodeId>) -> Error {
        let target = path.last().unwrap_or_default();
        let mut matches = Vec::new();
        let roots = match deepest {
            Some(n) => self.host.children(n),
            None => self.host.top_level(),
        };
        self.collect_matches(&roots, target, &mut matches);

        let found_up_to = path.prefix(unresolved).to_string();
        let mut suggestions = vec![format!("Found up to `{}`", found_up_to)];
        suggestions.extend(matches.iter().map(|m| format!("Matching object: {}", m)));

        Error::object_not_found(&path.to_string())
            .with_suggestions(suggestions)
            .with_context(serde_json::json!({
                "path": path.to_string(),
                "found_up_to": found_up_to,
                "unresolved": path.segments().get(unresolved),
                "matches": matches,
            }))
    }

    fn collect_matches(&self, siblings: &[NodeId], target: &str, out: &mut Vec<String>) {
        for (name, &n) in self.segment_names(siblings).into_iter().zip(siblings) {
            if name.as_deref() == Some(target) {
                if let Ok(p) = self.path_of(n) {
                    out.push(p.to_string());
                }
            }
            self.collect_matches(&self.host.children(n), target, out);
        }
    }

    fn display_path(&self, node: NodeId) -> String {
        self.path_of(node)
            .map(|p| p.to_string())
            .unwrap_or_else(|_| format!("<unreachable {}>", node))
    }

    /// Every naming violation below `root`. Never stops at the first.
    pub fn validate(&self, root: NodeId) -> Vec<Violation> {
        let mut out = Vec::new();
        self.validate_children(root, &mut out);
        out
    }

    /// Validate every top-level root and its subtree.
    pub fn validate_all(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        let roots = self.host.top_level();
        self.check_siblings("<top-level>", &roots, &mut out);
        for root in roots {
            self.validate_children(root, &mut out);
        }
        out
    }

    fn validate_children(&self, node: NodeId, out: &mut Vec<Violation>) {
        let children = self.host.children(node);
        if !children.is_empty() {
            let parent = self.display_path(node);
            self.check_siblings(&parent, &children, out);
        }
        for child in children {
            self.validate_children(child, out);
        }
    }

    fn check_siblings(&self, parent: &str, siblings: &[NodeId], out: &mut Vec<Violation>) {
        let mut seen = HashSet::new();
        for &n in siblings {
            if self.host.capability(n).is_cosmetic() {
                continue;
            }
            let name = self.host.name(n);
            let kind = if name.is_empty() {
                ViolationKind::Unnamed {
                    tag: self.host.type_tag(n),
                }
            } else if !seen.insert(name.clone()) {
                ViolationKind::Duplicate { name }
            } else {
                continue;
            };
            out.push(Violation {
                parent: parent.to_string(),
                kind,
            });
        }
    }
}
