//! Synonym hierarchy for category and parameter names.
//!
//! The source document is JSON: an object value is a group (`Node`) of further
//! entries, an array of strings is a `Leaf` listing the spellings of one
//! canonical name. The tree is loaded once and shared read-only.
//!
//! ```text
//! {
//!   "Complete Blood Count": {
//!     "Hemoglobin": ["Hb", "HGB", "Haemoglobin"],
//!     "RBC": ["Red Blood Cells", "RBC Count"]
//!   },
//!   "TSH": ["Thyroid Stimulating Hormone"]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynonymError {
    #[error("Cannot read synonym file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Synonym file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid synonym entry at {path}: {reason}")]
    InvalidShape { path: String, reason: String },

    #[error("Canonical name appears more than once: {0}")]
    DuplicateCanonical(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynonymNode {
    Leaf { canonical: String, variants: Vec<String> },
    Node { canonical: String, children: SynonymTree },
}

impl SynonymNode {
    pub fn canonical(&self) -> &str {
        match self {
            SynonymNode::Leaf { canonical, .. } | SynonymNode::Node { canonical, .. } => canonical,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynonymTree {
    entries: Vec<SynonymNode>,
}

fn same_term(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

impl SynonymTree {
    pub fn new(entries: Vec<SynonymNode>) -> Result<Self, SynonymError> {
        let tree = Self { entries };
        tree.check_unique_leaves()?;
        Ok(tree)
    }

    /// Load and validate a synonym file.
    pub fn load(path: &Path) -> Result<Self, SynonymError> {
        let text = std::fs::read_to_string(path).map_err(|source| SynonymError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let tree = Self::from_json_str(&text)?;
        tracing::info!(
            path = %path.display(),
            leaves = tree.leaf_count(),
            "Synonym tree loaded"
        );
        Ok(tree)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SynonymError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, SynonymError> {
        let entries = parse_entries(value, "$")?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[SynonymNode] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                SynonymNode::Leaf { .. } => 1,
                SynonymNode::Node { children, .. } => children.leaf_count(),
            })
            .sum()
    }

    /// Canonical name for `term`, or `term` unchanged when nothing matches.
    ///
    /// Canonical names are matched before variants so that a canonical name
    /// always resolves to itself.
    pub fn resolve(&self, term: &str) -> String {
        self.find_canonical(term)
            .or_else(|| self.find_variant(term))
            .map(|node| node.canonical().to_string())
            .unwrap_or_else(|| term.to_string())
    }

    /// Whether `term` matches any canonical name or variant in the tree.
    pub fn knows(&self, term: &str) -> bool {
        self.find_canonical(term).is_some() || self.find_variant(term).is_some()
    }

    /// The vocabulary scope for a category, if the tree has an entry for it.
    pub fn scope(&self, category: &str) -> Option<Scope<'_>> {
        let canonical = self.resolve(category);
        self.find_canonical(&canonical).map(|node| Scope { node })
    }

    /// Resolve a parameter name within its category's scope, falling back to
    /// the whole tree when the category is unknown.
    pub fn resolve_in(&self, category: &str, term: &str) -> String {
        match self.scope(category) {
            Some(scope) => scope.resolve(term),
            None => self.resolve(term),
        }
    }

    /// First entry (depth-first, document order) whose canonical name matches.
    fn find_canonical(&self, term: &str) -> Option<&SynonymNode> {
        for entry in &self.entries {
            if same_term(entry.canonical(), term) {
                return Some(entry);
            }
            if let SynonymNode::Node { children, .. } = entry {
                if let Some(found) = children.find_canonical(term) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// First leaf (depth-first, document order) listing `term` as a variant.
    fn find_variant(&self, term: &str) -> Option<&SynonymNode> {
        for entry in &self.entries {
            match entry {
                SynonymNode::Leaf { variants, .. } => {
                    if variants.iter().any(|v| same_term(v, term)) {
                        return Some(entry);
                    }
                }
                SynonymNode::Node { children, .. } => {
                    if let Some(found) = children.find_variant(term) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    fn contains_any(&self, term: &str) -> bool {
        self.entries.iter().any(|entry| match entry {
            SynonymNode::Leaf { canonical, variants } => {
                same_term(canonical, term) || variants.iter().any(|v| same_term(v, term))
            }
            SynonymNode::Node { canonical, children } => {
                same_term(canonical, term) || children.contains_any(term)
            }
        })
    }

    fn check_unique_leaves(&self) -> Result<(), SynonymError> {
        fn collect<'a>(tree: &'a SynonymTree, seen: &mut HashSet<String>) -> Result<(), SynonymError> {
            for entry in &tree.entries {
                match entry {
                    SynonymNode::Leaf { canonical, .. } => {
                        if !seen.insert(canonical.trim().to_lowercase()) {
                            return Err(SynonymError::DuplicateCanonical(canonical.clone()));
                        }
                    }
                    SynonymNode::Node { children, .. } => collect(children, seen)?,
                }
            }
            Ok(())
        }
        collect(self, &mut HashSet::new())
    }
}

/// The part of the tree that defines which parameter names a category accepts.
///
/// A `Node` category accepts every name in its subtree. A `Leaf` category
/// accepts its own canonical name and its listed variants.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'t> {
    node: &'t SynonymNode,
}

impl<'t> Scope<'t> {
    pub fn canonical(&self) -> &'t str {
        self.node.canonical()
    }

    pub fn contains(&self, term: &str) -> bool {
        match self.node {
            SynonymNode::Leaf { canonical, variants } => {
                same_term(canonical, term) || variants.iter().any(|v| same_term(v, term))
            }
            SynonymNode::Node { canonical, children } => {
                same_term(canonical, term) || children.contains_any(term)
            }
        }
    }

    /// Canonical name of `term` inside this scope; `term` unchanged when
    /// the scope does not know it.
    ///
    /// Every spelling a `Leaf` lists collapses to the leaf's canonical name.
    pub fn resolve(&self, term: &str) -> String {
        match self.node {
            SynonymNode::Leaf { canonical, .. } => {
                if self.contains(term) {
                    canonical.clone()
                } else {
                    term.to_string()
                }
            }
            SynonymNode::Node { canonical, children } => {
                if same_term(canonical, term) {
                    return canonical.clone();
                }
                children.resolve(term)
            }
        }
    }
}

fn parse_entries(value: &Value, path: &str) -> Result<Vec<SynonymNode>, SynonymError> {
    let map = value.as_object().ok_or_else(|| SynonymError::InvalidShape {
        path: path.to_string(),
        reason: "expected an object of canonical names".into(),
    })?;

    let mut entries = Vec::with_capacity(map.len());
    for (canonical, child) in map {
        let child_path = format!("{path}.{canonical}");
        let entry = match child {
            Value::Array(items) => {
                let variants = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| SynonymError::InvalidShape {
                            path: child_path.clone(),
                            reason: "variants must be strings".into(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                SynonymNode::Leaf {
                    canonical: canonical.clone(),
                    variants,
                }
            }
            Value::Object(_) => SynonymNode::Node {
                canonical: canonical.clone(),
                children: SynonymTree {
                    entries: parse_entries(child, &child_path)?,
                },
            },
            _ => {
                return Err(SynonymError::InvalidShape {
                    path: child_path,
                    reason: "expected a list of variants or a nested group".into(),
                })
            }
        };
        entries.push(entry);
    }
    Ok(entries)
}
