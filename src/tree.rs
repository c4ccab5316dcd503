// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Branch dependency tree.
//!
//! Git has no notion of one branch being "stacked on" another. Stackshim
//! layers that notion on top of Git through a __branch dependency tree__: one
//! designated __trunk__ branch, and a parent for every other tracked branch.
//! Following parents from any tracked branch always ends at trunk.
//!
//! # Derived Children Index
//!
//! Only the parent relation is stored. The children of each branch are
//! derived from it, and re-derived eagerly after every mutation. Queries can
//! never observe a stale children index.
//!
//! # Durable Layout
//!
//! The tree serializes to a flat mapping of branch to parent, plus the name
//! of trunk:
//!
//! ```json
//! { "trunk": "main", "branches": { "feature-a": "main", "feature-b": "feature-a" } }
//! ```
//!
//! Insertion order of the mapping is preserved across a round trip, so the
//! order of children stays stable between invocations.

use serde::{
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::{
    collections::HashMap,
    fmt::{Formatter, Result as FmtResult},
};

/// Tracked branches and who they are stacked on.
#[derive(Debug, Clone)]
pub struct BranchTree {
    trunk: String,
    parents: ParentMap,
    children: HashMap<String, Vec<String>>,
}

impl BranchTree {
    /// Construct fresh tree that only knows about trunk.
    pub fn new(trunk: impl Into<String>) -> Self {
        let mut tree = Self {
            trunk: trunk.into(),
            parents: ParentMap::default(),
            children: HashMap::new(),
        };
        tree.reindex();
        tree
    }

    /// Construct tree from trunk and existing parent mapping.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::TrunkHasParent`] if trunk is given a parent.
    /// - Return [`TreeError::UnknownParent`] if a parent is neither trunk nor
    ///   tracked.
    /// - Return [`TreeError::Cycle`] if following parents never reaches trunk.
    pub fn from_parts(trunk: impl Into<String>, parents: ParentMap) -> Result<Self> {
        let trunk = trunk.into();
        if parents.contains(&trunk) {
            return Err(TreeError::TrunkHasParent { trunk });
        }

        for (branch, parent) in parents.iter() {
            if parent != trunk && !parents.contains(parent) {
                return Err(TreeError::UnknownParent {
                    branch: branch.to_string(),
                    parent: parent.to_string(),
                });
            }

            // INVARIANT: Every chain reaches trunk in at most |parents| hops.
            let mut current = parent;
            let mut hops = 0;
            while current != trunk {
                hops += 1;
                if hops > parents.len() {
                    return Err(TreeError::Cycle {
                        branch: branch.to_string(),
                        parent: parent.to_string(),
                    });
                }
                current = parents.get(current).unwrap_or(trunk.as_str());
            }
        }

        let mut tree = Self {
            trunk,
            parents,
            children: HashMap::new(),
        };
        tree.reindex();

        Ok(tree)
    }

    /// Name of trunk.
    pub fn trunk(&self) -> &str {
        &self.trunk
    }

    /// Raw parent mapping of every non-trunk branch.
    pub fn parents(&self) -> &ParentMap {
        &self.parents
    }

    /// Check if branch is trunk or tracked.
    pub fn contains(&self, name: &str) -> bool {
        name == self.trunk || self.parents.contains(name)
    }

    /// Look up a single branch.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::NotFound`] if branch is neither trunk nor tracked.
    pub fn branch(&self, name: &str) -> Result<BranchInfo<'_>> {
        self.lookup(name).ok_or_else(|| TreeError::NotFound {
            name: name.to_string(),
        })
    }

    /// All branches, trunk first, then in insertion order.
    pub fn branches(&self) -> Vec<BranchInfo<'_>> {
        std::iter::once(self.trunk.as_str())
            .chain(self.parents.iter().map(|(branch, _)| branch))
            .filter_map(|name| self.lookup(name))
            .collect()
    }

    /// Stack branch on top of a new parent.
    ///
    /// Inserts the branch if it is not tracked yet, or overwrites its current
    /// parent otherwise.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::TrunkOperation`] if branch is trunk.
    /// - Return [`TreeError::UnknownParent`] if parent is neither trunk nor
    ///   tracked.
    /// - Return [`TreeError::Cycle`] if parent is the branch itself or one of
    ///   its descendants.
    pub fn set_parent(&mut self, name: &str, parent: &str) -> Result<()> {
        self.check_parent(name, parent)?;
        self.parents.insert(name, parent);
        self.reindex();

        Ok(())
    }

    /// Check that branch could be stacked onto parent without breaking the
    /// tree.
    ///
    /// # Errors
    ///
    /// - Same as [`BranchTree::set_parent`].
    pub fn check_parent(&self, name: &str, parent: &str) -> Result<()> {
        if name == self.trunk {
            return Err(TreeError::TrunkOperation {
                operation: "set the parent of",
                trunk: self.trunk.clone(),
            });
        }

        if !self.contains(parent) {
            return Err(TreeError::UnknownParent {
                branch: name.to_string(),
                parent: parent.to_string(),
            });
        }

        let mut current = Some(parent);
        while let Some(ancestor) = current {
            if ancestor == name {
                return Err(TreeError::Cycle {
                    branch: name.to_string(),
                    parent: parent.to_string(),
                });
            }
            current = self.parents.get(ancestor);
        }

        Ok(())
    }

    /// Stop tracking branch.
    ///
    /// Children of the removed branch are stacked onto the removed branch's
    /// former parent, so the tree stays connected.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::TrunkOperation`] if branch is trunk.
    /// - Return [`TreeError::NotFound`] if branch is not tracked.
    pub fn remove_branch(&mut self, name: &str) -> Result<()> {
        if name == self.trunk {
            return Err(TreeError::TrunkOperation {
                operation: "remove",
                trunk: self.trunk.clone(),
            });
        }

        let parent = self.parents.remove(name).ok_or_else(|| TreeError::NotFound {
            name: name.to_string(),
        })?;
        self.parents.replace_parent(name, &parent);
        self.reindex();

        Ok(())
    }

    /// Rename tracked branch.
    ///
    /// Keeps the branch's parent and position, and restacks its children onto
    /// the new name. Renaming trunk does nothing, since trunk is fixed for the
    /// life of the tree.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::NotFound`] if `from` is not tracked.
    /// - Return [`TreeError::AlreadyTracked`] if `to` is already a branch.
    pub fn rename_branch(&mut self, from: &str, to: &str) -> Result<()> {
        if from == self.trunk {
            return Ok(());
        }

        if !self.parents.contains(from) {
            return Err(TreeError::NotFound {
                name: from.to_string(),
            });
        }

        if self.contains(to) {
            return Err(TreeError::AlreadyTracked {
                name: to.to_string(),
            });
        }

        self.parents.rename(from, to);
        self.reindex();

        Ok(())
    }

    /// Ancestors of branch, from its immediate parent down to trunk.
    ///
    /// Empty for trunk.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::NotFound`] if branch is neither trunk nor tracked.
    pub fn ancestors(&self, name: &str) -> Result<Ancestors<'_>> {
        let start = self.branch(name)?;
        Ok(Ancestors {
            tree: self,
            current: Some(start),
        })
    }

    /// Immediate children of branch in insertion order.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::NotFound`] if branch is neither trunk nor tracked.
    pub fn children(&self, name: &str) -> Result<impl Iterator<Item = BranchInfo<'_>> + '_> {
        let info = self.branch(name)?;
        Ok(info
            .children()
            .iter()
            .filter_map(|child| self.lookup(child)))
    }

    /// Every descendant of branch in pre-order, so a branch always comes
    /// after its parent.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::NotFound`] if branch is neither trunk nor tracked.
    pub fn descendants(&self, name: &str) -> Result<Descendants<'_>> {
        let info = self.branch(name)?;
        Ok(Descendants {
            tree: self,
            pending: info.children().iter().rev().map(String::as_str).collect(),
        })
    }

    fn lookup(&self, name: &str) -> Option<BranchInfo<'_>> {
        let children = self
            .children
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default();

        if name == self.trunk {
            return Some(BranchInfo::Trunk {
                name: &self.trunk,
                children,
            });
        }

        self.parents
            .entry(name)
            .map(|(name, parent)| BranchInfo::NonTrunk {
                name,
                parent,
                children,
            })
    }

    fn reindex(&mut self) {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for (branch, parent) in self.parents.iter() {
            children
                .entry(parent.to_string())
                .or_default()
                .push(branch.to_string());
        }
        self.children = children;
    }
}

impl PartialEq for BranchTree {
    fn eq(&self, other: &Self) -> bool {
        self.trunk == other.trunk && self.parents == other.parents
    }
}

impl Eq for BranchTree {}

#[derive(Serialize, Deserialize)]
struct TreeRecord<P> {
    trunk: String,
    branches: P,
}

impl Serialize for BranchTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        TreeRecord {
            trunk: self.trunk.clone(),
            branches: &self.parents,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BranchTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let record = TreeRecord::<ParentMap>::deserialize(deserializer)?;
        BranchTree::from_parts(record.trunk, record.branches).map_err(de::Error::custom)
    }
}

/// Snapshot of one branch in the tree.
///
/// Trunk has no parent, every other branch has exactly one. The two cases
/// are kept apart so a non-trunk branch can never be missing its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchInfo<'a> {
    Trunk {
        name: &'a str,
        children: &'a [String],
    },
    NonTrunk {
        name: &'a str,
        parent: &'a str,
        children: &'a [String],
    },
}

impl<'a> BranchInfo<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Self::Trunk { name, .. } | Self::NonTrunk { name, .. } => name,
        }
    }

    pub fn children(&self) -> &'a [String] {
        match self {
            Self::Trunk { children, .. } | Self::NonTrunk { children, .. } => children,
        }
    }
}

/// Lazy walk from a branch's parent down to trunk.
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    tree: &'a BranchTree,
    current: Option<BranchInfo<'a>>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = BranchInfo<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.current? {
            BranchInfo::Trunk { .. } => None,
            BranchInfo::NonTrunk { parent, .. } => self.tree.lookup(parent),
        };
        self.current = next;
        next
    }
}

/// Lazy depth-first walk over every descendant of a branch.
#[derive(Debug, Clone)]
pub struct Descendants<'a> {
    tree: &'a BranchTree,
    pending: Vec<&'a str>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = BranchInfo<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.pending.pop()?;
        let info = self.tree.lookup(name)?;
        self.pending
            .extend(info.children().iter().rev().map(String::as_str));
        Some(info)
    }
}

/// Insertion ordered mapping of branch to parent.
///
/// Trees here hold tens of branches, so a flat list beats a hash map for
/// keeping order stable.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParentMap(Vec<(String, String)>);

impl ParentMap {
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, branch: &str) -> bool {
        self.position(branch).is_some()
    }

    pub fn get(&self, branch: &str) -> Option<&str> {
        self.entry(branch).map(|(_, parent)| parent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.0
            .iter()
            .map(|(branch, parent)| (branch.as_str(), parent.as_str()))
    }

    /// Insert new entry at the end, or overwrite existing entry in place.
    pub fn insert(&mut self, branch: impl Into<String>, parent: impl Into<String>) {
        let branch = branch.into();
        let parent = parent.into();
        match self.position(&branch) {
            Some(index) => self.0[index].1 = parent,
            None => self.0.push((branch, parent)),
        }
    }

    /// Remove entry, returning the parent it had.
    pub fn remove(&mut self, branch: &str) -> Option<String> {
        let index = self.position(branch)?;
        Some(self.0.remove(index).1)
    }

    fn entry(&self, branch: &str) -> Option<(&str, &str)> {
        self.0
            .iter()
            .find(|(name, _)| name == branch)
            .map(|(name, parent)| (name.as_str(), parent.as_str()))
    }

    fn position(&self, branch: &str) -> Option<usize> {
        self.0.iter().position(|(name, _)| name == branch)
    }

    fn replace_parent(&mut self, old: &str, new: &str) {
        for (_, parent) in self.0.iter_mut().filter(|(_, parent)| parent == old) {
            *parent = new.to_string();
        }
    }

    fn rename(&mut self, from: &str, to: &str) {
        if let Some(index) = self.position(from) {
            self.0[index].0 = to.to_string();
        }
        self.replace_parent(from, to);
    }
}

impl<B, P> FromIterator<(B, P)> for ParentMap
where
    B: Into<String>,
    P: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (B, P)>>(iter: I) -> Self {
        let mut map = Self::default();
        for (branch, parent) in iter {
            map.insert(branch, parent);
        }
        map
    }
}

impl Serialize for ParentMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (branch, parent) in &self.0 {
            map.serialize_entry(branch, parent)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParentMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(ParentMapVisitor)
    }
}

struct ParentMapVisitor;

impl<'de> Visitor<'de> for ParentMapVisitor {
    type Value = ParentMap;

    fn expecting(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str("a mapping of branch names to parent branch names")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut map = ParentMap(Vec::with_capacity(access.size_hint().unwrap_or(0)));
        while let Some((branch, parent)) = access.next_entry::<String, String>()? {
            if map.contains(&branch) {
                return Err(de::Error::custom(format!("branch {branch:?} listed twice")));
            }
            map.0.push((branch, parent));
        }
        Ok(map)
    }
}

/// Branch dependency tree error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// Branch is neither trunk nor tracked.
    #[error("branch {name:?} is not tracked")]
    NotFound { name: String },

    /// Branch name is already taken.
    #[error("branch {name:?} is already tracked")]
    AlreadyTracked { name: String },

    /// Operation is forbidden on trunk.
    #[error("cannot {operation} the trunk branch {trunk:?}")]
    TrunkOperation {
        operation: &'static str,
        trunk: String,
    },

    /// Trunk listed with a parent of its own.
    #[error("trunk branch {trunk:?} cannot have a parent")]
    TrunkHasParent { trunk: String },

    /// Parent is neither trunk nor tracked.
    #[error("cannot stack {branch:?} on {parent:?}: parent is not tracked")]
    UnknownParent { branch: String, parent: String },

    /// Parent chain would loop back onto the branch.
    #[error("cannot stack {branch:?} on {parent:?}: would create a cycle")]
    Cycle { branch: String, parent: String },
}

/// Friendly result alias :3
pub type Result<T, E = TreeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn tree(trunk: &str, parents: &[(&str, &str)]) -> BranchTree {
        BranchTree::from_parts(trunk, parents.iter().copied().collect()).unwrap()
    }

    fn names<'a>(infos: impl IntoIterator<Item = BranchInfo<'a>>) -> Vec<&'a str> {
        infos.into_iter().map(|info| info.name()).collect()
    }

    fn parent_of<'a>(tree: &'a BranchTree, name: &str) -> &'a str {
        match tree.branch(name).unwrap() {
            BranchInfo::NonTrunk { parent, .. } => parent,
            BranchInfo::Trunk { name, .. } => panic!("{name} is trunk"),
        }
    }

    #[test]
    fn get_branch_reports_variant() {
        let tree = tree("main", &[("A", "main"), ("B", "A")]);

        assert_eq!(
            tree.branch("main").unwrap(),
            BranchInfo::Trunk {
                name: "main",
                children: &["A".to_string()],
            }
        );
        assert_eq!(
            tree.branch("A").unwrap(),
            BranchInfo::NonTrunk {
                name: "A",
                parent: "main",
                children: &["B".to_string()],
            }
        );
        assert_eq!(
            tree.branch("C"),
            Err(TreeError::NotFound { name: "C".into() })
        );
    }

    #[test]
    fn branch_names_are_case_sensitive() {
        let tree = tree("main", &[("feature", "main")]);
        assert!(tree.branch("Feature").is_err());
        assert!(tree.branch("MAIN").is_err());
    }

    #[test]
    fn all_branches_start_with_trunk() {
        let tree = tree("main", &[("B", "main"), ("A", "B")]);
        assert_eq!(names(tree.branches()), vec!["main", "B", "A"]);
    }

    #[test]
    fn set_parent_overwrites_parent() {
        let mut tree = tree("main", &[("A", "main"), ("B", "main")]);

        tree.set_parent("C", "A").unwrap();
        assert_eq!(parent_of(&tree, "C"), "A");
        assert_eq!(names(tree.children("A").unwrap()), vec!["C"]);

        tree.set_parent("C", "B").unwrap();
        assert_eq!(parent_of(&tree, "C"), "B");
        assert!(tree.children("A").unwrap().next().is_none());
        assert_eq!(names(tree.children("B").unwrap()), vec!["C"]);
    }

    #[test]
    fn set_parent_is_idempotent() {
        let mut tree = tree("main", &[("A", "main")]);
        tree.set_parent("B", "A").unwrap();
        let once = tree.clone();
        tree.set_parent("B", "A").unwrap();

        assert_eq!(tree, once);
        let rebuilt = BranchTree::from_parts("main", tree.parents().clone()).unwrap();
        assert_eq!(tree.children, rebuilt.children);
    }

    #[test]
    fn set_parent_errors_on_trunk() {
        let mut tree = BranchTree::new("my_trunk");
        assert_eq!(
            tree.set_parent("my_trunk", "foo"),
            Err(TreeError::TrunkOperation {
                operation: "set the parent of",
                trunk: "my_trunk".into(),
            })
        );
    }

    #[test_case("A", "ghost"; "unknown parent")]
    #[test_case("A", "A"; "self parent")]
    #[test_case("A", "C"; "descendant parent")]
    #[test]
    fn set_parent_rejects_broken_links(branch: &str, parent: &str) {
        let mut tree = tree("main", &[("A", "main"), ("B", "A"), ("C", "B")]);
        let before = tree.clone();

        assert!(tree.set_parent(branch, parent).is_err());
        pretty_assertions::assert_eq!(tree, before);
    }

    #[test]
    fn remove_branch_forgets_branch() {
        let mut tree = tree("main", &[("A", "main")]);
        tree.remove_branch("A").unwrap();

        assert!(tree.branch("A").is_err());
        assert!(tree.children("main").unwrap().next().is_none());
    }

    #[test]
    fn remove_branch_relinks_children() {
        let mut tree = tree("main", &[("A", "main"), ("B", "A"), ("C", "A")]);
        tree.remove_branch("A").unwrap();

        assert_eq!(parent_of(&tree, "B"), "main");
        assert_eq!(parent_of(&tree, "C"), "main");
        assert_eq!(names(tree.children("main").unwrap()), vec!["B", "C"]);
    }

    #[test]
    fn remove_branch_errors_on_trunk_and_unknown() {
        let mut tree = tree("main", &[("A", "main")]);
        assert!(matches!(
            tree.remove_branch("main"),
            Err(TreeError::TrunkOperation { .. })
        ));
        assert!(matches!(
            tree.remove_branch("ghost"),
            Err(TreeError::NotFound { .. })
        ));
    }

    #[test]
    fn rename_branch_propagates_to_children() {
        let mut tree = tree("main", &[("A", "main"), ("B", "A")]);
        tree.rename_branch("A", "A2").unwrap();

        assert_eq!(parent_of(&tree, "B"), "A2");
        assert_eq!(parent_of(&tree, "A2"), "main");
        assert_eq!(tree.branch("A"), Err(TreeError::NotFound { name: "A".into() }));
        assert_eq!(names(tree.branches()), vec!["main", "A2", "B"]);
    }

    #[test]
    fn rename_trunk_does_nothing() {
        let mut tree = tree("main", &[("A", "main")]);
        let before = tree.clone();
        tree.rename_branch("main", "master").unwrap();
        assert_eq!(tree, before);
    }

    #[test]
    fn rename_branch_refuses_taken_name() {
        let mut tree = tree("main", &[("A", "main"), ("B", "main")]);
        assert_eq!(
            tree.rename_branch("A", "B"),
            Err(TreeError::AlreadyTracked { name: "B".into() })
        );
    }

    #[test]
    fn ancestors_walk_down_to_trunk() {
        let tree = tree("main", &[("A", "main"), ("B", "A"), ("C", "B")]);

        assert_eq!(names(tree.ancestors("C").unwrap()), vec!["B", "A", "main"]);
        assert!(tree.ancestors("main").unwrap().next().is_none());

        // Restartable.
        assert_eq!(tree.ancestors("C").unwrap().count(), 3);
    }

    #[test]
    fn descendants_are_topologically_sorted() {
        let tree = tree(
            "main",
            &[("A", "main"), ("B", "A"), ("C", "B"), ("D", "A"), ("E", "D")],
        );
        assert_eq!(
            names(tree.descendants("main").unwrap()),
            vec!["A", "B", "C", "D", "E"]
        );
        assert_eq!(names(tree.descendants("D").unwrap()), vec!["E"]);
    }

    #[test_case(r#"{"trunk": "main", "branches": {"main": "A", "A": "main"}}"#; "trunk with parent")]
    #[test_case(r#"{"trunk": "main", "branches": {"A": "ghost"}}"#; "dangling parent")]
    #[test_case(r#"{"trunk": "main", "branches": {"A": "B", "B": "A"}}"#; "cycle")]
    #[test_case(r#"{"trunk": "main", "branches": {"A": "main", "A": "main"}}"#; "duplicate")]
    #[test_case(r#"{"branches": {}}"#; "missing trunk")]
    #[test]
    fn deserialize_rejects_broken_trees(data: &str) {
        assert!(serde_json::from_str::<BranchTree>(data).is_err());
    }

    #[test]
    fn serialization_keeps_insertion_order() -> anyhow::Result<()> {
        let mut tree = BranchTree::new("main");
        tree.set_parent("zeta", "main")?;
        tree.set_parent("alpha", "main")?;
        tree.set_parent("beta", "zeta")?;

        let data = serde_json::to_string(&tree)?;
        assert_eq!(
            data,
            r#"{"trunk":"main","branches":{"zeta":"main","alpha":"main","beta":"zeta"}}"#
        );

        let loaded: BranchTree = serde_json::from_str(&data)?;
        assert_eq!(loaded, tree);
        assert_eq!(names(loaded.children("main")?), vec!["zeta", "alpha"]);

        Ok(())
    }
}
