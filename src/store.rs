// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tree store management.
//!
//! Stackshim keeps its [`BranchTree`] in a single JSON file called the
//! __tree store__, placed inside the repository's common Git directory at
//! `.stackshim/store.json`. Worktrees of the same repository therefore share
//! one tree.
//!
//! # Lifecycle
//!
//! The tree store is read once at the start of an invocation and written once
//! at the end, and only if the command succeeded. A command that fails
//! leaves the store exactly as it was, unless Git already carried out part of
//! it (see [`Checkpoint`]). There is no locking: two invocations racing on
//! the same repository resolve as last writer wins.
//!
//! # Missing Versus Corrupt
//!
//! A missing store means the repository was never set up, and is reported as
//! `None` so the caller can run setup. A store that exists but cannot be
//! parsed is a hard [`StoreError::Corrupt`] failure. It is never silently
//! reset.

use crate::tree::BranchTree;

use std::{
    fs::{read_to_string, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Location of the tree store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStore {
    path: PathBuf,
}

impl TreeStore {
    /// Construct handle to tree store at target path.
    ///
    /// Does not check if the path exists.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to tree store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load tree from store.
    ///
    /// Returns `None` if store has never been written.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Read`] if store exists but cannot be read.
    /// - Return [`StoreError::Corrupt`] if store cannot be parsed, or holds a
    ///   broken tree.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self) -> Result<Option<BranchTree>> {
        debug!("load tree store at {:?}", self.path.display());
        let data = match read_to_string(&self.path) {
            Ok(data) => data,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(StoreError::Read {
                    source: error,
                    path: self.path.clone(),
                })
            }
        };

        serde_json::from_str(&data)
            .map(Some)
            .map_err(|error| StoreError::Corrupt {
                source: error,
                path: self.path.clone(),
            })
    }

    /// Run one command against the stored tree.
    ///
    /// Loads the tree, or starts a fresh one for trunk, hands it to the
    /// command, and writes it back only if the command succeeded and actually
    /// changed the tree. A command that fails after Git already changed the
    /// repository reports so through [`Checkpoint`], and whatever it did to
    /// the tree up to that point is written back before the failure is
    /// returned.
    ///
    /// # Errors
    ///
    /// - Return whatever the command fails with.
    /// - Return [`StoreError`] if store cannot be loaded or saved.
    pub fn transact<T, E>(
        &self,
        trunk: &str,
        command: impl FnOnce(&mut BranchTree) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError> + Checkpoint,
    {
        let stored = self.load()?;
        let fresh = stored.is_none();
        let mut tree = match stored {
            Some(tree) => tree,
            None => {
                info!("start new branch tree with trunk {trunk:?}");
                BranchTree::new(trunk)
            }
        };
        if tree.trunk() != trunk {
            warn!(
                "tree store has trunk {:?} but configuration says {trunk:?}, keeping store",
                tree.trunk()
            );
        }

        let snapshot = tree.clone();
        match command(&mut tree) {
            Ok(value) => {
                if fresh || tree != snapshot {
                    self.save(&tree)?;
                } else {
                    debug!("tree unchanged, skip save");
                }

                Ok(value)
            }
            Err(error) if error.keeps_changes() && tree != snapshot => {
                warn!("command stopped halfway, keep tree changes made so far");
                self.save(&tree)?;
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// Write tree to store.
    ///
    /// Writes to a sibling temporary file first, and renames it over the
    /// store, so readers never see a half-written store.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Write`] if store cannot be written.
    #[instrument(skip(self, tree), level = "debug")]
    pub fn save(&self, tree: &BranchTree) -> Result<()> {
        debug!("save tree store at {:?}", self.path.display());
        let write_error = |error| StoreError::Write {
            source: error,
            path: self.path.clone(),
        };

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            mkdirp::mkdirp(parent).map_err(write_error)?;
        }

        let data = serde_json::to_string_pretty(tree).map_err(StoreError::Serialize)?;
        let staging = self.path.with_extension("json.tmp");
        write(&staging, data).map_err(write_error)?;
        rename(&staging, &self.path).map_err(write_error)?;

        Ok(())
    }
}

/// Failure that may still leave tree changes worth keeping.
///
/// Commands that change Git in several steps can fail after the first steps
/// already took effect. The tree must keep up with those steps, or it ends up
/// describing a repository that no longer exists.
pub trait Checkpoint {
    /// Tree changes made before this failure must be saved.
    fn keeps_changes(&self) -> bool;
}

impl Checkpoint for StoreError {
    fn keeps_changes(&self) -> bool {
        false
    }
}

/// Tree store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store exists but cannot be read.
    #[error("failed to read tree store at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Store cannot be written.
    #[error("failed to write tree store at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Store exists but does not hold a valid tree.
    #[error("tree store at {:?} is corrupt, fix or remove it by hand", path.display())]
    Corrupt {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Tree cannot be serialized.
    #[error(transparent)]
    Serialize(serde_json::Error),
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn missing_store_loads_as_none() -> anyhow::Result<()> {
        let store = TreeStore::new(".git/.stackshim/store.json");
        assert_eq!(store.load()?, None);

        Ok(())
    }

    #[sealed_test]
    fn save_then_load() -> anyhow::Result<()> {
        let store = TreeStore::new(".git/.stackshim/store.json");
        let mut tree = BranchTree::new("main");
        tree.set_parent("feature-a", "main")?;
        tree.set_parent("feature-b", "feature-a")?;

        store.save(&tree)?;
        assert_eq!(store.load()?, Some(tree.clone()));

        // Overwrite in place.
        tree.remove_branch("feature-a")?;
        store.save(&tree)?;
        assert_eq!(store.load()?, Some(tree));
        assert!(!Path::new(".git/.stackshim/store.json.tmp").exists());

        Ok(())
    }

    #[sealed_test]
    fn reads_durable_layout() -> anyhow::Result<()> {
        write(
            "store.json",
            r#"{ "trunk": "main", "branches": { "feature-a": "main", "feature-b": "feature-a" } }"#,
        )?;
        let tree = TreeStore::new("store.json").load()?.expect("store exists");

        assert_eq!(tree.trunk(), "main");
        assert_eq!(
            tree.parents().iter().collect::<Vec<_>>(),
            vec![("feature-a", "main"), ("feature-b", "feature-a")]
        );

        Ok(())
    }

    #[sealed_test]
    fn transact_saves_only_changes() -> anyhow::Result<()> {
        let store = TreeStore::new(".git/.stackshim/store.json");

        // INVARIANT: First run always leaves a store behind.
        store.transact("main", |_| Ok::<_, StoreError>(()))?;
        assert_eq!(store.load()?, Some(BranchTree::new("main")));

        store.transact("main", |tree| {
            tree.set_parent("feature-a", "main").ok();
            Ok::<_, StoreError>(())
        })?;
        let mut expect = BranchTree::new("main");
        expect.set_parent("feature-a", "main")?;
        assert_eq!(store.load()?, Some(expect.clone()));

        let before = std::fs::metadata(store.path())?.modified()?;
        let name = store.transact("main", |tree| {
            Ok::<_, StoreError>(tree.trunk().to_string())
        })?;
        assert_eq!(name, "main");
        assert_eq!(std::fs::metadata(store.path())?.modified()?, before);

        Ok(())
    }

    #[sealed_test]
    fn transact_failure_leaves_store() -> anyhow::Result<()> {
        let store = TreeStore::new(".git/.stackshim/store.json");
        let mut tree = BranchTree::new("main");
        tree.set_parent("feature-a", "main")?;
        store.save(&tree)?;

        let result: Result<(), crate::Error> = store.transact("main", |tree| {
            tree.remove_branch("feature-a")?;
            Err(crate::Error::usage("git failed"))
        });
        assert!(result.is_err());
        assert_eq!(store.load()?, Some(tree));

        Ok(())
    }

    #[sealed_test]
    fn transact_keeps_changes_of_interrupted_command() -> anyhow::Result<()> {
        let store = TreeStore::new(".git/.stackshim/store.json");
        let mut tree = BranchTree::new("main");
        tree.set_parent("feature-a", "main")?;
        tree.set_parent("feature-b", "feature-a")?;
        store.save(&tree)?;

        let result: Result<(), crate::Error> = store.transact("main", |tree| {
            tree.remove_branch("feature-a")?;
            Err(crate::Error::usage("rebase stopped on conflicts").interrupted())
        });
        assert!(result.is_err());

        let mut expect = BranchTree::new("main");
        expect.set_parent("feature-b", "main")?;
        assert_eq!(store.load()?, Some(expect));

        Ok(())
    }

    #[sealed_test]
    fn corrupt_store_is_not_reset() -> anyhow::Result<()> {
        write("store.json", "{ not json")?;
        let store = TreeStore::new("store.json");
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
        let result = store.transact("main", |_| Ok::<_, StoreError>(()));
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
        assert_eq!(read_to_string("store.json")?, "{ not json");

        write("store.json", r#"{"trunk": "main", "branches": {"a": "b", "b": "a"}}"#)?;
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));

        Ok(())
    }
}
