// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Cache-only fast path.
//!
//! The external stacking tool answers even trivial questions like "what is my
//! parent?" by talking to the network first. When latency matters more than
//! freshness, the tool's own persisted cache already holds the answer. The
//! [`CacheOnlyReader`] reads that cache directly without touching the
//! [`BranchTree`](crate::tree::BranchTree) at all.
//!
//! # Foreign Cache Layout
//!
//! The cache is a JSON document owned by the external tool. Only the parts we
//! need are modeled:
//!
//! ```json
//! {
//!   "branches": {
//!     "main": { "validationResult": "TRUNK" },
//!     "feature": { "parentBranchName": "main", "validationResult": "VALID" }
//!   }
//! }
//! ```
//!
//! The file is never written by stackshim.

use serde::Deserialize;
use std::{
    cell::OnceCell,
    collections::HashMap,
    fs::read_to_string,
    io::ErrorKind,
    path::PathBuf,
};
use tracing::{debug, instrument};

const TRUNK_TAG: &str = "TRUNK";

#[derive(Debug, Deserialize)]
struct CacheDocument {
    branches: HashMap<String, CachedBranch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedBranch {
    parent_branch_name: Option<String>,
    validation_result: String,
}

/// Read-only view over the external tool's cache.
///
/// The cache file is read at most once per reader, on first query.
#[derive(Debug)]
pub struct CacheOnlyReader {
    path: PathBuf,
    document: OnceCell<CacheDocument>,
}

impl CacheOnlyReader {
    /// Construct new reader over cache file at target path.
    ///
    /// Does not touch the file system until queried.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: OnceCell::new(),
        }
    }

    /// Find trunk by walking parents from starting branch until a branch
    /// tagged as trunk shows up.
    ///
    /// # Errors
    ///
    /// - Return [`CacheError::Missing`] if cache file does not exist.
    /// - Return [`CacheError::Corrupt`] if cache file cannot be parsed.
    /// - Return [`CacheError::TrunkNotFound`] if the walk leaves the cache,
    ///   or loops, before reaching trunk.
    pub fn trunk(&self, start: &str) -> Result<String> {
        let branches = &self.document()?.branches;
        let mut current = start;

        // INVARIANT: A walk longer than the cache itself must be looping.
        for _ in 0..=branches.len() {
            let Some(branch) = branches.get(current) else {
                break;
            };

            if branch.validation_result == TRUNK_TAG {
                return Ok(current.to_string());
            }

            match branch.parent_branch_name.as_deref() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Err(CacheError::TrunkNotFound {
            start: start.to_string(),
        })
    }

    /// Look up parent of starting branch.
    ///
    /// # Errors
    ///
    /// - Return [`CacheError::Missing`] if cache file does not exist.
    /// - Return [`CacheError::Corrupt`] if cache file cannot be parsed.
    /// - Return [`CacheError::UnknownBranch`] if starting branch is absent
    ///   from the cache.
    /// - Return [`CacheError::NoParent`] if starting branch has no parent.
    pub fn parent(&self, start: &str) -> Result<String> {
        let branch = self
            .document()?
            .branches
            .get(start)
            .ok_or_else(|| CacheError::UnknownBranch {
                name: start.to_string(),
            })?;

        branch
            .parent_branch_name
            .clone()
            .ok_or_else(|| CacheError::NoParent {
                name: start.to_string(),
            })
    }

    fn document(&self) -> Result<&CacheDocument> {
        if let Some(document) = self.document.get() {
            return Ok(document);
        }

        let document = self.read()?;
        Ok(self.document.get_or_init(|| document))
    }

    #[instrument(skip(self), level = "debug")]
    fn read(&self) -> Result<CacheDocument> {
        debug!("read external cache at {:?}", self.path.display());
        let data = read_to_string(&self.path).map_err(|error| match error.kind() {
            ErrorKind::NotFound => CacheError::Missing {
                path: self.path.clone(),
            },
            _ => CacheError::Read {
                source: error,
                path: self.path.clone(),
            },
        })?;

        serde_json::from_str(&data).map_err(|error| CacheError::Corrupt {
            source: error,
            path: self.path.clone(),
        })
    }
}

/// Foreign cache error types.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No cache written by the external tool yet.
    #[error("could not find external tool cache at {:?}, cannot use the fast path", path.display())]
    Missing { path: PathBuf },

    /// Cache exists but cannot be read.
    #[error("failed to read external tool cache at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Cache exists but is not in the expected layout.
    #[error("external tool cache at {:?} is corrupt", path.display())]
    Corrupt {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Branch is absent from the cache.
    #[error("branch {name:?} is not in the external tool cache")]
    UnknownBranch { name: String },

    /// Branch has no parent recorded.
    #[error("branch {name:?} has no parent in the external tool cache")]
    NoParent { name: String },

    /// Parent chain never reaches a branch tagged as trunk.
    #[error("could not find trunk starting from branch {start:?}")]
    TrunkNotFound { start: String },
}

/// Friendly result alias :3
pub type Result<T, E = CacheError> = std::result::Result<T, E>;
