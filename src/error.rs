// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Crate-wide error classification.
//!
//! Every module reports its own error type. The command runner is the one
//! place that decides how a failure is shown to the user, and it does so
//! through [`Error::kind`]:
//!
//! - [`ErrorKind::Usage`]: the user asked for something that cannot be done.
//!   Short message, no diagnostics.
//! - [`ErrorKind::CorruptStore`]: a file stackshim depends on exists but
//!   cannot be understood. Must be fixed by hand, never silently reset.
//! - [`ErrorKind::Internal`]: anything else. Full diagnostics, and a request
//!   to report it as a bug.

use crate::{
    cache::CacheError, config::ConfigError, git::GitError, path::NoWayHome, prompt::PromptError,
    stack::StackError, store::{Checkpoint, StoreError}, tree::TreeError,
};

/// How a failure should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Usage,
    CorruptStore,
    Internal,
}

impl ErrorKind {
    /// Process exit code for this kind of failure.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Usage => 1,
            Self::Internal => 2,
            Self::CorruptStore => 3,
        }
    }
}

/// All possible error types of stackshim.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request cannot be carried out as given.
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Path(#[from] NoWayHome),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    ProgressTemplate(#[from] indicatif::style::TemplateError),

    /// Input or output failed outside of any store.
    #[error("input/output failure")]
    Io(#[from] std::io::Error),

    /// Command failed after Git already carried out part of it.
    #[error(transparent)]
    Interrupted(Box<Error>),
}

impl Error {
    /// Construct usage error from message.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Mark failure as happening after Git already changed the repository.
    pub fn interrupted(self) -> Self {
        match self {
            Self::Interrupted(_) => self,
            error => Self::Interrupted(Box::new(error)),
        }
    }

    /// Classify failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Interrupted(error) => error.kind(),
            Self::Usage(_) | Self::Tree(_) => ErrorKind::Usage,
            Self::Stack(error) => match error {
                StackError::Prompt(error) => prompt_kind(error),
                StackError::Tree(_) | StackError::Ambiguous { .. } | StackError::UnknownChoice { .. } => {
                    ErrorKind::Usage
                }
            },
            Self::Store(error) => match error {
                StoreError::Corrupt { .. } => ErrorKind::CorruptStore,
                StoreError::Read { .. } | StoreError::Write { .. } | StoreError::Serialize(_) => {
                    ErrorKind::Internal
                }
            },
            Self::Cache(error) => match error {
                CacheError::Corrupt { .. } => ErrorKind::CorruptStore,
                CacheError::Read { .. } => ErrorKind::Internal,
                CacheError::Missing { .. }
                | CacheError::UnknownBranch { .. }
                | CacheError::NoParent { .. }
                | CacheError::TrunkNotFound { .. } => ErrorKind::Usage,
            },
            Self::Config(error) => match error {
                ConfigError::Deserialize(_) | ConfigError::ShellExpansion(_) => {
                    ErrorKind::CorruptStore
                }
                ConfigError::Prompt(error) => prompt_kind(error),
                ConfigError::Read(_) | ConfigError::Write(_) | ConfigError::Serialize(_) => {
                    ErrorKind::Internal
                }
            },
            Self::Git(error) => match error {
                GitError::DetachedHead | GitError::Bare { .. } | GitError::Command { .. } => {
                    ErrorKind::Usage
                }
                GitError::Spawn { .. } | GitError::Git2(_) => ErrorKind::Internal,
            },
            Self::Prompt(error) => prompt_kind(error),
            Self::Path(_) | Self::ProgressTemplate(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

impl Checkpoint for Error {
    fn keeps_changes(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

fn prompt_kind(error: &PromptError) -> ErrorKind {
    match error {
        PromptError::Cancelled => ErrorKind::Usage,
        PromptError::Terminal(_) => ErrorKind::Internal,
    }
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn classify_failures() {
        let usage: Error = TreeError::NotFound { name: "A".into() }.into();
        assert_eq!(usage.kind(), ErrorKind::Usage);

        let usage: Error = CacheError::Missing {
            path: PathBuf::from(".git/.graphite_cache_persist"),
        }
        .into();
        assert_eq!(usage.kind(), ErrorKind::Usage);

        let corrupt: Error = StoreError::Corrupt {
            source: serde_json::from_str::<u8>("x").unwrap_err(),
            path: PathBuf::from("store.json"),
        }
        .into();
        assert_eq!(corrupt.kind(), ErrorKind::CorruptStore);
        assert_eq!(corrupt.kind().exit_code(), 3);

        let internal: Error = GitError::Spawn {
            source: std::io::Error::other("no git"),
            cmd: "git".into(),
        }
        .into();
        assert_eq!(internal.kind(), ErrorKind::Internal);
    }

    #[test]
    fn interrupted_keeps_kind_and_message() {
        let error = Error::usage("rebase stopped").interrupted().interrupted();
        assert!(error.keeps_changes());
        assert!(matches!(&error, Error::Interrupted(inner) if !inner.keeps_changes()));
        assert_eq!(error.kind(), ErrorKind::Usage);
        assert_eq!(error.to_string(), "rebase stopped");
        assert!(!Error::usage("rebase stopped").keeps_changes());
    }

    #[test]
    fn ambiguous_navigation_is_usage() {
        let error: Error = StackError::Ambiguous {
            branch: "main".into(),
            children: vec!["A".into(), "B".into()],
        }
        .into();
        assert_eq!(error.kind(), ErrorKind::Usage);
        assert_eq!(
            error.to_string(),
            r#"branch "main" has multiple children (A, B), pick one by running interactively"#
        );
    }
}
