// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version-control collaborator.
//!
//! Stackshim never implements Git internals. Everything it needs from Git
//! goes through the [`Git`] trait: a handful of read-only queries, plus the
//! ability to run arbitrary Git subcommands against the working tree.
//!
//! [`Git2Client`] answers queries through libgit2 to avoid process spawning,
//! and delegates mutations (switching, rebasing, pushing, etc.) to the real
//! Git binary so hooks and user configuration are honored.

use git2::{BranchType, ErrorCode, Oid, Repository};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument};

/// Result of running a Git subcommand.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Output {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Everything stackshim needs from Git.
pub trait Git {
    /// Name of the branch currently checked out.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::DetachedHead`] if not on any named branch.
    fn current_branch(&self) -> Result<String>;

    /// Run Git subcommand in the working tree, capturing its output.
    ///
    /// A non-zero exit is not an error here. It is reported through
    /// [`Output::code`] for callers that expect failure sometimes.
    fn run(&self, args: &[&str]) -> Result<Output>;

    /// Check if moving from one revision to another is a fast-forward.
    fn is_fast_forward(&self, from: &str, to: &str) -> Result<bool>;

    /// Check if local branch exists.
    fn branch_exists(&self, name: &str) -> Result<bool>;

    /// Local branches merged, or squash-merged, into trunk.
    fn merged_branches(&self, trunk: &str) -> Result<Vec<String>>;

    /// Path to the common Git directory shared by all worktrees.
    fn common_dir(&self) -> &Path;

    /// Run Git subcommand that is expected to succeed, returning trimmed
    /// stdout.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Command`] if subcommand exits non-zero.
    fn query(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if !output.success() {
            return Err(GitError::Command {
                args: args.join(" "),
                code: output.code,
                stderr: chomp(&output.stderr),
            });
        }

        Ok(output.stdout.trim().to_string())
    }
}

/// Git access through libgit2 and the Git binary.
pub struct Git2Client {
    repository: Repository,
    work_dir: PathBuf,
}

impl Git2Client {
    /// Open repository containing target path.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if no repository can be found.
    /// - Return [`GitError::Bare`] if repository has no working tree.
    #[instrument(skip(path), level = "debug")]
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        debug!("discover repository from {:?}", path.as_ref().display());
        let repository = Repository::discover(path.as_ref())?;
        let work_dir = repository
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| GitError::Bare {
                path: repository.path().to_path_buf(),
            })?;

        Ok(Self {
            repository,
            work_dir,
        })
    }

    fn resolve(&self, revision: &str) -> Result<Oid> {
        Ok(self.repository.revparse_single(revision)?.peel_to_commit()?.id())
    }

    fn is_squash_merged(&self, trunk: &str, branch: &str) -> Result<bool> {
        // Replay the branch as one commit onto its merge base, and ask Git
        // whether trunk already carries an equivalent patch.
        let merge_base = self.query(&["merge-base", trunk, branch])?;
        let tree = self.query(&["rev-parse", &format!("{branch}^{{tree}}")])?;
        let squashed = self.query(&["commit-tree", &tree, "-p", &merge_base, "-m", "_"])?;
        let cherry = self.query(&["cherry", trunk, &squashed])?;

        Ok(cherry.starts_with('-'))
    }
}

impl Git for Git2Client {
    fn current_branch(&self) -> Result<String> {
        // INVARIANT: Read HEAD symbolically so unborn branches still count.
        let head = self.repository.find_reference("HEAD")?;
        head.symbolic_target()
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .map(ToString::to_string)
            .ok_or(GitError::DetachedHead)
    }

    #[instrument(skip(self), level = "debug")]
    fn run(&self, args: &[&str]) -> Result<Output> {
        syscall(&self.work_dir, "git", args)
    }

    fn is_fast_forward(&self, from: &str, to: &str) -> Result<bool> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        Ok(from == to || self.repository.graph_descendant_of(to, from)?)
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        match self.repository.find_branch(name, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(error) if error.code() == ErrorCode::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn merged_branches(&self, trunk: &str) -> Result<Vec<String>> {
        let list = |filter: &str| -> Result<Vec<String>> {
            Ok(self
                .query(&["branch", "--format=%(refname:short)", filter, trunk])?
                .lines()
                .map(str::trim)
                .filter(|branch| !branch.is_empty() && *branch != trunk)
                .map(ToString::to_string)
                .collect())
        };

        let mut merged = list("--merged")?;
        for branch in list("--no-merged")? {
            if self.is_squash_merged(trunk, &branch)? {
                debug!("{branch:?} was squash merged into {trunk:?}");
                merged.push(branch);
            }
        }

        Ok(merged)
    }

    fn common_dir(&self) -> &Path {
        self.repository.commondir()
    }
}

fn syscall(
    cwd: &Path,
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<Output> {
    let output = Command::new(cmd.as_ref())
        .current_dir(cwd)
        .args(args)
        .output()
        .map_err(|source| GitError::Spawn {
            source,
            cmd: cmd.as_ref().to_string_lossy().into_owned(),
        })?;

    Ok(Output {
        // INVARIANT: Killed by signal counts as failure.
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Chomp trailing newlines.
pub(crate) fn chomp(message: &str) -> String {
    message.trim_end_matches(['\r', '\n']).to_string()
}

/// Git interaction error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// HEAD does not point at a named branch.
    #[error("not on a branch")]
    DetachedHead,

    /// Repository has no working tree.
    #[error("repository at {:?} has no working tree", path.display())]
    Bare { path: PathBuf },

    /// Git subcommand exits non-zero.
    #[error("`git {args}` failed with exit code {code}:\n{stderr}")]
    Command {
        args: String,
        code: i32,
        stderr: String,
    },

    /// Git binary cannot be spawned.
    #[error("failed to spawn {cmd:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        cmd: String,
    },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;
