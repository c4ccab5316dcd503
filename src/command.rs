// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Command execution.
//!
//! A [`Shim`] bundles everything a command needs: the Git collaborator, the
//! branch tree loaded for this invocation, an optional chooser for
//! interactive tie-breaking, and an output sink. Nothing is global. The
//! caller decides where the tree comes from and whether it gets persisted
//! afterwards.
//!
//! Every command validates against the tree first, then asks Git to carry
//! out the change, and only mutates the tree once Git succeeded. A failed Git
//! step therefore never leaves the tree ahead of the repository. Commands
//! made of several Git steps mark failures past the first step with
//! [`Error::interrupted`], so the tree keeps up with the steps that did
//! happen.

use crate::{
    error::{Error, Result},
    git::Git,
    prompt::Chooser,
    render::render_stacks,
    stack::{steps_down, steps_up, Step},
    tree::{BranchInfo, BranchTree},
};

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use tracing::{debug, info, instrument, warn};

/// How much detail `log` shows per branch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Branch names only.
    #[default]
    Short,

    /// Branch names with their commits.
    Long,
}

/// Which branches `restack` touches, relative to the current branch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RestackScope {
    /// Whole stack of current branch.
    #[default]
    Stack,

    /// Current branch only.
    Only,

    /// Current branch and its descendants.
    Upstack,

    /// Current branch and its ancestors.
    Downstack,
}

/// Execution context of one command invocation.
pub struct Shim<'a, G: Git, W: Write> {
    git: &'a G,
    tree: &'a mut BranchTree,
    chooser: Option<Box<dyn Chooser>>,
    out: W,
}

impl<'a, G: Git, W: Write> Shim<'a, G, W> {
    /// Construct new execution context without a chooser.
    pub fn new(git: &'a G, tree: &'a mut BranchTree, out: W) -> Self {
        Self {
            git,
            tree,
            chooser: None,
            out,
        }
    }

    /// Let user break ties when navigating.
    pub fn with_chooser(mut self, chooser: Box<dyn Chooser>) -> Self {
        self.chooser = Some(chooser);
        self
    }

    /// Create new branch on top of current branch and switch to it.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Usage`] if branch already exists.
    /// - Return [`Error::Tree`] if current branch is not tracked.
    #[instrument(skip(self), level = "debug")]
    pub fn create(&mut self, name: &str) -> Result<()> {
        let current = self.git.current_branch()?;
        self.tree.branch(&current)?;
        if self.tree.contains(name) || self.git.branch_exists(name)? {
            return Err(Error::usage(format!("Branch {name} already exists")));
        }

        self.git.query(&["switch", "-c", name])?;
        self.tree.set_parent(name, &current)?;
        info!("create {name:?} on top of {current:?}");
        writeln!(self.out, "Created {name} on top of {current}")?;

        Ok(())
    }

    /// Start tracking current branch on top of a parent, trunk by default.
    ///
    /// Tracking an already tracked branch re-parents it.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Tree`] if parent is unknown or would form a cycle.
    #[instrument(skip(self), level = "debug")]
    pub fn track(&mut self, parent: Option<&str>) -> Result<()> {
        let current = self.git.current_branch()?;
        let parent = parent.unwrap_or(self.tree.trunk()).to_string();
        self.tree.set_parent(&current, &parent)?;
        writeln!(self.out, "Tracking {current} on top of {parent}")?;

        Ok(())
    }

    /// Stop tracking a branch, current branch by default.
    ///
    /// The Git branch itself is left alone. Children of the branch move onto
    /// its parent.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Tree`] if branch is trunk or not tracked.
    #[instrument(skip(self), level = "debug")]
    pub fn untrack(&mut self, branch: Option<&str>) -> Result<()> {
        let branch = match branch {
            Some(branch) => branch.to_string(),
            None => self.git.current_branch()?,
        };
        self.tree.remove_branch(&branch)?;
        writeln!(self.out, "Stopped tracking {branch}")?;

        Ok(())
    }

    /// Delete tracked branch from Git and the tree.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Usage`] if branch is trunk.
    /// - Return [`Error::Tree`] if branch is not tracked.
    /// - Return [`Error::Git`] if Git refuses to delete the branch.
    #[instrument(skip(self), level = "debug")]
    pub fn delete(&mut self, branch: &str) -> Result<()> {
        if let BranchInfo::Trunk { .. } = self.tree.branch(branch)? {
            return Err(Error::usage("Cannot delete the trunk branch"));
        }

        self.git.query(&["branch", "-D", branch])?;
        self.tree.remove_branch(branch)?;
        writeln!(self.out, "Deleted {branch}")?;

        Ok(())
    }

    /// Rename current branch in Git and the tree.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Usage`] if current branch is trunk, or the new name
    ///   is taken.
    /// - Return [`Error::Tree`] if current branch is not tracked.
    #[instrument(skip(self), level = "debug")]
    pub fn rename(&mut self, name: &str) -> Result<()> {
        let current = self.git.current_branch()?;
        if let BranchInfo::Trunk { .. } = self.tree.branch(&current)? {
            return Err(Error::usage("Cannot rename the trunk branch"));
        }
        if self.tree.contains(name) || self.git.branch_exists(name)? {
            return Err(Error::usage(format!("Branch {name} already exists")));
        }

        self.git.query(&["branch", "-m", &current, name])?;
        self.tree.rename_branch(&current, name)?;
        writeln!(self.out, "Renamed {current} to {name}")?;

        Ok(())
    }

    /// Print parent of current branch.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Usage`] if current branch is trunk.
    pub fn parent(&mut self) -> Result<()> {
        let current = self.git.current_branch()?;
        match self.tree.branch(&current)? {
            BranchInfo::Trunk { .. } => Err(Error::usage(
                "Cannot get the parent of the trunk branch",
            )),
            BranchInfo::NonTrunk { parent, .. } => Ok(writeln!(self.out, "{parent}")?),
        }
    }

    /// Print children of current branch, one per line.
    pub fn children(&mut self) -> Result<()> {
        let current = self.git.current_branch()?;
        for child in self.tree.branch(&current)?.children() {
            writeln!(self.out, "{child}")?;
        }

        Ok(())
    }

    /// Print trunk.
    pub fn trunk(&mut self) -> Result<()> {
        Ok(writeln!(self.out, "{}", self.tree.trunk())?)
    }

    /// Print stacks as an indented tree.
    ///
    /// Only the stack of the current branch is shown when `only_stack` is
    /// set, otherwise every stack longest first.
    #[instrument(skip(self), level = "debug")]
    pub fn log(&mut self, mode: LogMode, only_stack: bool) -> Result<()> {
        let current = self.git.current_branch()?;
        let stacks = if only_stack {
            vec![self.tree.stack(&current, true)?.collect::<Vec<_>>()]
        } else {
            self.tree.stacks()
        };

        let git = self.git;
        let rendered = match mode {
            LogMode::Short => render_stacks(self.tree, &stacks, &current, |_| Vec::new()),
            LogMode::Long => render_stacks(self.tree, &stacks, &current, |info| commits(git, info)),
        };
        write!(self.out, "{rendered}")?;

        Ok(())
    }

    /// Switch `steps` branches toward trunk.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Stack`] if current branch is not tracked.
    #[instrument(skip(self), level = "debug")]
    pub fn down(&mut self, steps: usize) -> Result<()> {
        let current = self.git.current_branch()?;
        let step = steps_down(self.tree, &current, steps)?;
        self.land(&current, step)
    }

    /// Switch `steps` branches away from trunk.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Stack`] if a branch point needs a choice but no
    ///   chooser is available.
    #[instrument(skip(self), level = "debug")]
    pub fn up(&mut self, steps: usize) -> Result<()> {
        let current = self.git.current_branch()?;
        let chooser = self
            .chooser
            .as_deref_mut()
            .map(|chooser| chooser as &mut dyn Chooser);
        let step = steps_up(self.tree, &current, steps, chooser)?;
        self.land(&current, step)
    }

    /// Switch to the tip of current stack.
    pub fn top(&mut self) -> Result<()> {
        self.up(usize::MAX)
    }

    /// Switch to the branch of current stack closest to trunk.
    pub fn bottom(&mut self) -> Result<()> {
        let current = self.git.current_branch()?;
        let ancestors = self
            .tree
            .ancestors(&current)?
            .map(|info| info.name().to_string())
            .collect::<Vec<_>>();

        // INVARIANT: Last ancestor is always trunk, so the bottom branch sits
        // right before it.
        let step = match ancestors.len() {
            0 => Step::AtTrunk,
            1 => Step::Moved(current.clone()),
            len => Step::Moved(ancestors[len - 2].clone()),
        };
        self.land(&current, step)
    }

    /// Switch to a tracked branch.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Tree`] if branch is neither trunk nor tracked.
    pub fn checkout(&mut self, branch: &str) -> Result<()> {
        self.tree.branch(branch)?;
        self.switch(branch)
    }

    /// Rebase current branch onto a new parent, then restack its
    /// descendants.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Usage`] if current branch is trunk, or the rebase
    ///   stops on conflicts.
    /// - Return [`Error::Tree`] if new parent is unknown or would form a
    ///   cycle.
    /// - Return [`Error::Interrupted`] if a descendant fails to follow. The
    ///   new parent is kept either way.
    #[instrument(skip(self), level = "debug")]
    pub fn move_onto(&mut self, onto: &str) -> Result<()> {
        let current = self.git.current_branch()?;
        let old_parent = match self.tree.branch(&current)? {
            BranchInfo::Trunk { .. } => return Err(Error::usage("Cannot move the trunk branch")),
            BranchInfo::NonTrunk { parent, .. } => parent.to_string(),
        };
        self.tree.check_parent(&current, onto)?;

        info!("move {current:?} from {old_parent:?} onto {onto:?}");
        let output = self.git.run(&[
            "-c",
            "rebase.backend=apply",
            "rebase",
            "--onto",
            onto,
            &old_parent,
            &current,
        ])?;
        if !output.success() {
            return Err(conflict(&current, onto));
        }
        self.tree.set_parent(&current, onto)?;
        writeln!(self.out, "Moved {current} onto {onto}")?;

        // INVARIANT: Current branch already sits on its new parent, so the tree
        // must remember that even if its descendants fail to follow.
        self.restack_descendants(&current, &current).map_err(Error::interrupted)
    }

    /// Rebase branches that fell behind their parent.
    ///
    /// Branches already on top of their parent are skipped. Current branch is
    /// checked out again afterwards.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Usage`] if a rebase stops on conflicts. The rebase is
    ///   left in progress for the user to resolve.
    #[instrument(skip(self), level = "debug")]
    pub fn restack(&mut self, scope: RestackScope) -> Result<()> {
        let current = self.git.current_branch()?;
        let branches = match scope {
            RestackScope::Only => {
                self.tree.branch(&current)?;
                vec![current.clone()]
            }
            RestackScope::Upstack => {
                let mut branches = vec![current.clone()];
                branches.extend(names(self.tree.descendants(&current)?));
                branches
            }
            RestackScope::Downstack => names(self.tree.stack(&current, false)?),
            RestackScope::Stack => names(self.tree.stack(&current, true)?),
        };

        self.restack_branches(&branches)?;
        self.git.query(&["switch", &current])?;
        writeln!(self.out, "Restacked {current}")?;

        Ok(())
    }

    /// Continue rebase that stopped on conflicts.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Usage`] if the rebase still cannot proceed.
    pub fn continue_rebase(&mut self) -> Result<()> {
        let output = self
            .git
            .run(&["-c", "rebase.backend=apply", "rebase", "--continue"])?;
        if !output.success() {
            return Err(Error::usage(
                "Rebase still cannot continue. Resolve the conflicts and run `stackshim continue`, \
                 or run `stackshim abort` to give up",
            ));
        }
        writeln!(
            self.out,
            "Rebase continued, run `stackshim restack` to update the rest of the stack"
        )?;

        Ok(())
    }

    /// Abort rebase that stopped on conflicts.
    pub fn abort(&mut self) -> Result<()> {
        self.git.query(&["rebase", "--abort"])?;
        writeln!(self.out, "Rebase aborted")?;

        Ok(())
    }

    /// Push current branch, or every branch of its stack, to origin.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Usage`] if there is nothing but trunk to push.
    #[instrument(skip(self), level = "debug")]
    pub fn submit(&mut self, whole_stack: bool) -> Result<()> {
        let current = self.git.current_branch()?;
        let branches = if whole_stack {
            self.tree
                .stack(&current, true)?
                .filter_map(|info| match info {
                    BranchInfo::Trunk { .. } => None,
                    BranchInfo::NonTrunk { name, .. } => Some(name.to_string()),
                })
                .collect::<Vec<_>>()
        } else if let BranchInfo::NonTrunk { name, .. } = self.tree.branch(&current)? {
            vec![name.to_string()]
        } else {
            Vec::new()
        };

        if branches.is_empty() {
            return Err(Error::usage("Nothing to submit, trunk is not submitted"));
        }

        for branch in branches {
            info!("push {branch:?}");
            self.git
                .query(&["push", "--force-with-lease", "-u", "origin", &branch])?;
            writeln!(self.out, "Pushed {branch}")?;
        }

        Ok(())
    }

    /// Bring trunk up to date, drop merged branches, then restack.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Git`] if trunk cannot be fast-forwarded.
    /// - Return [`Error::Interrupted`] if dropping merged branches or
    ///   restacking fails. Branches already deleted stay forgotten.
    #[instrument(skip(self), level = "debug")]
    pub fn sync(&mut self, restack: bool) -> Result<()> {
        let trunk = self.tree.trunk().to_string();
        let mut current = self.git.current_branch()?;
        if current == trunk {
            self.git.query(&["pull", "--ff-only", "origin", &trunk])?;
        } else {
            self.git
                .query(&["fetch", "origin", &format!("{trunk}:{trunk}")])?;
        }

        // INVARIANT: Every merged branch deleted from Git stays deleted from
        // the tree, whatever fails afterwards.
        self.prune_merged(&trunk, &mut current)
            .and_then(|_| {
                if restack {
                    self.restack_descendants(&trunk, &current)
                } else {
                    Ok(())
                }
            })
            .map_err(Error::interrupted)?;
        writeln!(self.out, "Synced with {trunk}")?;

        Ok(())
    }

    fn prune_merged(&mut self, trunk: &str, current: &mut String) -> Result<()> {
        let merged = self
            .git
            .merged_branches(trunk)?
            .into_iter()
            .filter(|branch| self.tree.contains(branch.as_str()))
            .collect::<Vec<_>>();
        for branch in merged {
            if branch == *current {
                debug!("current branch {branch:?} was merged, leave it for trunk");
                self.git.query(&["switch", trunk])?;
                *current = trunk.to_string();
            }

            self.git.query(&["branch", "-D", &branch])?;
            self.tree.remove_branch(&branch)?;
            writeln!(self.out, "Deleted merged branch {branch}")?;
        }

        Ok(())
    }

    /// Restack every descendant of a branch, then check out `back_to`.
    fn restack_descendants(&mut self, branch: &str, back_to: &str) -> Result<()> {
        let descendants = names(self.tree.descendants(branch)?);
        self.restack_branches(&descendants)?;
        self.git.query(&["switch", back_to])?;

        Ok(())
    }

    fn restack_branches(&mut self, branches: &[String]) -> Result<()> {
        let bar = ProgressBar::new(branches.len() as u64);
        bar.set_style(ProgressStyle::with_template(
            "{spinner:.green} restacking {msg:<30} [{pos}/{len}]",
        )?);

        for branch in branches {
            bar.set_message(branch.clone());
            if let Err(error) = self.restack_one(branch) {
                bar.abandon();
                return Err(error);
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        Ok(())
    }

    fn restack_one(&mut self, branch: &str) -> Result<()> {
        let parent = match self.tree.branch(branch)? {
            BranchInfo::Trunk { .. } => return Ok(()),
            BranchInfo::NonTrunk { parent, .. } => parent.to_string(),
        };

        if self.git.is_fast_forward(&parent, branch)? {
            debug!("{branch:?} already sits on top of {parent:?}");
            return Ok(());
        }

        info!("restack {branch:?} onto {parent:?}");
        let output = self
            .git
            .run(&["-c", "rebase.backend=apply", "rebase", &parent, branch])?;
        if !output.success() {
            return Err(conflict(branch, &parent));
        }

        Ok(())
    }

    fn land(&mut self, current: &str, step: Step) -> Result<()> {
        match step {
            Step::Moved(target) if target != current => self.switch(&target),
            Step::Moved(_) | Step::AtTrunk => Ok(writeln!(self.out, "Already on {current}")?),
            Step::AtTop => Ok(writeln!(
                self.out,
                "Already at the top of the stack, {current} has no children"
            )?),
        }
    }

    fn switch(&mut self, branch: &str) -> Result<()> {
        info!("switch to {branch:?}");
        self.git.query(&["switch", branch])?;
        Ok(())
    }
}

fn names<'a>(infos: impl IntoIterator<Item = BranchInfo<'a>>) -> Vec<String> {
    infos
        .into_iter()
        .map(|info| info.name().to_string())
        .collect()
}

fn conflict(branch: &str, onto: &str) -> Error {
    Error::usage(format!(
        "Rebasing {branch} onto {onto} stopped on conflicts. Resolve them and run \
         `stackshim continue`, or run `stackshim abort` to give up"
    ))
}

fn commits(git: &impl Git, info: &BranchInfo<'_>) -> Vec<String> {
    let BranchInfo::NonTrunk { name, parent, .. } = info else {
        return Vec::new();
    };

    let range = format!("{parent}..{name}");
    match git.run(&["log", "--oneline", "--no-decorate", &range]) {
        Ok(output) if output.success() => output.stdout.lines().map(ToString::to_string).collect(),
        Ok(output) => {
            warn!("cannot list commits of {name:?}: {}", output.stderr.trim());
            Vec::new()
        }
        Err(error) => {
            warn!("cannot list commits of {name:?}: {error}");
            Vec::new()
        }
    }
}
