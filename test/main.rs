// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use stackshim::{
    git::{Git, GitError, Output},
    prompt::{Chooser, PromptError},
    BranchTree,
};

use anyhow::Result;
use git2::{BranchType, IndexEntry, IndexTime, Repository, RepositoryInitOptions};
use std::{
    cell::RefCell,
    collections::VecDeque,
    path::{Path, PathBuf},
};

/// Scripted stand-in for Git.
///
/// Records every subcommand it is asked to run. `switch` moves the current
/// branch like the real thing would.
pub(crate) struct FakeGit {
    current: RefCell<String>,
    calls: RefCell<Vec<String>>,
    failing: Vec<String>,
    behind: Vec<(String, String)>,
    existing: Vec<String>,
    merged: Vec<String>,
    responses: Vec<(String, String)>,
    common_dir: PathBuf,
}

impl FakeGit {
    pub(crate) fn on(branch: &str) -> Self {
        Self {
            current: RefCell::new(branch.into()),
            calls: RefCell::new(Vec::new()),
            failing: Vec::new(),
            behind: Vec::new(),
            existing: Vec::new(),
            merged: Vec::new(),
            responses: Vec::new(),
            common_dir: PathBuf::from(".git"),
        }
    }

    /// Fail every subcommand starting with prefix.
    pub(crate) fn failing(mut self, prefix: &str) -> Self {
        self.failing.push(prefix.into());
        self
    }

    /// Branch is no longer on top of its parent.
    pub(crate) fn behind(mut self, parent: &str, branch: &str) -> Self {
        self.behind.push((parent.into(), branch.into()));
        self
    }

    /// Branch exists in Git but is untracked.
    pub(crate) fn existing(mut self, branch: &str) -> Self {
        self.existing.push(branch.into());
        self
    }

    pub(crate) fn merged(mut self, branches: &[&str]) -> Self {
        self.merged = branches.iter().map(ToString::to_string).collect();
        self
    }

    /// Answer subcommand with stdout.
    pub(crate) fn responding(mut self, call: &str, stdout: &str) -> Self {
        self.responses.push((call.into(), stdout.into()));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub(crate) fn current(&self) -> String {
        self.current.borrow().clone()
    }
}

impl Git for FakeGit {
    fn current_branch(&self) -> Result<String, GitError> {
        Ok(self.current())
    }

    fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        let call = args.join(" ");
        self.calls.borrow_mut().push(call.clone());

        if self.failing.iter().any(|prefix| call.starts_with(prefix)) {
            return Ok(Output {
                code: 1,
                stdout: String::new(),
                stderr: "CONFLICT (content): merge conflict".into(),
            });
        }

        if args.first() == Some(&"switch") {
            if let Some(branch) = args.last() {
                *self.current.borrow_mut() = branch.to_string();
            }
        }

        let stdout = self
            .responses
            .iter()
            .find(|(answers, _)| *answers == call)
            .map(|(_, stdout)| stdout.clone())
            .unwrap_or_default();

        Ok(Output {
            stdout,
            ..Output::default()
        })
    }

    fn is_fast_forward(&self, from: &str, to: &str) -> Result<bool, GitError> {
        Ok(!self
            .behind
            .iter()
            .any(|(parent, branch)| parent == from && branch == to))
    }

    fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        Ok(self.existing.iter().any(|branch| branch == name) || *self.current.borrow() == name)
    }

    fn merged_branches(&self, _trunk: &str) -> Result<Vec<String>, GitError> {
        Ok(self.merged.clone())
    }

    fn common_dir(&self) -> &Path {
        &self.common_dir
    }
}

/// Chooser answering from a script, recording what it was offered.
#[derive(Default)]
pub(crate) struct ScriptedChooser {
    answers: VecDeque<String>,
}

impl ScriptedChooser {
    pub(crate) fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Chooser for ScriptedChooser {
    fn choose_one(&mut self, _prompt: &str, _options: &[String]) -> Result<String, PromptError> {
        self.answers.pop_front().ok_or(PromptError::Cancelled)
    }
}

/// Build tree from `(branch, parent)` pairs.
pub(crate) fn tree(trunk: &str, branches: &[(&str, &str)]) -> BranchTree {
    let mut tree = BranchTree::new(trunk);
    for (branch, parent) in branches {
        tree.set_parent(branch, parent).unwrap();
    }
    tree
}

pub(crate) struct RepoFixture {
    repo: Repository,
}

impl RepoFixture {
    pub(crate) fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(path.as_ref(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        Ok(Self { repo })
    }

    /// Create branch at HEAD and make it the current branch.
    pub(crate) fn branch_off(&self, name: &str) -> Result<()> {
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.branch(name, &head, false)?;
        self.switch(name)
    }

    pub(crate) fn switch(&self, name: &str) -> Result<()> {
        let branch = self.repo.find_branch(name, BranchType::Local)?;
        let reference = branch.get().name().unwrap_or_default().to_string();
        self.repo.set_head(&reference)?;
        Ok(())
    }

    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<()> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename
                .as_ref()
                .as_os_str()
                .to_string_lossy()
                .into_owned()
                .as_bytes()
                .to_vec(),
        };

        // INVARIANT: Always use new tree produced by index after staging new entry.
        let mut index = self.repo.index()?;
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        // INVARIANT: Always determine latest parent commits to append to.
        let signature = self.repo.signature()?;
        let mut parents = Vec::new();
        if let Some(parent) = self.repo.head().ok().and_then(|head| head.target()) {
            parents.push(self.repo.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        // INVARIANT: Commit to HEAD by appending to obtained parent commits.
        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            format!("chore: add {:?}", filename.as_ref()).as_ref(),
            &tree,
            &parents,
        )?;

        Ok(())
    }
}
