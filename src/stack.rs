// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Stack queries and stack-relative navigation.
//!
//! A __stack__ is the chain of branches from trunk down through a given
//! branch, optionally followed by everything stacked on top of it. Stacks are
//! always listed trunk-most first.
//!
//! Navigation moves along a stack: "down" walks toward trunk, "up" walks
//! toward descendants. Walking down is never ambiguous. Walking up is
//! ambiguous whenever a branch has more than one child, in which case a
//! [`Chooser`] has to break the tie.

use crate::{
    prompt::{Chooser, PromptError},
    tree::{BranchInfo, BranchTree, TreeError},
};

use std::cmp::Reverse;
use tracing::debug;

impl BranchTree {
    /// Full stack of branch, trunk-most first.
    ///
    /// Yields the ancestors of branch from trunk down to its parent, then the
    /// branch itself, then every descendant in pre-order if requested.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::NotFound`] if branch is neither trunk nor tracked.
    pub fn stack(
        &self,
        name: &str,
        include_descendants: bool,
    ) -> Result<impl Iterator<Item = BranchInfo<'_>> + '_, TreeError> {
        let info = self.branch(name)?;
        let mut ancestors = self.ancestors(name)?.collect::<Vec<_>>();
        ancestors.reverse();
        let descendants = include_descendants
            .then(|| self.descendants(name))
            .transpose()?
            .into_iter()
            .flatten();

        Ok(ancestors
            .into_iter()
            .chain(std::iter::once(info))
            .chain(descendants))
    }

    /// Every stack rooted at a child of trunk, longest first.
    ///
    /// Stacks of equal length keep the order their roots were stacked onto
    /// trunk. A trunk without children yields a single stack holding only
    /// trunk.
    pub fn stacks(&self) -> Vec<Vec<BranchInfo<'_>>> {
        let trunk = self.trunk();
        let roots = self
            .children(trunk)
            .map(|children| children.map(|child| child.name()).collect::<Vec<_>>())
            .unwrap_or_default();

        if roots.is_empty() {
            return self.branch(trunk).map(|info| vec![vec![info]]).unwrap_or_default();
        }

        let mut stacks = roots
            .into_iter()
            .filter_map(|root| self.stack(root, true).ok())
            .map(|stack| stack.collect::<Vec<_>>())
            .collect::<Vec<_>>();

        // INVARIANT: Stable sort so discovery order breaks ties.
        stacks.sort_by_key(|stack| Reverse(stack.len()));
        stacks
    }
}

/// Where a navigation request ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Already on trunk, nothing further down.
    AtTrunk,

    /// Already on a branch without children, nothing further up.
    AtTop,

    /// Landed on this branch.
    Moved(String),
}

/// Walk toward trunk.
///
/// Selects the `steps`-th ancestor of `from`, counting the immediate parent
/// as the first. Overshooting clamps to the furthest ancestor, which is
/// always trunk.
///
/// # Errors
///
/// - Return [`StackError::Tree`] if `from` is neither trunk nor tracked.
pub fn steps_down(tree: &BranchTree, from: &str, steps: usize) -> Result<Step> {
    let ancestors = tree.ancestors(from)?.collect::<Vec<_>>();
    let Some(last) = ancestors.last() else {
        return Ok(Step::AtTrunk);
    };

    let target = match steps {
        0 => return Ok(Step::Moved(from.to_string())),
        steps => ancestors.get(steps - 1).unwrap_or(last),
    };
    debug!("{steps} step(s) down from {from:?} lands on {:?}", target.name());

    Ok(Step::Moved(target.name().to_string()))
}

/// Walk toward descendants.
///
/// Each step follows the only child of the current position. Running out of
/// children stops early. More than one child needs a chooser to pick which
/// one to follow.
///
/// # Errors
///
/// - Return [`StackError::Tree`] if `from` is neither trunk nor tracked.
/// - Return [`StackError::Ambiguous`] if a branch point is hit without a
///   chooser.
/// - Return [`StackError::UnknownChoice`] if chooser picks something that is
///   not a child.
/// - Return [`StackError::Prompt`] if chooser fails.
pub fn steps_up(
    tree: &BranchTree,
    from: &str,
    steps: usize,
    mut chooser: Option<&mut dyn Chooser>,
) -> Result<Step> {
    let mut current = tree.branch(from)?;
    let mut taken = 0;

    while taken < steps {
        let next = match current.children() {
            [] => break,
            [only] => only.clone(),
            children => {
                let Some(chooser) = chooser.as_deref_mut() else {
                    return Err(StackError::Ambiguous {
                        branch: current.name().to_string(),
                        children: children.to_vec(),
                    });
                };

                let choice = chooser.choose_one("Select branch:", children)?;
                if !children.contains(&choice) {
                    return Err(StackError::UnknownChoice {
                        branch: current.name().to_string(),
                        choice,
                    });
                }
                choice
            }
        };

        current = tree.branch(&next)?;
        taken += 1;
    }

    debug!("{taken} of {steps} step(s) up from {from:?} lands on {:?}", current.name());
    if taken == 0 && steps > 0 {
        return Ok(Step::AtTop);
    }

    Ok(Step::Moved(current.name().to_string()))
}

/// Stack navigation error types.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// Tree lookup fails.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Branch point reached with nobody to pick a child.
    #[error("branch {branch:?} has multiple children ({}), pick one by running interactively", children.join(", "))]
    Ambiguous {
        branch: String,
        children: Vec<String>,
    },

    /// Chooser picked a branch that is not a child.
    #[error("{choice:?} is not a child of {branch:?}")]
    UnknownChoice { branch: String, choice: String },

    /// Chooser fails.
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Friendly result alias :3
pub type Result<T, E = StackError> = std::result::Result<T, E>;
