// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Stacked branches on top of plain Git.
//!
//! A __stack__ is a chain of branches where each one builds on the one below
//! it, bottoming out at the __trunk__ branch (usually `main`). Git itself has
//! no idea branches depend on each other, so stackshim records the
//! dependency of every tracked branch in a small [`BranchTree`], persists it
//! per repository, and answers the questions stacking workflows need: what is
//! my parent, what sits on top of me, which branches make up my stack.
//!
//! Repositories already managed by the external stacking tool can keep it.
//! In that case stackshim only answers `trunk` and `parent` straight from the
//! tool's own cache through [`CacheOnlyReader`], and hands everything else
//! over to the tool.

pub mod alias;
pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod external;
pub mod git;
pub mod path;
pub mod prompt;
pub mod render;
pub mod stack;
pub mod store;
pub mod tree;

pub use cache::CacheOnlyReader;
pub use command::{LogMode, RestackScope, Shim};
pub use config::{Backend, Config};
pub use error::{Error, ErrorKind, Result};
pub use git::{Git, Git2Client, Output};
pub use prompt::{Chooser, InquireChooser};
pub use stack::Step;
pub use store::TreeStore;
pub use tree::{BranchInfo, BranchTree};
