// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External backend dispatch.
//!
//! Repositories configured for the external stacking tool still go through
//! stackshim first. Cheap questions are answered from the tool's cache when
//! the fast path is enabled, everything else is handed over to the tool.

use crate::{
    cache::CacheOnlyReader,
    config::EXTERNAL_TOOL,
    error::{Error, Result},
    git::Git,
    path::{external_cache_file, find_executable},
};

use std::{env::current_exe, ffi::OsString, path::PathBuf};
use tracing::{debug, instrument};

/// What to do with a command meant for the external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Command was answered from cache, print answer.
    Answered(String),

    /// Run external tool at path with the original arguments.
    HandOver(PathBuf),
}

/// Decide how to serve command line for the external backend.
///
/// Only a bare `trunk` or `parent` qualifies for the fast path. Anything with
/// extra arguments is left to the tool, which knows what they mean.
///
/// # Errors
///
/// - Return [`Error::Cache`] if the fast path cannot answer from cache.
/// - Return [`Error::Usage`] if the external tool is not installed, or
///   `PATH` resolves its name back to stackshim.
#[instrument(skip(git), level = "debug")]
pub fn dispatch(git: &impl Git, fast_path: bool, args: &[OsString]) -> Result<Dispatch> {
    let command = args.get(1).and_then(|arg| arg.to_str());
    if fast_path && args.len() == 2 && matches!(command, Some("trunk" | "parent")) {
        let reader = CacheOnlyReader::new(external_cache_file(git.common_dir()));
        let current = git.current_branch()?;
        let answer = match command {
            Some("trunk") => reader.trunk(&current)?,
            _ => reader.parent(&current)?,
        };
        debug!("answered {command:?} from cache");

        return Ok(Dispatch::Answered(answer));
    }

    let program = find_executable(EXTERNAL_TOOL)
        .ok_or_else(|| Error::usage(format!("`{EXTERNAL_TOOL}` is not installed")))?;

    // INVARIANT: Never hand over to ourselves when installed under the
    // external tool's name.
    let this = current_exe().and_then(|path| path.canonicalize()).ok();
    if program.canonicalize().ok() == this {
        return Err(Error::usage(format!(
            "`{EXTERNAL_TOOL}` on PATH resolves to stackshim itself, install the external tool or \
             switch to the shim backend with `stackshim init`"
        )));
    }

    Ok(Dispatch::HandOver(program))
}
