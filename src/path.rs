// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevant path information for external files that need to be
//! interacted with, or managed in some way.

use std::{
    env::{split_paths, var_os},
    path::{Path, PathBuf},
};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default path to user's command aliases file.
///
/// Shares the aliases file of the external stacking tool, so both agree on
/// what an alias means.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_aliases_file() -> Result<PathBuf> {
    home_dir().map(|home| home.join(".config").join("graphite").join("aliases"))
}

/// Path to per-repository configuration file.
pub fn config_file(common_dir: impl AsRef<Path>) -> PathBuf {
    common_dir.as_ref().join(".stackshim.toml")
}

/// Path to per-repository tree store.
pub fn store_file(common_dir: impl AsRef<Path>) -> PathBuf {
    common_dir.as_ref().join(".stackshim").join("store.json")
}

/// Path to the external stacking tool's persisted cache.
pub fn external_cache_file(common_dir: impl AsRef<Path>) -> PathBuf {
    common_dir.as_ref().join(".graphite_cache_persist")
}

/// Find executable by name in `$PATH`.
///
/// Returns the first regular file matching the name that can be executed.
/// On unix that means at least one execute permission bit is set.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let paths = var_os("PATH")?;
    split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{env::current_dir, fs::write};

    #[test]
    fn repository_file_layout() {
        assert_eq!(
            config_file("/repo/.git"),
            PathBuf::from("/repo/.git/.stackshim.toml")
        );
        assert_eq!(
            store_file("/repo/.git"),
            PathBuf::from("/repo/.git/.stackshim/store.json")
        );
        assert_eq!(
            external_cache_file("/repo/.git"),
            PathBuf::from("/repo/.git/.graphite_cache_persist")
        );
    }

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn aliases_file_lives_in_home() -> anyhow::Result<()> {
        assert_eq!(
            default_aliases_file()?,
            PathBuf::from("/home/blah/.config/graphite/aliases")
        );

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn find_executable_scans_path() -> anyhow::Result<()> {
        use std::{fs::set_permissions, os::unix::fs::PermissionsExt};

        mkdirp::mkdirp("plain")?;
        mkdirp::mkdirp("bin")?;
        write("plain/gt", "")?;
        write("bin/gt", "")?;
        set_permissions("bin/gt", std::fs::Permissions::from_mode(0o755))?;
        let plain = current_dir()?.join("plain");
        let bin = current_dir()?.join("bin");
        std::env::set_var("PATH", std::env::join_paths([&plain, &bin])?);

        // INVARIANT: Files without execute permission are skipped.
        assert_eq!(find_executable("gt"), Some(bin.join("gt")));
        assert_eq!(find_executable("nope"), None);

        set_permissions("bin/gt", std::fs::Permissions::from_mode(0o644))?;
        assert_eq!(find_executable("gt"), None);

        Ok(())
    }
}
