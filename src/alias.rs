// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Command aliases.
//!
//! An alias maps one word to a sequence of arguments, e.g., `ls` expands to
//! `log short`. A handful of defaults always exist. The user can add to or
//! override them through an aliases file with one alias per line:
//!
//! ```text
//! # comment
//! co checkout
//! ls log short --stack
//! ```
//!
//! Only the first argument of an invocation is ever expanded.

use std::{
    collections::HashMap,
    ffi::OsString,
    fs::read_to_string,
    io::ErrorKind,
    path::Path,
};
use tracing::{debug, instrument, warn};

const DEFAULT_ALIASES: &[(&str, &[&str])] = &[
    ("ls", &["log", "short"]),
    ("ll", &["log", "long"]),
    ("ss", &["submit", "--stack"]),
    ("s", &["submit"]),
];

/// Table of command aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aliases {
    table: HashMap<String, Vec<String>>,
}

impl Aliases {
    /// Load default aliases merged with aliases file.
    ///
    /// A missing or unreadable aliases file just leaves the defaults.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Self {
        match read_to_string(path.as_ref()) {
            Ok(content) => content.as_str().into(),
            Err(error) if error.kind() == ErrorKind::NotFound => Self::default(),
            Err(error) => {
                warn!("ignore aliases file {:?}: {error}", path.as_ref().display());
                Self::default()
            }
        }
    }

    /// Look up alias expansion.
    pub fn get(&self, alias: &str) -> Option<&[String]> {
        self.table.get(alias).map(Vec::as_slice)
    }

    /// Expand first argument after program name if it is an alias.
    pub fn expand(&self, args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
        let mut args = args.into_iter().collect::<Vec<_>>();
        let expansion = args
            .get(1)
            .and_then(|arg| arg.to_str())
            .and_then(|arg| self.get(arg));

        if let Some(expansion) = expansion {
            debug!("expand alias {:?} to {expansion:?}", args[1]);
            let expansion = expansion.iter().map(OsString::from).collect::<Vec<_>>();
            args.splice(1..2, expansion);
        }

        args
    }
}

impl Default for Aliases {
    fn default() -> Self {
        let table = DEFAULT_ALIASES
            .iter()
            .map(|(alias, args)| {
                (
                    alias.to_string(),
                    args.iter().map(ToString::to_string).collect(),
                )
            })
            .collect();

        Self { table }
    }
}

impl From<&str> for Aliases {
    fn from(content: &str) -> Self {
        let mut aliases = Self::default();
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut words = line.split_whitespace();
                let alias = words.next()?;
                Some((alias.to_string(), words.map(ToString::to_string).collect()))
            });
        aliases.table.extend(entries);

        aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn args(words: &[&str]) -> Vec<OsString> {
        words.iter().map(OsString::from).collect()
    }

    #[test]
    fn parse_aliases_file() {
        let aliases = Aliases::from(indoc! {r#"
            # my aliases
            co checkout

            ls log short --stack
        "#});

        assert_eq!(aliases.get("co"), Some(&["checkout".to_string()][..]));
        assert_eq!(
            aliases.get("ls"),
            Some(&["log".to_string(), "short".into(), "--stack".into()][..])
        );
        assert_eq!(aliases.get("ss"), Some(&["submit".to_string(), "--stack".into()][..]));
        assert_eq!(aliases.get("# my"), None);
    }

    #[test_case(&["gt", "ss"], &["gt", "submit", "--stack"]; "default alias")]
    #[test_case(&["gt", "ll", "--stack"], &["gt", "log", "long", "--stack"]; "keeps trailing args")]
    #[test_case(&["gt", "up", "ls"], &["gt", "up", "ls"]; "only first argument")]
    #[test_case(&["gt"], &["gt"]; "no arguments")]
    #[test]
    fn expand_first_argument(input: &[&str], expect: &[&str]) {
        pretty_assertions::assert_eq!(Aliases::default().expand(args(input)), args(expect));
    }
}
