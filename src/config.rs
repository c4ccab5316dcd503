// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Each repository gets its own configuration file at
//! `<git common dir>/.stackshim.toml`. The file decides which __backend__
//! serves commands: the built-in shim with its own branch tree, or the real
//! external stacking tool.
//!
//! # General Layout
//!
//! ```toml
//! aliases = "~/.config/graphite/aliases"
//!
//! [backend]
//! kind = "shim"
//! trunk = "main"
//! ```
//!
//! The aliases path goes through shell expansion when parsed.

use crate::{git::Git, path::find_executable, prompt};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    io::ErrorKind,
    path::Path,
    str::FromStr,
};
use tracing::{debug, info, instrument};

/// Name of the external stacking tool binary.
pub const EXTERNAL_TOOL: &str = "gt";

/// Per-repository configuration.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Optional path to user aliases file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<String>,

    /// Backend serving commands.
    pub backend: Backend,
}

impl Config {
    /// Construct configuration for backend.
    pub fn new(backend: Backend) -> Self {
        Self {
            aliases: None,
            backend,
        }
    }

    /// Load configuration file.
    ///
    /// Returns `None` if the file does not exist yet, i.e., the repository
    /// has never been set up.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file cannot be parsed.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        debug!("load configuration at {:?}", path.as_ref().display());
        match read_to_string(path.as_ref()) {
            Ok(data) => data.parse().map(Some),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(ConfigError::Read(error)),
        }
    }

    /// Write configuration file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Serialize`] if configuration cannot be
    ///   serialized.
    /// - Return [`ConfigError::Write`] if file cannot be written.
    #[instrument(skip(self, path), level = "debug")]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        info!("write configuration to {:?}", path.as_ref().display());
        let data = toml::ser::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        write(path.as_ref(), data).map_err(ConfigError::Write)
    }

    /// Guided first-run setup.
    ///
    /// Infers sensible defaults from the repository, then lets the user
    /// confirm or override them. When not running interactively, inferred
    /// defaults are taken as is.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Prompt`] if prompting fails.
    pub fn setup(git: &impl Git, interactive: bool) -> Result<Self> {
        let inferred = Inferred::load(git);
        if !interactive {
            info!("not running interactively, using inferred configuration");
            return Ok(Self::new(inferred.into_backend()));
        }

        let use_external = prompt::ask_yesno(
            &format!("Use `{EXTERNAL_TOOL}`?"),
            inferred.use_external,
        )?;
        let backend = if use_external {
            Backend::External { fast_path: true }
        } else {
            Backend::Shim {
                trunk: prompt::ask("Trunk branch", &inferred.trunk)?,
            }
        };

        Ok(Self::new(backend))
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on aliases path.
        if let Some(aliases) = config.aliases.take() {
            config.aliases = Some(
                shellexpand::full(&aliases)
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            );
        }

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Backend serving commands.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Backend {
    /// Delegate to the external stacking tool.
    External {
        /// Answer `trunk` and `parent` from the tool's cache.
        #[serde(default = "enabled")]
        fast_path: bool,
    },

    /// Serve commands through stackshim's own branch tree.
    Shim {
        /// Trunk of the branch tree.
        trunk: String,
    },
}

fn enabled() -> bool {
    true
}

/// Defaults guessed from the repository for first-run setup.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Inferred {
    use_external: bool,
    trunk: String,
}

impl Inferred {
    fn load(git: &impl Git) -> Self {
        let installed = find_executable(EXTERNAL_TOOL).is_some();
        let on_github = git
            .query(&["config", "remote.origin.url"])
            .map(|url| url.contains("github.com"))
            .unwrap_or(false);
        let trunk = git
            .query(&["rev-parse", "--abbrev-ref", "origin/HEAD"])
            .ok()
            .and_then(|head| head.strip_prefix("origin/").map(ToString::to_string))
            .filter(|trunk| !trunk.is_empty())
            .unwrap_or_else(|| "main".to_string());

        debug!("inferred trunk {trunk:?}, external tool installed: {installed}, github: {on_github}");
        Self {
            use_external: installed && on_github,
            trunk,
        }
    }

    fn into_backend(self) -> Backend {
        if self.use_external {
            Backend::External { fast_path: true }
        } else {
            Backend::Shim { trunk: self.trunk }
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file")]
    Read(#[source] std::io::Error),

    /// Failed to write configuration file.
    #[error("failed to write configuration file")]
    Write(#[source] std::io::Error),

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to prompt user during setup.
    #[error(transparent)]
    Prompt(#[from] crate::prompt::PromptError),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
