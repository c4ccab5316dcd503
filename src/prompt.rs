// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Interactive prompting.
//!
//! Some commands need the user to break a tie, e.g., picking which child to
//! step onto when a branch has more than one. The [`Chooser`] trait is that
//! single request/response seam. It is optional everywhere: when stdin is not
//! a terminal no chooser is handed out, and ambiguity becomes a usage error
//! instead of a silent pick.

use inquire::{Confirm, InquireError, Select, Text};
use std::io::{stdin, IsTerminal};

/// Pick one option out of many.
pub trait Chooser {
    /// Ask user to pick one of the given options.
    ///
    /// Callers must never pass an empty option list.
    ///
    /// # Errors
    ///
    /// - Return [`PromptError::Cancelled`] if user backs out.
    fn choose_one(&mut self, prompt: &str, options: &[String]) -> Result<String>;
}

/// Terminal chooser backed by inquire.
#[derive(Debug, Default)]
pub struct InquireChooser;

impl InquireChooser {
    /// Hand out a terminal chooser only when stdin is interactive.
    pub fn detect() -> Option<Self> {
        stdin().is_terminal().then_some(Self)
    }
}

impl Chooser for InquireChooser {
    fn choose_one(&mut self, prompt: &str, options: &[String]) -> Result<String> {
        Ok(Select::new(prompt, options.to_vec()).prompt()?)
    }
}

/// Ask for free text, falling back to a default on empty input.
///
/// # Errors
///
/// - Return [`PromptError::Cancelled`] if user backs out.
pub fn ask(prompt: &str, default: &str) -> Result<String> {
    let response = Text::new(prompt).with_default(default).prompt()?;
    let response = response.trim();
    if response.is_empty() {
        return Ok(default.to_string());
    }

    Ok(response.to_string())
}

/// Ask a yes or no question.
///
/// # Errors
///
/// - Return [`PromptError::Cancelled`] if user backs out.
pub fn ask_yesno(prompt: &str, default: bool) -> Result<bool> {
    Ok(Confirm::new(prompt).with_default(default).prompt()?)
}

/// Prompting error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// User cancelled or interrupted the prompt.
    #[error("prompt cancelled by user")]
    Cancelled,

    /// Terminal could not be driven.
    #[error(transparent)]
    Terminal(InquireError),
}

impl From<InquireError> for PromptError {
    fn from(error: InquireError) -> Self {
        match error {
            InquireError::OperationCanceled | InquireError::OperationInterrupted => Self::Cancelled,
            other => Self::Terminal(other),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;
