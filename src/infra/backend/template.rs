//! Argument-vector command templates with `{instance}` and `{source}` placeholders.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Placeholder replaced by the backend instance name.
pub const INSTANCE_PLACEHOLDER: &str = "{instance}";
/// Placeholder replaced by the capture path.
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// A program and its arguments, with placeholders substituted per call.
///
/// Each element is one argument; no shell word splitting happens at
/// render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate {
    argv: Vec<String>,
}

impl CommandTemplate {
    /// Build from an argument vector.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a whitespace-separated command line.
    pub fn parse(line: &str) -> Self {
        Self::new(line.split_whitespace())
    }

    /// Whether any argument mentions `placeholder`.
    pub fn uses(&self, placeholder: &str) -> bool {
        self.argv.iter().any(|a| a.contains(placeholder))
    }

    /// Validate the template.
    pub fn validate(&self) -> Result<(), String> {
        match self.argv.first() {
            None => Err("command template is empty".into()),
            Some(program) if program.trim().is_empty() => {
                Err("command template has no program".into())
            }
            Some(_) => Ok(()),
        }
    }

    /// Substitute placeholders.
    pub fn render(&self, instance: &str, source: Option<&Path>) -> Vec<String> {
        let source = source.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        self.argv
            .iter()
            .map(|arg| {
                arg.replace(INSTANCE_PLACEHOLDER, instance)
                    .replace(SOURCE_PLACEHOLDER, &source)
            })
            .collect()
    }

    /// Rendered command with null stdin, killed when dropped.
    pub fn command(&self, instance: &str, source: Option<&Path>) -> Option<Command> {
        let mut argv = self.render(instance, source).into_iter();
        let mut cmd = Command::new(argv.next()?);
        cmd.args(argv).stdin(Stdio::null()).kill_on_drop(true);
        Some(cmd)
    }
}
