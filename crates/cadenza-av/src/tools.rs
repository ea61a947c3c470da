//! External transcoder executable resolution.
//!
//! Executables named in command templates are looked up in the configured
//! transcoder directory first, then in `PATH` via [`which`]. A rule whose
//! executable cannot be resolved is not runnable and must never be selected.

use std::path::{Path, PathBuf};

use cadenza_core::{Error, Result};

/// Availability information for one executable, as reported by
/// [`ToolResolver::check`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolInfo {
    /// Executable name as written in the command template.
    pub name: String,
    /// Whether the executable was found.
    pub available: bool,
    /// Resolved path, if found.
    pub path: Option<PathBuf>,
}

/// Resolves executable names against the transcoder directory, falling back
/// to `PATH`.
#[derive(Debug, Clone)]
pub struct ToolResolver {
    transcoder_dir: PathBuf,
}

impl ToolResolver {
    pub fn new(transcoder_dir: impl Into<PathBuf>) -> Self {
        Self {
            transcoder_dir: transcoder_dir.into(),
        }
    }

    /// The directory searched before `PATH`.
    pub fn transcoder_dir(&self) -> &Path {
        &self.transcoder_dir
    }

    /// Resolve an executable name to a full path, or `None` if it cannot be
    /// located.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let candidate = self.transcoder_dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        which::which(name).ok()
    }

    /// Resolve an executable name, returning [`Error::Tool`] when missing.
    pub fn require(&self, name: &str) -> Result<PathBuf> {
        self.resolve(name).ok_or_else(|| {
            Error::tool(
                name,
                format!(
                    "not found in {} or PATH",
                    self.transcoder_dir.display()
                ),
            )
        })
    }

    /// Whether the first token of a command template resolves to an
    /// executable. Templates whose executable is missing make their rule
    /// inapplicable.
    pub fn is_runnable(&self, template: &str) -> bool {
        crate::template::tokenize(template)
            .first()
            .map(|exe| self.resolve(exe).is_some())
            .unwrap_or(false)
    }

    /// Check a list of executable names and return availability info for
    /// each; used by the `check-tools` diagnostic command.
    pub fn check(&self, names: &[&str]) -> Vec<ToolInfo> {
        names
            .iter()
            .map(|&name| {
                let path = self.resolve(name);
                ToolInfo {
                    name: name.to_string(),
                    available: path.is_some(),
                    path,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_missing_tool_returns_none() {
        let resolver = ToolResolver::new("/nonexistent/dir");
        assert!(resolver.resolve("no_such_tool_xyz_12345").is_none());
    }

    #[test]
    fn require_missing_tool_is_tool_error() {
        let resolver = ToolResolver::new("/nonexistent/dir");
        let err = resolver.require("no_such_tool_xyz_12345").unwrap_err();
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn transcoder_dir_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("faketool");
        std::fs::write(&fake, b"#!/bin/sh\n").unwrap();

        let resolver = ToolResolver::new(dir.path());
        assert_eq!(resolver.resolve("faketool"), Some(fake));
    }

    #[test]
    fn is_runnable_checks_first_token_only() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("enc");
        std::fs::write(&fake, b"#!/bin/sh\n").unwrap();

        let resolver = ToolResolver::new(dir.path());
        assert!(resolver.is_runnable("enc -i %s -f mp3 -"));
        assert!(!resolver.is_runnable("missing_enc -i %s -f mp3 -"));
        assert!(!resolver.is_runnable(""));
    }

    #[test]
    fn check_reports_availability() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("enc"), b"").unwrap();

        let resolver = ToolResolver::new(dir.path());
        let infos = resolver.check(&["enc", "missing_enc"]);
        assert_eq!(infos.len(), 2);
        assert!(infos[0].available);
        assert!(!infos[1].available);
    }
}
