//! Command-template rendering: `%x` placeholder substitution over
//! shell-like tokens.
//!
//! A template like
//!
//! ```text
//! ffmpeg -ss %o -i %s -b:a %bk -v 0 -f mp3 -
//! ```
//!
//! is split into tokens (double quotes group words), then every token except
//! the first has its placeholders replaced. The first token is the
//! executable name and is resolved separately (see
//! [`crate::tools::ToolResolver`]). Placeholders whose value was not
//! supplied are left untouched, never replaced with an empty string;
//! callers omit unused placeholders from the map instead.
//!
//! | key | value |
//! |-----|-------|
//! | `%t` | title |
//! | `%a` | artist |
//! | `%l` | album |
//! | `%f` | source format |
//! | `%b` | max bitrate (kbps) |
//! | `%o` | time offset (seconds) |
//! | `%d` | duration (seconds) |
//! | `%w` | width (pixels) |
//! | `%h` | height (pixels) |
//! | `%v` | average video bitrate (kbps) |
//! | `%r` | suitable audio bitrate (kbps) |
//! | `%i` | audio track index |
//! | `%j` | HLS segment index |
//! | `%n` | HLS segment filename pattern |
//! | `%s` | input path |
//! | `%p` | output path |

use std::collections::HashMap;
use std::path::Path;

use cadenza_core::{Dimensions, Result};

use crate::tools::ToolResolver;

/// Values available for substitution into one command template.
///
/// Built per request; pure data.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    vars: HashMap<char, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a raw placeholder value by key character.
    pub fn set(&mut self, key: char, value: impl Into<String>) {
        self.vars.insert(key, value.into());
    }

    /// Get a placeholder value by key character.
    pub fn get(&self, key: char) -> Option<&str> {
        self.vars.get(&key).map(|s| s.as_str())
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.set('t', title);
        self
    }

    pub fn with_artist(mut self, artist: &str) -> Self {
        self.set('a', artist);
        self
    }

    pub fn with_album(mut self, album: &str) -> Self {
        self.set('l', album);
        self
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.set('f', format);
        self
    }

    pub fn with_max_bitrate(mut self, kbps: u32) -> Self {
        self.set('b', kbps.to_string());
        self
    }

    pub fn with_time_offset(mut self, secs: u32) -> Self {
        self.set('o', secs.to_string());
        self
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.set('d', secs.to_string());
        self
    }

    /// Sets both `%w` and `%h`.
    pub fn with_dimensions(mut self, dim: Dimensions) -> Self {
        self.set('w', dim.width.to_string());
        self.set('h', dim.height.to_string());
        self
    }

    pub fn with_average_video_bitrate(mut self, kbps: u32) -> Self {
        self.set('v', kbps.to_string());
        self
    }

    pub fn with_audio_bitrate(mut self, kbps: u32) -> Self {
        self.set('r', kbps.to_string());
        self
    }

    pub fn with_audio_track(mut self, index: u32) -> Self {
        self.set('i', index.to_string());
        self
    }

    pub fn with_segment_index(mut self, index: u64) -> Self {
        self.set('j', index.to_string());
        self
    }

    pub fn with_segment_filename(mut self, pattern: &str) -> Self {
        self.set('n', pattern);
        self
    }

    pub fn with_input(mut self, path: &Path) -> Self {
        self.set('s', path.display().to_string());
        self
    }

    pub fn with_output(mut self, path: &Path) -> Self {
        self.set('p', path.display().to_string());
        self
    }
}

/// Split a command template into tokens.
///
/// Whitespace separates tokens; double quotes group words into one token
/// (the quotes themselves are dropped). No escape processing; templates
/// are trusted configuration, not user input.
pub fn tokenize(template: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in template.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Substitute placeholders in a single token.
///
/// A single left-to-right scan, so substituted values are never themselves
/// rescanned (a title containing `%s` stays literal).
fn substitute(token: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.peek().copied() {
                Some(key) if vars.get(key).is_some() => {
                    chars.next();
                    out.push_str(vars.get(key).unwrap());
                }
                _ => out.push(c),
            }
        } else {
            out.push(c);
        }
    }

    out
}

/// Render a template to an argv, substituting placeholders in every token
/// except the first (the executable name). Pure function.
pub fn render(template: &str, vars: &TemplateVars) -> Vec<String> {
    tokenize(template)
        .into_iter()
        .enumerate()
        .map(|(i, token)| {
            if i == 0 {
                token
            } else {
                substitute(&token, vars)
            }
        })
        .collect()
}

/// Render a template into a runnable argv: the first token is resolved to a
/// full executable path via the given [`ToolResolver`], the rest are
/// substituted.
///
/// # Errors
///
/// Returns [`cadenza_core::Error::Tool`] when the executable cannot be
/// located, or [`cadenza_core::Error::Internal`] for an empty template.
pub fn build_command(
    template: &str,
    vars: &TemplateVars,
    tools: &ToolResolver,
) -> Result<Vec<String>> {
    let mut argv = render(template, vars);
    let Some(exe) = argv.first_mut() else {
        return Err(cadenza_core::Error::Internal(
            "empty command template".into(),
        ));
    };
    *exe = tools.require(exe)?.display().to_string();
    Ok(argv)
}
