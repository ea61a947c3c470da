//! cadenza-av: external transcoder plumbing.
//!
//! Provides the three low-level pieces the streaming engine is built on:
//! executable resolution ([`tools::ToolResolver`]), command-template
//! rendering ([`template`]), and the process chain runner ([`chain`]) that
//! wires step1 | step2 | step3 together and owns cleanup of every process
//! and scratch file on all exit paths.

pub mod chain;
pub mod template;
pub mod tools;

pub use chain::{ChainHandle, ChainStream, ProcessChain};
pub use template::{build_command, render, tokenize, TemplateVars};
pub use tools::{ToolInfo, ToolResolver};
