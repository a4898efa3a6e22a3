//! Run configuration consumed by the engine core.
//!
//! Argument parsing and multi-source merging (environment, config files,
//! defaults) belong to the embedding application; the engine only consumes
//! this validated record.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{discovery::SelectionCriteria, error::ScrivError};

pub const DEFAULT_MAX_CONCURRENT: usize = 10;
pub const DEFAULT_HOOK_TIMEOUT_MS: u64 = 5_000;

/// Configuration values the engine core consumes for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    /// Input files to process.
    pub input: Vec<PathBuf>,
    /// Output directory. When unset, printed files are reported as warnings
    /// instead of written.
    pub output: Option<PathBuf>,
    /// Source language selecting the parser.
    pub language: Option<String>,
    /// Output format selecting the printer.
    pub format: Option<String>,
    /// Explicit parser manifest overriding language-based selection.
    pub parser: Option<PathBuf>,
    /// Explicit printer manifest overriding format-based selection.
    pub printer: Option<PathBuf>,
    /// User hooks file.
    pub hooks: Option<PathBuf>,
    /// Maximum in-flight pipelines.
    pub max_concurrent: usize,
    /// Per-hook-invocation timeout in milliseconds.
    pub hook_timeout_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            input: Vec::new(),
            output: None,
            language: None,
            format: None,
            parser: None,
            printer: None,
            hooks: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            hook_timeout_ms: DEFAULT_HOOK_TIMEOUT_MS,
        }
    }
}

impl RunConfig {
    /// Check that the configuration can select one action per kind.
    pub fn validate(&self) -> Result<(), ScrivError> {
        if self.language.is_none() && self.parser.is_none() {
            return Err(ScrivError::Config(
                "either `language` or an explicit `parser` file must be configured".to_string(),
            ));
        }

        if self.format.is_none() && self.printer.is_none() {
            return Err(ScrivError::Config(
                "either `format` or an explicit `printer` file must be configured".to_string(),
            ));
        }

        if self.max_concurrent == 0 {
            return Err(ScrivError::Config(
                "`maxConcurrent` must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn criteria(&self) -> SelectionCriteria {
        SelectionCriteria {
            language: self.language.clone(),
            format: self.format.clone(),
            parser_file: self.parser.clone(),
            printer_file: self.printer.clone(),
        }
    }
}
