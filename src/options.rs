//! Compiler options (spec §6).
//!
//! Mirrors the teacher's `CompilerConfig`/`NeurlangConfig` split: a small,
//! `Default`-able, `serde`-serializable struct validated eagerly at
//! construction. Fields that can only be judged against bound inputs
//! (`index_type = int32` on oversized inputs) are *not* validated here —
//! they surface as a run-time [`crate::error::CoreError::IndexTypeOverflow`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid function_trace pattern {pattern:?}: {source}")]
    InvalidTracePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("maxrregcount must be nonzero when set")]
    ZeroRegisterCount,
}

/// How the kernel's tensor-index arithmetic should be sized (spec §4.4, §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexTypeOption {
    Auto,
    Int32,
    Int64,
}

impl Default for IndexTypeOption {
    fn default() -> Self {
        IndexTypeOption::Auto
    }
}

/// Compiler options (spec §6 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    pub index_type: IndexTypeOption,
    pub maxrregcount: Option<u32>,
    pub warn_register_spill: bool,
    pub fill_allocation_with_nan: bool,
    pub disable_kernel_reuse: bool,
    #[serde(default)]
    pub function_trace: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            index_type: IndexTypeOption::Auto,
            maxrregcount: None,
            warn_register_spill: false,
            fill_allocation_with_nan: false,
            disable_kernel_reuse: false,
            function_trace: Vec::new(),
        }
    }
}

impl Options {
    /// Validate and compile `function_trace` patterns, rejecting malformed
    /// regexes and a zero register bound eagerly rather than deep inside a
    /// lowering pass.
    pub fn validate(&self) -> Result<CompiledOptions, OptionsError> {
        if self.maxrregcount == Some(0) {
            return Err(OptionsError::ZeroRegisterCount);
        }
        let mut patterns = Vec::with_capacity(self.function_trace.len());
        for pattern in &self.function_trace {
            let re = Regex::new(pattern).map_err(|source| OptionsError::InvalidTracePattern {
                pattern: pattern.clone(),
                source,
            })?;
            patterns.push(re);
        }
        Ok(CompiledOptions {
            options: self.clone(),
            trace_patterns: patterns,
        })
    }
}

/// [`Options`] after eager validation, with `function_trace` compiled to
/// [`Regex`]. Threaded through the lowering pipeline so each pass can check
/// `should_trace(pass_name)` without re-parsing a pattern list.
#[derive(Debug, Clone)]
pub struct CompiledOptions {
    pub options: Options,
    trace_patterns: Vec<Regex>,
}

impl CompiledOptions {
    pub fn should_trace(&self, entry_point: &str) -> bool {
        self.trace_patterns.iter().any(|re| re.is_match(entry_point))
    }
}

impl std::ops::Deref for CompiledOptions {
    type Target = Options;
    fn deref(&self) -> &Options {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        let opts = Options::default();
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn zero_register_count_rejected() {
        let mut opts = Options::default();
        opts.maxrregcount = Some(0);
        assert!(matches!(
            opts.validate(),
            Err(OptionsError::ZeroRegisterCount)
        ));
    }

    #[test]
    fn bad_trace_pattern_rejected() {
        let mut opts = Options::default();
        opts.function_trace.push("(unterminated".to_string());
        assert!(opts.validate().is_err());
    }

    #[test]
    fn trace_pattern_matches_entry_point() {
        let mut opts = Options::default();
        opts.function_trace.push("^allocation.*".to_string());
        let compiled = opts.validate().unwrap();
        assert!(compiled.should_trace("allocation_placement"));
        assert!(!compiled.should_trace("sync_insertion"));
    }
}
