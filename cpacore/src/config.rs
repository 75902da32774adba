//! Analysis options.
//!
//! Options are plain data, usually read from TOML:
//!
//! ```
//! use cpacore::config::AnalysisConfig;
//!
//! let config = AnalysisConfig::from_toml_str(
//!     r#"
//!     block_size = 4
//!     sat_check_block_size = 1
//!     max_refinements = 10
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.block_size, 4);
//! assert!(config.semantic_entailment);
//! ```
use serde::{Deserialize, Serialize};
use strum::EnumIs;

use crate::utils::error::{CpaError, CpaResult};

/// Waitlist discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumIs)]
#[serde(rename_all = "kebab-case")]
pub enum Traversal {
    #[default]
    DepthFirst,
    /// Not supported: covering relies on depth-first discovery order.
    BreadthFirst,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Number of edges after which an abstraction is forced; `0` disables the
    /// threshold.
    pub block_size: usize,
    /// Block size after which interior steps check the satisfiability of the
    /// current block; `0` disables the check.
    pub sat_check_block_size: usize,
    /// When set, function entries and return sites are not abstraction points.
    pub inline_functions: bool,
    /// When set, loop heads are abstraction points only once the threshold is
    /// reached.
    pub unroll_loops: bool,
    pub traversal: Traversal,
    /// Retry failed BDD entailment checks with the prover.
    pub semantic_entailment: bool,
    /// Memoize path formulas inside blocks. Ignored when inlining functions or
    /// unrolling loops.
    pub cache_path_formulas: bool,
    pub max_refinements: Option<usize>,
    pub time_limit_ms: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            block_size: 0,
            sat_check_block_size: 0,
            inline_functions: false,
            unroll_loops: false,
            traversal: Traversal::DepthFirst,
            semantic_entailment: true,
            cache_path_formulas: true,
            max_refinements: Some(100),
            time_limit_ms: None,
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate a TOML document. Missing keys take their default.
    pub fn from_toml_str(source: &str) -> CpaResult<Self> {
        let config: Self = toml::from_str(source).map_err(|source| CpaError::ConfigParse { source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CpaResult<()> {
        if self.traversal.is_breadth_first() {
            return Err(CpaError::Config(
                "breadth-first traversal is not supported, the covering relation requires depth-first order"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the block formula cache can be used with these options.
    pub fn uses_formula_cache(&self) -> bool {
        self.cache_path_formulas && !(self.inline_functions || self.unroll_loops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(AnalysisConfig::from_toml_str("").unwrap(), AnalysisConfig::default());
    }

    #[test]
    fn breadth_first_is_rejected() {
        let error = AnalysisConfig::from_toml_str(r#"traversal = "breadth-first""#).unwrap_err();
        assert!(error.is_config());

        let config = AnalysisConfig::from_toml_str(r#"traversal = "depth-first""#).unwrap();
        assert!(config.traversal.is_depth_first());
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let error = AnalysisConfig::from_toml_str("block_sise = 3").unwrap_err();
        assert!(error.is_config_parse());
        assert!(AnalysisConfig::from_toml_str("block_size = -1").is_err());
    }

    #[test]
    fn cache_is_disabled_by_inlining_and_unrolling() {
        let mut config = AnalysisConfig::default();
        assert!(config.uses_formula_cache());
        config.unroll_loops = true;
        assert!(!config.uses_formula_cache());
        config.unroll_loops = false;
        config.inline_functions = true;
        assert!(!config.uses_formula_cache());
    }
}
