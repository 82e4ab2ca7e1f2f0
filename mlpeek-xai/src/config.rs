//! Configuration for explanation shaping.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Every field has a default, so an empty file (or no file at all) yields a working config.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, XaiError};

/// Top-level configuration for mlpeek-xai.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XaiConfig {
    /// Global importance ranking configuration.
    #[serde(default)]
    pub ranking: RankingConfig,
    /// Per-row waterfall configuration.
    #[serde(default)]
    pub waterfall: WaterfallConfig,
    /// Batch pipeline configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Global importance ranking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Number of features named in the textual summary.
    #[serde(default = "default_summary_top_k")]
    pub summary_top_k: usize,
    /// Number of bars in the importance chart.
    #[serde(default = "default_chart_top_k")]
    pub chart_top_k: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            summary_top_k: default_summary_top_k(),
            chart_top_k: default_chart_top_k(),
        }
    }
}

fn default_summary_top_k() -> usize {
    3
}

fn default_chart_top_k() -> usize {
    10
}

/// Waterfall construction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallConfig {
    /// Number of top contributors annotated for the row narrative.
    #[serde(default = "default_local_top_k")]
    pub local_top_k: usize,
    /// Fraction of the cumulative range added to each end of the axis domain.
    #[serde(default = "default_padding_ratio")]
    pub domain_padding_ratio: f64,
    /// Relative tolerance when reconciling the walk against the reported value.
    #[serde(default = "default_tolerance")]
    pub reconciliation_tolerance: f64,
}

impl Default for WaterfallConfig {
    fn default() -> Self {
        Self {
            local_top_k: default_local_top_k(),
            domain_padding_ratio: default_padding_ratio(),
            reconciliation_tolerance: default_tolerance(),
        }
    }
}

fn default_local_top_k() -> usize {
    3
}

fn default_padding_ratio() -> f64 {
    0.1
}

fn default_tolerance() -> f64 {
    1e-6
}

/// Batch pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Build per-row waterfalls on the rayon thread pool.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallel: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl XaiConfig {
    /// Reject values that would make the numeric output meaningless.
    pub fn validate(&self) -> Result<()> {
        let padding = self.waterfall.domain_padding_ratio;
        if !padding.is_finite() || padding < 0.0 {
            return Err(XaiError::config(format!(
                "waterfall.domain_padding_ratio must be a finite, non-negative number (got {padding})"
            )));
        }
        let tolerance = self.waterfall.reconciliation_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(XaiError::config(format!(
                "waterfall.reconciliation_tolerance must be a finite, non-negative number (got {tolerance})"
            )));
        }
        if self.ranking.chart_top_k == 0 {
            return Err(XaiError::config("ranking.chart_top_k must be at least 1"));
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `MLPEEK_`, `__` separates sections)
/// 3. The TOML file at `path`, when given and present
/// 4. Built-in defaults
///
/// Overrides are partial: only the keys present in the JSON object replace
/// lower layers, e.g. `json!({"ranking": {"chart_top_k": 5}})`.
pub fn load_config(
    path: Option<&Path>,
    overrides: Option<&serde_json::Value>,
) -> Result<XaiConfig> {
    let mut figment = Figment::from(Serialized::defaults(XaiConfig::default()));

    if let Some(path) = path {
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        }
    }

    // MLPEEK_WATERFALL__DOMAIN_PADDING_RATIO, MLPEEK_PIPELINE__PARALLEL, etc.
    figment = figment.merge(Env::prefixed("MLPEEK_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: XaiConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}
