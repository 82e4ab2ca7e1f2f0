//! Baseline (expected value) lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::RowId;

/// Baselines supplied by the attribution source.
///
/// Regressors report one expected value for the whole model; classifiers
/// report a probability per row and per class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineSpec {
    /// Regression expected value(s); only the first element is used.
    #[serde(default, alias = "expectedValues")]
    pub expected_values: Vec<f64>,
    /// Classification baselines keyed by row, then by class label.
    #[serde(default, alias = "perRow")]
    pub per_row: HashMap<RowId, HashMap<String, f64>>,
}

/// A regression baseline after substitution rules were applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBaseline {
    pub value: f64,
    /// `true` when the source supplied nothing usable and `0.0` was used.
    pub substituted: bool,
}

impl BaselineSpec {
    pub fn regression(expected_value: f64) -> Self {
        Self {
            expected_values: vec![expected_value],
            ..Self::default()
        }
    }

    pub fn with_class_baseline(
        mut self,
        row_index: RowId,
        class_name: impl Into<String>,
        value: f64,
    ) -> Self {
        self.per_row
            .entry(row_index)
            .or_default()
            .insert(class_name.into(), value);
        self
    }

    /// First expected value, or exactly `0.0` when absent or non-finite.
    pub fn resolve_regression(&self) -> ResolvedBaseline {
        match self.expected_values.first() {
            Some(v) if v.is_finite() => ResolvedBaseline {
                value: *v,
                substituted: false,
            },
            _ => ResolvedBaseline {
                value: 0.0,
                substituted: true,
            },
        }
    }

    /// Row-specific baseline probability for `class_name`. No default is applied.
    pub fn resolve_class(&self, row_index: RowId, class_name: &str) -> Option<f64> {
        self.per_row
            .get(&row_index)
            .and_then(|classes| classes.get(class_name))
            .copied()
            .filter(|v| v.is_finite())
    }
}
