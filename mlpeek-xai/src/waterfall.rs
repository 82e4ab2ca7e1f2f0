//! Per-row waterfall decomposition.
//!
//! A waterfall walks from the baseline to the final prediction, one feature
//! at a time, largest absolute contribution first:
//!
//! ```text
//! Baseline   [0 ──────── b]
//! feature_1       [b ── b+d1]
//! feature_2            [b+d1 ── b+d1+d2]
//! ...
//! Prediction [0 ──────────────────── final]
//! ```
//!
//! Everything the chart needs (step geometry, axis domain, top contributors)
//! is computed here so the presentation layer only paints.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::baseline::BaselineSpec;
use crate::config::WaterfallConfig;
use crate::error::{Result, XaiError};
use crate::model::{AttributionRecord, FeatureMap, ModelType, Prediction, RowId};
use crate::validate::{DataState, partition_valid};

pub const BASELINE_STEP: &str = "Baseline";
pub const PREDICTION_STEP: &str = "Prediction";

/// One bar of the waterfall. `base + delta` is the running total after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallStep {
    pub name: String,
    pub base: f64,
    pub delta: f64,
    pub is_special: bool,
}

impl WaterfallStep {
    fn special(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            base: 0.0,
            delta: value,
            is_special: true,
        }
    }

    fn feature(name: &str, base: f64, delta: f64) -> Self {
        Self {
            name: name.to_string(),
            base,
            delta,
            is_special: false,
        }
    }

    pub fn cumulative(&self) -> f64 {
        self.base + self.delta
    }
}

/// Which way a feature pushed the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increased,
    Decreased,
    Unchanged,
}

impl Direction {
    pub fn of(delta: f64) -> Self {
        if delta > 0.0 {
            Direction::Increased
        } else if delta < 0.0 {
            Direction::Decreased
        } else {
            Direction::Unchanged
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Increased => write!(f, "Increased"),
            Direction::Decreased => write!(f, "Decreased"),
            Direction::Unchanged => write!(f, "Unchanged"),
        }
    }
}

/// A top-ranked feature for the row narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub feature: String,
    pub delta: f64,
    pub direction: Direction,
}

/// Value-axis bounds for the chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisDomain {
    pub min: f64,
    pub max: f64,
}

impl AxisDomain {
    /// Pad `[low, high]` on both sides by `ratio` of its width.
    pub fn padded(low: f64, high: f64, ratio: f64) -> Self {
        let padding = (high - low) * ratio;
        Self {
            min: low - padding,
            max: high + padding,
        }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Zero-width domain: every cumulative value was identical.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0
    }

    /// Position of `value` within the domain in `[0, 1]`, or `None` when
    /// the domain has no width.
    pub fn normalize(&self, value: f64) -> Option<f64> {
        if self.is_degenerate() {
            return None;
        }
        Some(((value - self.min) / self.width()).clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Reconciled,
    Mismatch,
    /// The source did not report a usable value to compare against.
    Unverifiable,
}

/// Walk total versus the value reported by the attribution source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub expected: Option<f64>,
    pub actual: f64,
    pub status: ReconciliationStatus,
}

impl Reconciliation {
    /// Relative tolerance, floored at an absolute `tolerance` near zero.
    fn check(expected: Option<f64>, actual: f64, tolerance: f64) -> Self {
        let status = match expected.filter(|e| e.is_finite()) {
            None => ReconciliationStatus::Unverifiable,
            Some(e) if (actual - e).abs() <= tolerance * e.abs().max(1.0) => {
                ReconciliationStatus::Reconciled
            }
            Some(_) => ReconciliationStatus::Mismatch,
        };
        Self {
            expected,
            actual,
            status,
        }
    }

    pub fn difference(&self) -> Option<f64> {
        self.expected.map(|e| self.actual - e)
    }
}

/// Everything the presentation layer needs to draw one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallResult {
    pub row_index: RowId,
    pub model_type: ModelType,
    /// Predicted label (classification) or value (regression) as text.
    pub predicted: String,
    pub steps: Vec<WaterfallStep>,
    pub top_contributors: Vec<Contributor>,
    pub axis_domain: AxisDomain,
    pub baseline: f64,
    pub baseline_substituted: bool,
    pub final_value: f64,
    /// Contributions dropped as missing, non-finite or duplicate.
    pub excluded: usize,
    pub state: DataState,
    pub reconciliation: Reconciliation,
}

impl WaterfallResult {
    /// Feature steps only, without the two special bars.
    pub fn feature_steps(&self) -> &[WaterfallStep] {
        let n = self.steps.len();
        if n <= 2 {
            return &[];
        }
        &self.steps[1..n - 1]
    }
}

/// Builds waterfalls for single rows.
#[derive(Debug, Clone, Default)]
pub struct LocalWaterfallBuilder {
    config: WaterfallConfig,
}

/// Inputs for one waterfall once the model-family specifics are resolved.
struct RowInputs<'a> {
    contributions: &'a FeatureMap,
    baseline: f64,
    baseline_substituted: bool,
    expected_final: Option<f64>,
}

impl LocalWaterfallBuilder {
    pub fn new(config: WaterfallConfig) -> Self {
        Self { config }
    }

    /// Build the waterfall for one row.
    ///
    /// Fails (for this row only) when the model type or prediction is
    /// missing, when a classifier row has no record or no baseline for its
    /// predicted class, or when the running total overflows.
    pub fn build(
        &self,
        model_type: Option<ModelType>,
        record: &AttributionRecord,
        baselines: &BaselineSpec,
    ) -> Result<WaterfallResult> {
        let model_type = model_type.ok_or_else(|| {
            XaiError::missing_input(format!("row {}: model type is required", record.row_index))
        })?;
        let prediction = record.prediction.as_ref().ok_or_else(|| {
            XaiError::missing_input(format!("row {}: prediction is required", record.row_index))
        })?;

        let inputs = match model_type {
            ModelType::Regression => regression_inputs(record, prediction, baselines),
            ModelType::Classification => classification_inputs(record, prediction, baselines)?,
        };

        if inputs.baseline_substituted {
            tracing::warn!(
                row_index = record.row_index,
                "No usable baseline supplied, substituting 0"
            );
        }

        self.assemble(model_type, record, prediction, inputs)
    }

    fn assemble(
        &self,
        model_type: ModelType,
        record: &AttributionRecord,
        prediction: &Prediction,
        inputs: RowInputs<'_>,
    ) -> Result<WaterfallResult> {
        let validated = partition_valid(inputs.contributions.iter());
        let excluded = validated.excluded();
        let state = validated.state();
        if excluded > 0 {
            tracing::warn!(
                row_index = record.row_index,
                excluded,
                "Excluded invalid contributions"
            );
        }

        let ranked = rank_by_magnitude(validated.entries);
        let baseline = inputs.baseline;

        let (mut steps, final_value, low, high) = ranked.iter().fold(
            (
                vec![WaterfallStep::special(BASELINE_STEP, baseline)],
                baseline,
                baseline,
                baseline,
            ),
            |(mut steps, cumulative, low, high), (name, delta)| {
                let next = cumulative + delta;
                steps.push(WaterfallStep::feature(name, cumulative, *delta));
                (steps, next, low.min(next), high.max(next))
            },
        );
        steps.push(WaterfallStep::special(PREDICTION_STEP, final_value));

        let axis_domain = AxisDomain::padded(low, high, self.config.domain_padding_ratio);
        if !axis_domain.width().is_finite() {
            return Err(XaiError::invalid_input(format!(
                "row {}: cumulative contributions overflow",
                record.row_index
            )));
        }

        let top_contributors = ranked
            .iter()
            .take(self.config.local_top_k)
            .map(|(name, delta)| Contributor {
                feature: name.to_string(),
                delta: *delta,
                direction: Direction::of(*delta),
            })
            .collect();

        let reconciliation = Reconciliation::check(
            inputs.expected_final,
            final_value,
            self.config.reconciliation_tolerance,
        );
        if reconciliation.status == ReconciliationStatus::Mismatch {
            tracing::warn!(
                row_index = record.row_index,
                expected = ?reconciliation.expected,
                actual = final_value,
                "Waterfall total does not match the reported value"
            );
        }

        tracing::debug!(
            row_index = record.row_index,
            features = ranked.len(),
            final_value,
            "Built waterfall"
        );

        Ok(WaterfallResult {
            row_index: record.row_index,
            model_type,
            predicted: prediction.label(),
            steps,
            top_contributors,
            axis_domain,
            baseline,
            baseline_substituted: inputs.baseline_substituted,
            final_value,
            excluded,
            state,
            reconciliation,
        })
    }
}

fn regression_inputs<'a>(
    record: &'a AttributionRecord,
    prediction: &Prediction,
    baselines: &BaselineSpec,
) -> RowInputs<'a> {
    let resolved = baselines.resolve_regression();
    RowInputs {
        contributions: &record.contributions,
        baseline: resolved.value,
        baseline_substituted: resolved.substituted,
        expected_final: prediction.as_number(),
    }
}

fn classification_inputs<'a>(
    record: &'a AttributionRecord,
    prediction: &Prediction,
    baselines: &BaselineSpec,
) -> Result<RowInputs<'a>> {
    let class = record
        .predicted_class()
        .ok_or_else(|| XaiError::NoMatchingClass {
            row_index: record.row_index,
            label: prediction.label(),
        })?;

    let baseline = baselines
        .resolve_class(record.row_index, &class.class_name)
        .ok_or_else(|| XaiError::MissingBaseline {
            row_index: record.row_index,
            label: class.class_name.clone(),
        })?;

    Ok(RowInputs {
        contributions: &class.contributions,
        baseline,
        baseline_substituted: false,
        expected_final: class.probability,
    })
}

/// Stable sort by descending magnitude; ties keep input order.
fn rank_by_magnitude(mut entries: Vec<(&str, f64)>) -> Vec<(&str, f64)> {
    entries.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(Ordering::Equal));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassContribution;
    use pretty_assertions::assert_eq;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn step_names(result: &WaterfallResult) -> Vec<&str> {
        result.steps.iter().map(|s| s.name.as_str()).collect()
    }

    fn regression_row() -> AttributionRecord {
        let contributions = FeatureMap::new()
            .with("sqft", 3.0)
            .with("age", -1.0)
            .with("rooms", 2.0);
        AttributionRecord::regression(0, 14.0, contributions)
    }

    #[test]
    fn test_regression_walk() {
        let result = LocalWaterfallBuilder::default()
            .build(
                Some(ModelType::Regression),
                &regression_row(),
                &BaselineSpec::regression(10.0),
            )
            .unwrap();

        assert_eq!(
            step_names(&result),
            vec!["Baseline", "sqft", "rooms", "age", "Prediction"]
        );

        let baseline = &result.steps[0];
        assert!(baseline.is_special);
        assert_eq!((baseline.base, baseline.delta), (0.0, 10.0));

        // each step starts where the previous one ended
        assert_eq!((result.steps[1].base, result.steps[1].delta), (10.0, 3.0));
        assert_eq!((result.steps[2].base, result.steps[2].delta), (13.0, 2.0));
        assert_eq!((result.steps[3].base, result.steps[3].delta), (15.0, -1.0));

        let prediction = result.steps.last().unwrap();
        assert!(prediction.is_special);
        assert_eq!((prediction.base, prediction.delta), (0.0, 14.0));
        assert_eq!(result.final_value, 14.0);
        assert_eq!(result.reconciliation.status, ReconciliationStatus::Reconciled);
        assert_eq!(result.state, DataState::Ready);
    }

    #[test]
    fn test_axis_domain_padding() {
        // cumulative values: 2 (baseline), 10, 6
        let contributions = FeatureMap::new().with("up", 8.0).with("down", -4.0);
        let record = AttributionRecord::regression(1, 6.0, contributions);
        let result = LocalWaterfallBuilder::default()
            .build(Some(ModelType::Regression), &record, &BaselineSpec::regression(2.0))
            .unwrap();

        assert!(approx(result.axis_domain.min, 1.2));
        assert!(approx(result.axis_domain.max, 10.8));
        assert!(!result.axis_domain.is_degenerate());
        assert_eq!(result.axis_domain.normalize(result.axis_domain.min), Some(0.0));
    }

    #[test]
    fn test_zero_range_domain_is_degenerate() {
        let record = AttributionRecord::regression(2, 5.0, FeatureMap::new().with("flat", 0.0));
        let result = LocalWaterfallBuilder::default()
            .build(Some(ModelType::Regression), &record, &BaselineSpec::regression(5.0))
            .unwrap();

        assert_eq!(result.axis_domain, AxisDomain { min: 5.0, max: 5.0 });
        assert!(result.axis_domain.is_degenerate());
        assert_eq!(result.axis_domain.normalize(5.0), None);
        assert_eq!(result.top_contributors[0].direction, Direction::Unchanged);
    }

    #[test]
    fn test_all_nan_degenerates_to_special_steps() {
        let mut contributions = FeatureMap::new();
        contributions.insert("a", f64::NAN);
        contributions.insert("b", f64::INFINITY);
        contributions.insert_raw("c", None);
        let record = AttributionRecord::regression(3, 1.0, contributions);

        let result = LocalWaterfallBuilder::default()
            .build(Some(ModelType::Regression), &record, &BaselineSpec::regression(1.0))
            .unwrap();

        assert_eq!(step_names(&result), vec!["Baseline", "Prediction"]);
        assert_eq!(result.excluded, 3);
        assert_eq!(result.state, DataState::NoValidData);
        assert!(result.top_contributors.is_empty());
        assert!(result.feature_steps().is_empty());
    }

    #[test]
    fn test_missing_regression_baseline_substitutes_zero() {
        let record = AttributionRecord::regression(4, 1.5, FeatureMap::new().with("x", 1.5));
        let result = LocalWaterfallBuilder::default()
            .build(Some(ModelType::Regression), &record, &BaselineSpec::default())
            .unwrap();

        assert_eq!(result.baseline, 0.0);
        assert!(result.baseline_substituted);
        assert_eq!(result.final_value, 1.5);
    }

    #[test]
    fn test_top_contributors_directions() {
        let result = LocalWaterfallBuilder::default()
            .build(
                Some(ModelType::Regression),
                &regression_row(),
                &BaselineSpec::regression(10.0),
            )
            .unwrap();

        let summary: Vec<(&str, Direction)> = result
            .top_contributors
            .iter()
            .map(|c| (c.feature.as_str(), c.direction))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("sqft", Direction::Increased),
                ("rooms", Direction::Increased),
                ("age", Direction::Decreased),
            ]
        );
    }

    #[test]
    fn test_magnitude_ties_keep_key_order() {
        let contributions = FeatureMap::new()
            .with("first", -0.5)
            .with("second", 0.5)
            .with("big", 1.0);
        let record = AttributionRecord::regression(5, 1.0, contributions);
        let result = LocalWaterfallBuilder::default()
            .build(Some(ModelType::Regression), &record, &BaselineSpec::regression(0.0))
            .unwrap();
        assert_eq!(
            step_names(&result),
            vec!["Baseline", "big", "first", "second", "Prediction"]
        );
    }

    #[test]
    fn test_classification_uses_predicted_class() {
        let record = AttributionRecord::classification(
            7,
            "yes",
            vec![
                ClassContribution::new("no", 0.3, FeatureMap::new().with("a", -0.2)),
                ClassContribution::new(
                    "yes",
                    0.7,
                    FeatureMap::new().with("a", 0.2).with("b", -0.1),
                ),
            ],
        );
        let baselines = BaselineSpec::default().with_class_baseline(7, "yes", 0.6);

        let result = LocalWaterfallBuilder::default()
            .build(Some(ModelType::Classification), &record, &baselines)
            .unwrap();

        assert_eq!(step_names(&result), vec!["Baseline", "a", "b", "Prediction"]);
        assert_eq!(result.baseline, 0.6);
        assert!(approx(result.final_value, 0.7));
        assert_eq!(result.reconciliation.status, ReconciliationStatus::Reconciled);
        assert_eq!(result.predicted, "yes");
    }

    #[test]
    fn test_classification_errors() {
        let builder = LocalWaterfallBuilder::default();
        let record = AttributionRecord::classification(
            8,
            "maybe",
            vec![ClassContribution::new("yes", 0.9, FeatureMap::new().with("a", 0.1))],
        );
        let err = builder
            .build(Some(ModelType::Classification), &record, &BaselineSpec::default())
            .unwrap_err();
        assert!(matches!(err, XaiError::NoMatchingClass { row_index: 8, .. }));

        let record = AttributionRecord::classification(
            9,
            "yes",
            vec![ClassContribution::new("yes", 0.9, FeatureMap::new().with("a", 0.1))],
        );
        let err = builder
            .build(Some(ModelType::Classification), &record, &BaselineSpec::default())
            .unwrap_err();
        assert!(matches!(err, XaiError::MissingBaseline { row_index: 9, .. }));

        let err = builder
            .build(None, &record, &BaselineSpec::default())
            .unwrap_err();
        assert_eq!(err.kind(), "missing_input");
    }

    #[test]
    fn test_mismatch_is_reported_not_fatal() {
        let record = AttributionRecord::regression(10, 100.0, FeatureMap::new().with("x", 1.0));
        let result = LocalWaterfallBuilder::default()
            .build(Some(ModelType::Regression), &record, &BaselineSpec::regression(0.0))
            .unwrap();
        assert_eq!(result.reconciliation.status, ReconciliationStatus::Mismatch);
        assert_eq!(result.reconciliation.difference(), Some(-99.0));
    }

    #[test]
    fn test_missing_prediction_fails_the_row() {
        let mut record = regression_row();
        record.prediction = None;
        let err = LocalWaterfallBuilder::default()
            .build(Some(ModelType::Regression), &record, &BaselineSpec::regression(10.0))
            .unwrap_err();
        assert_eq!(err.kind(), "missing_input");
        assert!(err.to_string().contains("prediction is required"));
    }

    #[test]
    fn test_overflowing_running_total_is_rejected() {
        let contributions = FeatureMap::new().with("a", 1e308).with("b", 1e308);
        let record = AttributionRecord::regression(11, 0.0, contributions);
        let err = LocalWaterfallBuilder::default()
            .build(Some(ModelType::Regression), &record, &BaselineSpec::regression(0.0))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert!(err.to_string().contains("row 11"));

        // finite ends whose span overflows
        let contributions = FeatureMap::new().with("up", 1.7e308);
        let record = AttributionRecord::regression(12, 0.7e308, contributions);
        let err = LocalWaterfallBuilder::default()
            .build(Some(ModelType::Regression), &record, &BaselineSpec::regression(-1e308))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }
}
