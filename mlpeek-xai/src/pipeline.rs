//! Batch driver: one attribution payload in, one display-ready report out.
//!
//! Rows are independent, so waterfalls are built on the rayon pool. A row
//! that cannot be explained is reported in `skipped` and never aborts the
//! rest of the batch.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::baseline::BaselineSpec;
use crate::config::XaiConfig;
use crate::error::{Result, XaiError};
use crate::importance::{
    GlobalImportance, GlobalImportanceAggregator, GlobalImportanceEntry, RawImportances,
};
use crate::model::{AttributionRecord, ModelType, RowId};
use crate::narrative::{RowNarrative, global_summary, row_narrative};
use crate::waterfall::{LocalWaterfallBuilder, WaterfallResult};

/// Everything the attribution source hands over for one explanation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplanationRequest {
    #[serde(default, alias = "modelType")]
    pub model_type: Option<String>,
    #[serde(default)]
    pub target: String,
    #[serde(default, alias = "globalImportances")]
    pub global_importances: Option<RawImportances>,
    #[serde(default, alias = "rows")]
    pub records: Vec<AttributionRecord>,
    #[serde(default)]
    pub baseline: BaselineSpec,
}

impl ExplanationRequest {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parsed model type; unknown strings count as missing.
    pub fn model_type(&self) -> Option<ModelType> {
        self.model_type.as_deref().and_then(ModelType::parse)
    }
}

/// One successfully explained row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowExplanation {
    pub waterfall: WaterfallResult,
    pub narrative: RowNarrative,
}

/// A row that could not be explained, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub row_index: RowId,
    pub kind: String,
    pub reason: String,
}

impl SkippedRow {
    fn from_error(row_index: RowId, err: &XaiError) -> Self {
        Self {
            row_index,
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Display-ready output for a whole payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationReport {
    pub model_type: Option<ModelType>,
    pub target: String,
    pub global: GlobalImportance,
    pub summary_features: Vec<GlobalImportanceEntry>,
    pub chart_features: Vec<GlobalImportanceEntry>,
    pub global_summary: Option<String>,
    pub rows: Vec<RowExplanation>,
    pub skipped: Vec<SkippedRow>,
}

impl ExplanationReport {
    /// Contributions excluded across all explained rows.
    pub fn total_excluded(&self) -> usize {
        self.rows.iter().map(|r| r.waterfall.excluded).sum()
    }

    pub fn row(&self, row_index: RowId) -> Option<&RowExplanation> {
        self.rows
            .iter()
            .find(|r| r.waterfall.row_index == row_index)
    }
}

/// Runs the aggregator once and the waterfall builder per row.
#[derive(Debug, Clone)]
pub struct ExplanationPipeline {
    aggregator: GlobalImportanceAggregator,
    builder: LocalWaterfallBuilder,
    parallel: bool,
}

impl Default for ExplanationPipeline {
    fn default() -> Self {
        Self {
            aggregator: GlobalImportanceAggregator::default(),
            builder: LocalWaterfallBuilder::default(),
            parallel: true,
        }
    }
}

impl ExplanationPipeline {
    pub fn new(config: &XaiConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            aggregator: GlobalImportanceAggregator::new(config.ranking.clone()),
            builder: LocalWaterfallBuilder::new(config.waterfall.clone()),
            parallel: config.pipeline.parallel,
        })
    }

    pub fn explain(&self, request: &ExplanationRequest) -> ExplanationReport {
        let model_type = request.model_type();
        if model_type.is_none() {
            tracing::warn!(
                model_type = ?request.model_type,
                "Missing or unknown model type, nothing will be explained"
            );
        }

        let global = match &request.global_importances {
            Some(raw) => self.aggregator.aggregate(model_type, raw),
            None => GlobalImportance::empty(),
        };
        let summary_features = self.aggregator.summary_top(&global).to_vec();
        let chart_features = self.aggregator.chart_top(&global).to_vec();
        let global_summary = global_summary(&request.target, &summary_features);

        let outcomes: Vec<(RowId, Result<WaterfallResult>)> = if self.parallel {
            request
                .records
                .par_iter()
                .map(|record| self.explain_row(model_type, record, &request.baseline))
                .collect()
        } else {
            request
                .records
                .iter()
                .map(|record| self.explain_row(model_type, record, &request.baseline))
                .collect()
        };

        let mut rows = Vec::with_capacity(outcomes.len());
        let mut skipped = Vec::new();
        for (row_index, outcome) in outcomes {
            match outcome {
                Ok(waterfall) => {
                    let narrative = row_narrative(&waterfall);
                    rows.push(RowExplanation {
                        waterfall,
                        narrative,
                    });
                }
                Err(err) => {
                    tracing::warn!(row_index, error = %err, "Skipping row");
                    skipped.push(SkippedRow::from_error(row_index, &err));
                }
            }
        }

        tracing::info!(
            target_label = %request.target,
            features = global.entries.len(),
            rows = rows.len(),
            skipped = skipped.len(),
            "Explanation report ready"
        );

        ExplanationReport {
            model_type,
            target: request.target.clone(),
            global,
            summary_features,
            chart_features,
            global_summary,
            rows,
            skipped,
        }
    }

    fn explain_row(
        &self,
        model_type: Option<ModelType>,
        record: &AttributionRecord,
        baselines: &BaselineSpec,
    ) -> (RowId, Result<WaterfallResult>) {
        (
            record.row_index,
            self.builder.build(model_type, record, baselines),
        )
    }
}
