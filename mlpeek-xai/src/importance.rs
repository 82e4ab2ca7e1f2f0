//! Global feature importance: one ranked list per model.
//!
//! Regressors report one importance per feature and only need ranking.
//! Classifiers report one list per class; those are merged by taking, for
//! each feature, the mean over the classes that actually reported it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::RankingConfig;
use crate::model::{ModelType, deserialize_label, deserialize_raw_number};
use crate::validate::{DataState, partition_valid};

/// Raw `(feature, importance)` pair from the attribution source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceEntry {
    pub feature: String,
    #[serde(default, deserialize_with = "deserialize_raw_number")]
    pub importance: Option<f64>,
}

impl ImportanceEntry {
    pub fn new(feature: impl Into<String>, importance: f64) -> Self {
        Self {
            feature: feature.into(),
            importance: Some(importance),
        }
    }
}

/// Importances reported for one class of a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassImportance {
    #[serde(alias = "className", deserialize_with = "deserialize_label")]
    pub class_name: String,
    #[serde(default)]
    pub importances: Vec<ImportanceEntry>,
}

/// Global importance input, shaped by model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawImportances {
    Flat(Vec<ImportanceEntry>),
    PerClass(Vec<ClassImportance>),
}

impl RawImportances {
    pub fn is_empty(&self) -> bool {
        match self {
            RawImportances::Flat(entries) => entries.is_empty(),
            RawImportances::PerClass(classes) => classes.is_empty(),
        }
    }
}

/// One ranked feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalImportanceEntry {
    pub feature: String,
    pub importance: f64,
}

/// The ranked importance list plus what validation dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalImportance {
    pub entries: Vec<GlobalImportanceEntry>,
    pub excluded: usize,
    pub state: DataState,
}

impl GlobalImportance {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            excluded: 0,
            state: DataState::NoValidData,
        }
    }

    /// Prefix of the ranking; never re-sorts.
    pub fn top_k(&self, k: usize) -> &[GlobalImportanceEntry] {
        &self.entries[..k.min(self.entries.len())]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reduces raw importances to a single ranked list.
#[derive(Debug, Clone, Default)]
pub struct GlobalImportanceAggregator {
    config: RankingConfig,
}

impl GlobalImportanceAggregator {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Rank `raw` for the given model family.
    ///
    /// Missing model type, empty input or an input shape that does not
    /// match the model family all yield an empty ranking.
    pub fn aggregate(
        &self,
        model_type: Option<ModelType>,
        raw: &RawImportances,
    ) -> GlobalImportance {
        let Some(model_type) = model_type else {
            tracing::debug!("No model type given, global importance left empty");
            return GlobalImportance::empty();
        };

        let ranked = match (model_type, raw) {
            (ModelType::Regression, RawImportances::Flat(entries)) => rank_flat(entries),
            (ModelType::Classification, RawImportances::PerClass(classes)) => {
                rank_per_class(classes)
            }
            // An empty list deserializes as `Flat` regardless of model family.
            (_, raw) if raw.is_empty() => GlobalImportance::empty(),
            (model_type, _) => {
                tracing::warn!(
                    model_type = %model_type,
                    "Importance input shape does not match model type, ignoring it"
                );
                GlobalImportance::empty()
            }
        };

        if ranked.excluded > 0 {
            tracing::warn!(
                excluded = ranked.excluded,
                "Dropped invalid or duplicate importance entries"
            );
        }
        tracing::debug!(
            model_type = %model_type,
            features = ranked.entries.len(),
            "Aggregated global importance"
        );
        ranked
    }

    /// Features named in the textual summary.
    pub fn summary_top<'a>(&self, ranked: &'a GlobalImportance) -> &'a [GlobalImportanceEntry] {
        ranked.top_k(self.config.summary_top_k)
    }

    /// Features shown in the importance chart.
    pub fn chart_top<'a>(&self, ranked: &'a GlobalImportance) -> &'a [GlobalImportanceEntry] {
        ranked.top_k(self.config.chart_top_k)
    }
}

fn rank_flat(entries: &[ImportanceEntry]) -> GlobalImportance {
    let validated = partition_valid(entries.iter().map(|e| (e.feature.as_str(), e.importance)));
    let state = validated.state();
    let excluded = validated.excluded();

    let mut ranked: Vec<GlobalImportanceEntry> = validated
        .entries
        .into_iter()
        .map(|(feature, importance)| GlobalImportanceEntry {
            feature: feature.to_string(),
            importance,
        })
        .collect();
    sort_descending(&mut ranked);

    GlobalImportance {
        entries: ranked,
        excluded,
        state,
    }
}

fn rank_per_class(classes: &[ClassImportance]) -> GlobalImportance {
    // (feature, running sum, reporting classes), in first-encountered order
    let mut totals: Vec<(&str, f64, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut excluded = 0;

    for class in classes {
        let validated = partition_valid(
            class
                .importances
                .iter()
                .map(|e| (e.feature.as_str(), e.importance)),
        );
        excluded += validated.excluded();

        for (feature, importance) in validated.entries {
            match index.get(feature) {
                Some(&slot) => {
                    totals[slot].1 += importance;
                    totals[slot].2 += 1;
                }
                None => {
                    index.insert(feature, totals.len());
                    totals.push((feature, importance, 1));
                }
            }
        }
    }

    let mut ranked: Vec<GlobalImportanceEntry> = totals
        .into_iter()
        .map(|(feature, sum, count)| GlobalImportanceEntry {
            feature: feature.to_string(),
            importance: sum / count as f64,
        })
        .collect();
    sort_descending(&mut ranked);

    let state = if ranked.is_empty() {
        DataState::NoValidData
    } else {
        DataState::Ready
    };
    GlobalImportance {
        entries: ranked,
        excluded,
        state,
    }
}

/// Stable: equal importances keep their input order.
fn sort_descending(entries: &mut [GlobalImportanceEntry]) {
    entries.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(Ordering::Equal)
    });
}
