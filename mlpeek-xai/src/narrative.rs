//! Plain-language summaries built from the ranked structures.

use serde::{Deserialize, Serialize};

use crate::importance::GlobalImportanceEntry;
use crate::model::ModelType;
use crate::validate::DataState;
use crate::waterfall::{Direction, WaterfallResult};

/// Text for one explained row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowNarrative {
    pub headline: String,
    pub lines: Vec<String>,
}

/// "The most influential features for predicting X are a, b and c."
///
/// `None` when there is nothing ranked.
pub fn global_summary(target: &str, top: &[GlobalImportanceEntry]) -> Option<String> {
    let names: Vec<&str> = top.iter().map(|e| e.feature.as_str()).collect();
    let subject = if target.trim().is_empty() {
        "the target".to_string()
    } else {
        target.trim().to_string()
    };

    match names.as_slice() {
        [] => None,
        [only] => Some(format!(
            "The most influential feature for predicting {subject} is {only}."
        )),
        [init @ .., last] => Some(format!(
            "The most influential features for predicting {subject} are {} and {last}.",
            init.join(", ")
        )),
    }
}

/// Headline plus one line per top contributor.
pub fn row_narrative(result: &WaterfallResult) -> RowNarrative {
    let quantity = match result.model_type {
        ModelType::Regression => "the prediction",
        ModelType::Classification => "the predicted probability",
    };

    let headline = match result.model_type {
        ModelType::Regression => format!(
            "Row {}: starting from a baseline of {:.3}, the model predicted {:.3}.",
            result.row_index, result.baseline, result.final_value
        ),
        ModelType::Classification => format!(
            "Row {}: predicted class '{}' with probability {:.3} (baseline {:.3}).",
            result.row_index, result.predicted, result.final_value, result.baseline
        ),
    };

    let lines = if result.state == DataState::NoValidData {
        vec!["No valid feature contributions were available for this row.".to_string()]
    } else {
        result
            .top_contributors
            .iter()
            .map(|c| match c.direction {
                Direction::Unchanged => format!("{} did not change {quantity}.", c.feature),
                direction => format!(
                    "{} {} {quantity} by {:.3}.",
                    c.feature,
                    direction.to_string().to_lowercase(),
                    c.delta.abs()
                ),
            })
            .collect()
    };

    RowNarrative { headline, lines }
}
