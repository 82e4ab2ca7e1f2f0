//! # mlpeek-xai — SHAP attribution shaping
//!
//! Turns feature attributions produced elsewhere into the ordered, numerically
//! consistent structures the mlpeek charts consume:
//!
//! - [`GlobalImportanceAggregator`] ranks features for the importance chart and
//!   the textual summary, merging per-class reports for classifiers.
//! - [`LocalWaterfallBuilder`] decomposes one prediction into
//!   baseline → feature steps → prediction, with running sums, axis domain and
//!   top contributors.
//! - [`ExplanationPipeline`] runs both over a whole payload and reports rows it
//!   had to skip instead of failing.
//!
//! Nothing here renders, reads files or talks to the network. Malformed input
//! degrades to empty results or per-row skips; it never panics.
//!
//! ```
//! use mlpeek_xai::{AttributionRecord, BaselineSpec, FeatureMap, LocalWaterfallBuilder, ModelType};
//!
//! let record = AttributionRecord::regression(
//!     0,
//!     12.0,
//!     FeatureMap::new().with("sqft", 3.0).with("age", -1.0),
//! );
//! let waterfall = LocalWaterfallBuilder::default()
//!     .build(Some(ModelType::Regression), &record, &BaselineSpec::regression(10.0))
//!     .unwrap();
//!
//! assert_eq!(waterfall.steps.first().unwrap().name, "Baseline");
//! assert_eq!(waterfall.steps.last().unwrap().name, "Prediction");
//! assert_eq!(waterfall.final_value, 12.0);
//! ```

// Foundation
pub mod config;
pub mod error;
pub mod logging;

// Data model
pub mod baseline;
pub mod model;
pub mod validate;

// Transformations
pub mod importance;
pub mod narrative;
pub mod pipeline;
pub mod waterfall;

// Re-exports
pub use baseline::{BaselineSpec, ResolvedBaseline};
pub use config::{XaiConfig, load_config};
pub use error::{Result, XaiError};
pub use importance::{
    ClassImportance, GlobalImportance, GlobalImportanceAggregator, GlobalImportanceEntry,
    ImportanceEntry, RawImportances,
};
pub use model::{AttributionRecord, ClassContribution, FeatureMap, ModelType, Prediction, RowId};
pub use pipeline::{ExplanationPipeline, ExplanationReport, ExplanationRequest, SkippedRow};
pub use validate::{DataState, is_valid, partition_valid};
pub use waterfall::{
    AxisDomain, Contributor, Direction, LocalWaterfallBuilder, ReconciliationStatus,
    WaterfallResult, WaterfallStep,
};
