//! Data model shared by the aggregator and the waterfall builder.
//!
//! Values coming from the attribution source are kept *raw* (`Option<f64>`):
//! the validation helper decides what is usable, so a stray string or `null`
//! in a payload never fails deserialization of the whole record.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Row identifier as reported by the attribution source.
pub type RowId = u64;

/// The two model families an explanation can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Regression,
    Classification,
}

impl ModelType {
    /// Lenient parse: case-insensitive, surrounding whitespace ignored.
    /// Anything unrecognised is treated as "no model type".
    pub fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regression" => Ok(Self::Regression),
            "classification" => Ok(Self::Classification),
            other => Err(format!("unknown model type '{other}'")),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::Regression => write!(f, "regression"),
            ModelType::Classification => write!(f, "classification"),
        }
    }
}

/// A row's prediction: a number for regressors, a class label for classifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Prediction {
    Numeric(f64),
    Label(String),
}

impl Prediction {
    /// Numeric value of the prediction, parsing numeric labels.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Prediction::Numeric(v) => Some(*v),
            Prediction::Label(s) => s.trim().parse().ok(),
        }
    }

    /// Canonical label used to match class records (`1.0`, `"1.0"` and `"1"` all give `"1"`).
    pub fn label(&self) -> String {
        match self {
            Prediction::Numeric(v) => v.to_string(),
            Prediction::Label(s) => canonical_label(s),
        }
    }
}

impl<'de> Deserialize<'de> for Prediction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Prediction::Numeric)
                .ok_or_else(|| de::Error::custom("prediction is not representable")),
            serde_json::Value::String(s) => Ok(Prediction::Label(s)),
            serde_json::Value::Bool(b) => Ok(Prediction::Label(b.to_string())),
            other => Err(de::Error::custom(format!(
                "prediction must be a number, string or bool, got {other}"
            ))),
        }
    }
}

/// Numeric-looking labels collapse to their `f64` display form so `"1.0"`,
/// `1` and `"1"` compare equal. Anything else is returned unchanged.
pub(crate) fn canonical_label(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v.to_string(),
        _ => raw.to_string(),
    }
}

/// A missing or unusable prediction becomes `None` so the row, not the
/// batch, fails.
fn deserialize_prediction<'de, D>(deserializer: D) -> Result<Option<Prediction>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(Prediction::deserialize(value).ok())
}

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<f64> for Prediction {
    fn from(value: f64) -> Self {
        Prediction::Numeric(value)
    }
}

impl From<&str> for Prediction {
    fn from(value: &str) -> Self {
        Prediction::Label(value.to_string())
    }
}

/// Convert a loosely-typed JSON value into a raw number.
///
/// Numbers pass through, numeric strings (including `"NaN"` and `"inf"`) are
/// parsed, everything else is `None`.
pub(crate) fn number_from_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn deserialize_raw_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(number_from_value(&value))
}

/// Class labels may arrive as strings or as numbers (`0`, `1`, ...).
pub(crate) fn deserialize_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(|v| v.to_string())
            .ok_or_else(|| de::Error::custom("class label is not representable")),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(de::Error::custom(format!(
            "class label must be a string or number, got {other}"
        ))),
    }
}

/// Ordered feature-name → raw value mapping.
///
/// Insertion order is preserved because it is the tie-break order for
/// rankings. Duplicate names are kept here and resolved by validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMap {
    entries: Vec<(String, Option<f64>)>,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.entries.push((name.into(), Some(value)));
    }

    /// Insert a value that may be absent or non-numeric.
    pub fn insert_raw(&mut self, name: impl Into<String>, value: Option<f64>) {
        self.entries.push((name.into(), value));
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v)))
                .collect(),
        }
    }
}

impl Serialize for FeatureMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FeatureMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FeatureMapVisitor;

        impl<'de> Visitor<'de> for FeatureMapVisitor {
            type Value = FeatureMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of feature names to numbers")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FeatureMap, A::Error> {
                let mut map = FeatureMap {
                    entries: Vec::with_capacity(access.size_hint().unwrap_or(0)),
                };
                while let Some((name, value)) =
                    access.next_entry::<String, serde_json::Value>()?
                {
                    map.insert_raw(name, number_from_value(&value));
                }
                Ok(map)
            }

            fn visit_unit<E: de::Error>(self) -> Result<FeatureMap, E> {
                Ok(FeatureMap::new())
            }
        }

        deserializer.deserialize_any(FeatureMapVisitor)
    }
}

/// Per-class attribution for one row of a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassContribution {
    #[serde(alias = "className", deserialize_with = "deserialize_label")]
    pub class_name: String,
    #[serde(default, deserialize_with = "deserialize_raw_number")]
    pub probability: Option<f64>,
    #[serde(default)]
    pub contributions: FeatureMap,
}

impl ClassContribution {
    pub fn new(class_name: impl Into<String>, probability: f64, contributions: FeatureMap) -> Self {
        Self {
            class_name: class_name.into(),
            probability: Some(probability),
            contributions,
        }
    }
}

/// One explained row as produced by the attribution source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRecord {
    #[serde(alias = "rowIndex")]
    pub row_index: RowId,
    #[serde(default, deserialize_with = "deserialize_prediction")]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub contributions: FeatureMap,
    #[serde(
        default,
        alias = "classContributions",
        deserialize_with = "deserialize_null_default"
    )]
    pub class_contributions: Vec<ClassContribution>,
}

impl AttributionRecord {
    pub fn regression(row_index: RowId, prediction: f64, contributions: FeatureMap) -> Self {
        Self {
            row_index,
            prediction: Some(Prediction::Numeric(prediction)),
            contributions,
            class_contributions: Vec::new(),
        }
    }

    pub fn classification(
        row_index: RowId,
        predicted: impl Into<String>,
        class_contributions: Vec<ClassContribution>,
    ) -> Self {
        Self {
            row_index,
            prediction: Some(Prediction::Label(predicted.into())),
            contributions: FeatureMap::new(),
            class_contributions,
        }
    }

    /// The class record matching the predicted label, if any.
    pub fn predicted_class(&self) -> Option<&ClassContribution> {
        let label = self.prediction.as_ref()?.label();
        self.class_contributions
            .iter()
            .find(|c| canonical_label(&c.class_name) == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_model_type_parse_is_lenient() {
        assert_eq!(ModelType::parse(" Regression "), Some(ModelType::Regression));
        assert_eq!(
            ModelType::parse("CLASSIFICATION"),
            Some(ModelType::Classification)
        );
        assert_eq!(ModelType::parse("clustering"), None);
        assert_eq!(ModelType::parse(""), None);
    }

    #[test]
    fn test_feature_map_preserves_order_and_raw_values() {
        let json = r#"{"zeta": 0.5, "alpha": "NaN", "mid": null, "text": "abc", "n": "-1.5"}"#;
        let map: FeatureMap = serde_json::from_str(json).unwrap();
        let names: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid", "text", "n"]);

        let values: Vec<Option<f64>> = map.iter().map(|(_, v)| v).collect();
        assert_eq!(values[0], Some(0.5));
        assert!(values[1].unwrap().is_nan());
        assert_eq!(values[2], None);
        assert_eq!(values[3], None);
        assert_eq!(values[4], Some(-1.5));
    }

    #[test]
    fn test_numeric_labels_match_string_classes() {
        let json = r#"{
            "rowIndex": 3,
            "prediction": 1,
            "classContributions": [
                {"className": 0, "probability": 0.2, "contributions": {"a": 0.1}},
                {"className": "1", "probability": 0.8, "contributions": {"a": -0.1}}
            ]
        }"#;
        let record: AttributionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.row_index, 3);
        assert_eq!(record.class_contributions[0].class_name, "0");
        let class = record.predicted_class().unwrap();
        assert_eq!(class.class_name, "1");
        assert_eq!(class.probability, Some(0.8));
    }

    #[test]
    fn test_prediction_as_number() {
        assert_eq!(Prediction::from(2.5).as_number(), Some(2.5));
        assert_eq!(Prediction::from(" 4 ").as_number(), Some(4.0));
        assert_eq!(Prediction::from("cat").as_number(), None);
    }

    #[test]
    fn test_numeric_looking_string_prediction_matches_numeric_class() {
        let record = AttributionRecord::classification(
            0,
            "1.0",
            vec![
                ClassContribution::new("0", 0.3, FeatureMap::new()),
                ClassContribution::new("1", 0.7, FeatureMap::new()),
            ],
        );
        assert_eq!(record.predicted_class().unwrap().probability, Some(0.7));

        let spaced = AttributionRecord::classification(
            0,
            "2",
            vec![ClassContribution::new(" 2.00 ", 1.0, FeatureMap::new())],
        );
        assert!(spaced.predicted_class().is_some());
        assert_eq!(Prediction::from("setosa").label(), "setosa");
    }

    #[test]
    fn test_bool_prediction_matches_bool_class() {
        let json = r#"{
            "row_index": 0,
            "prediction": true,
            "class_contributions": [
                {"class_name": false, "probability": 0.1, "contributions": {"a": -0.2}},
                {"class_name": true, "probability": 0.9, "contributions": {"a": 0.2}}
            ]
        }"#;
        let record: AttributionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.prediction, Some(Prediction::Label("true".into())));
        assert_eq!(record.predicted_class().unwrap().probability, Some(0.9));
    }

    #[test]
    fn test_null_or_missing_fields_do_not_fail_the_record() {
        let null_prediction: AttributionRecord =
            serde_json::from_str(r#"{"row_index": 1, "prediction": null}"#).unwrap();
        assert_eq!(null_prediction.prediction, None);
        assert!(null_prediction.predicted_class().is_none());

        let missing: AttributionRecord = serde_json::from_str(r#"{"row_index": 2}"#).unwrap();
        assert_eq!(missing.prediction, None);

        let odd: AttributionRecord =
            serde_json::from_str(r#"{"row_index": 3, "prediction": [1, 2]}"#).unwrap();
        assert_eq!(odd.prediction, None);

        let null_classes: AttributionRecord = serde_json::from_str(
            r#"{"row_index": 4, "prediction": "a", "class_contributions": null}"#,
        )
        .unwrap();
        assert!(null_classes.class_contributions.is_empty());
    }
}
