//! Shared validity filter applied before any ranking or charting.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Whether there is anything to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataState {
    Ready,
    /// Nothing survived validation; the presentation layer shows an empty state.
    NoValidData,
}

/// Entries that passed validation, plus what was dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated<'a> {
    pub entries: Vec<(&'a str, f64)>,
    /// Missing, non-numeric or non-finite values.
    pub invalid: usize,
    /// Repeated feature names after the first occurrence.
    pub duplicates: usize,
}

impl Validated<'_> {
    pub fn excluded(&self) -> usize {
        self.invalid + self.duplicates
    }

    pub fn state(&self) -> DataState {
        if self.entries.is_empty() {
            DataState::NoValidData
        } else {
            DataState::Ready
        }
    }
}

/// A value is usable iff it is present and finite.
pub fn is_valid(value: Option<f64>) -> bool {
    value.is_some_and(f64::is_finite)
}

/// Keep valid entries in their original order.
///
/// The first occurrence of a name decides its fate: later repeats are
/// counted as duplicates even when the first one was invalid.
pub fn partition_valid<'a, I>(entries: I) -> Validated<'a>
where
    I: IntoIterator<Item = (&'a str, Option<f64>)>,
{
    let mut seen = HashSet::new();
    let mut validated = Validated {
        entries: Vec::new(),
        invalid: 0,
        duplicates: 0,
    };

    for (name, value) in entries {
        if !seen.insert(name) {
            validated.duplicates += 1;
            continue;
        }
        match value {
            Some(v) if v.is_finite() => validated.entries.push((name, v)),
            _ => validated.invalid += 1,
        }
    }

    validated
}
