use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Marker written in place of a unit or reference range the report did not provide.
pub const ABSENT_MARKER: &str = "N/A";

/// One ingested report. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub subject_id: String,
    pub report_date: NaiveDate,
    pub text: String,
}

impl Document {
    pub fn new(subject_id: &str, report_date: NaiveDate, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.to_string(),
            report_date,
            text: text.into(),
        }
    }

    /// Build a document from raw OCR output, cleaning page furniture first.
    pub fn from_ocr_text(subject_id: &str, report_date: NaiveDate, raw: &str) -> Self {
        Self::new(subject_id, report_date, super::preprocess::clean_ocr_text(raw))
    }
}

/// A bounded window of a document's text.
///
/// `previous` and `next` borrow the neighbouring windows so the analyzer can
/// see surrounding context; they are not part of this chunk's span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub index: usize,
    pub text: &'a str,
    pub previous: Option<&'a str>,
    pub next: Option<&'a str>,
}

impl Chunk<'_> {
    pub fn has_neighbors(&self) -> bool {
        self.previous.is_some() || self.next.is_some()
    }
}

/// Unparsed analyzer output for one chunk.
#[derive(Debug, Clone)]
pub struct RawAnalysisResult {
    pub chunk_index: usize,
    pub text: String,
}

/// A unit or reference range: either reported, or explicitly absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FieldValue {
    Present(String),
    #[default]
    Absent,
}

impl FieldValue {
    /// Empty strings and the absent marker itself both read as absent.
    pub fn from_text(text: Option<String>) -> Self {
        match text {
            Some(t) if !t.trim().is_empty() && !t.trim().eq_ignore_ascii_case(ABSENT_MARKER) => {
                FieldValue::Present(t.trim().to_string())
            }
            _ => FieldValue::Absent,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldValue::Present(s) => s,
            FieldValue::Absent => ABSENT_MARKER,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        Ok(FieldValue::from_text(text))
    }
}

/// A single measured value within a category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub unit: FieldValue,
    #[serde(default)]
    pub reference_range: FieldValue,
}

/// A named group of parameters, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "category")]
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parameters: Vec::new(),
        }
    }
}

/// Normalized per-document output, also used as the export format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalOutput {
    pub categories: Vec<Category>,
}

impl CanonicalOutput {
    pub fn parameter_count(&self) -> usize {
        self.categories.iter().map(|c| c.parameters.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
