//! Schema normalization: any recognized analyzer response shape in,
//! canonical `{category -> [parameter]}` out.
//!
//! The dialect is chosen from the payload's top-level keys in a fixed
//! priority order. Normalization never mutates the payload or the tree.

mod dialects;

use serde::Serialize;
use serde_json::Value;

use super::extractor::Payload;
use super::synonyms::SynonymTree;
use super::types::Category;

/// Recognized response shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Already canonical: `{"categories": [{"category", "parameters": [...]}]}`
    Categories,
    /// `{"medical_reports": [{"tests": {<test>: {"parameters": [...]}}}]}`
    MedicalReports,
    /// Same shape as `MedicalReports` under `"MedicalReports"`.
    MedicalReportsPascal,
    /// `{"reports": [{"category", "parameters": [...]}]}`
    Reports,
    /// `{"lab_results": {<category>: {<parameter>: {"value", "unit", "reference_range"}}}}`
    LabResults,
    /// `{"MedicalReport": {"TestResults": {<test>: {"Result", "Unit", "ReferenceRange"}}}}`
    MedicalReport,
    Unknown,
}

/// Detection order. The first key present in the payload decides the dialect.
const DETECTION_ORDER: [(&str, Dialect); 6] = [
    ("categories", Dialect::Categories),
    ("medical_reports", Dialect::MedicalReports),
    ("MedicalReports", Dialect::MedicalReportsPascal),
    ("reports", Dialect::Reports),
    ("lab_results", Dialect::LabResults),
    ("MedicalReport", Dialect::MedicalReport),
];

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Categories => "categories",
            Dialect::MedicalReports => "medical_reports",
            Dialect::MedicalReportsPascal => "MedicalReports",
            Dialect::Reports => "reports",
            Dialect::LabResults => "lab_results",
            Dialect::MedicalReport => "MedicalReport",
            Dialect::Unknown => "unknown",
        }
    }
}

/// Result of normalizing one chunk's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedChunk {
    pub dialect: Dialect,
    pub categories: Vec<Category>,
    /// Top-level keys of a payload no dialect matched, sorted.
    pub unrecognized_keys: Vec<String>,
}

impl NormalizedChunk {
    pub fn is_recognized(&self) -> bool {
        self.dialect != Dialect::Unknown
    }
}

pub fn detect_dialect(payload: &Payload) -> Dialect {
    DETECTION_ORDER
        .iter()
        .find(|(key, _)| payload.contains_key(*key))
        .map(|(_, dialect)| *dialect)
        .unwrap_or(Dialect::Unknown)
}

/// Normalize a payload into canonical categories.
///
/// Parameters whose names the tree does not list for their category are
/// dropped. An unrecognized shape yields no categories and reports its keys.
pub fn normalize(payload: &Payload, tree: &SynonymTree) -> NormalizedChunk {
    let dialect = detect_dialect(payload);
    let body = payload.get(dialect.as_str()).unwrap_or(&Value::Null);

    let categories = match dialect {
        Dialect::Categories => dialects::from_categories(body, tree),
        Dialect::MedicalReports | Dialect::MedicalReportsPascal => {
            dialects::from_medical_reports(body, tree)
        }
        Dialect::Reports => dialects::from_reports(body, tree),
        Dialect::LabResults => dialects::from_lab_results(body, tree),
        Dialect::MedicalReport => dialects::from_medical_report(body, tree),
        Dialect::Unknown => {
            let mut keys: Vec<String> = payload.keys().cloned().collect();
            keys.sort();
            tracing::warn!(keys = ?keys, "Unrecognized analyzer response schema");
            return NormalizedChunk {
                dialect,
                categories: Vec::new(),
                unrecognized_keys: keys,
            };
        }
    };

    tracing::debug!(
        dialect = dialect.as_str(),
        categories = categories.len(),
        "Payload normalized"
    );

    NormalizedChunk {
        dialect,
        categories,
        unrecognized_keys: Vec::new(),
    }
}
