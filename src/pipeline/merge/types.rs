use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Observations for one report date: canonical parameter name to the distinct
/// value strings seen for it, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub date: NaiveDate,
    #[serde(default)]
    pub parameters: BTreeMap<String, Vec<String>>,
}

impl ReportRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            parameters: BTreeMap::new(),
        }
    }

    /// Add `value` under `name` unless that exact string is already recorded.
    /// Returns whether anything changed.
    pub fn insert_value(&mut self, name: &str, value: &str) -> bool {
        let values = self.parameters.entry(name.to_string()).or_default();
        if values.iter().any(|v| v == value) {
            return false;
        }
        values.push(value.to_string());
        true
    }

    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.parameters.get(name).map(Vec::as_slice)
    }
}

/// Full report history of one subject, ordered by report date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject_id: String,
    #[serde(default)]
    pub reports: Vec<ReportRecord>,
}

impl SubjectRecord {
    pub fn new(subject_id: &str) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            reports: Vec::new(),
        }
    }

    pub fn report(&self, date: NaiveDate) -> Option<&ReportRecord> {
        self.reports
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|i| &self.reports[i])
    }

    /// The record for `date`, inserted in date order if missing.
    pub fn report_mut(&mut self, date: NaiveDate) -> &mut ReportRecord {
        let index = match self.reports.binary_search_by_key(&date, |r| r.date) {
            Ok(i) => i,
            Err(i) => {
                self.reports.insert(i, ReportRecord::new(date));
                i
            }
        };
        &mut self.reports[index]
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.reports.iter().map(|r| r.date)
    }
}
