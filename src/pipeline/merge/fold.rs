//! Pure merge operations. Storage and locking live in the parent module.

use std::collections::BTreeMap;

use super::types::{ReportRecord, SubjectRecord};
use crate::pipeline::synonyms::SynonymTree;
use crate::pipeline::types::Category;

/// Union every parameter value of `categories` into `report`, keyed by the
/// parameter's canonical name. Returns how many new values were recorded.
pub fn merge_categories(report: &mut ReportRecord, categories: &[Category], tree: &SynonymTree) -> usize {
    let mut added = 0;
    for category in categories {
        for param in &category.parameters {
            let name = tree.resolve_in(&category.name, &param.name);
            if report.insert_value(&name, &param.value) {
                added += 1;
            }
        }
    }
    added
}

/// Merge a document's categories into the subject's record for `date`.
pub fn merge_into_subject(
    record: &mut SubjectRecord,
    date: chrono::NaiveDate,
    categories: &[Category],
    tree: &SynonymTree,
) -> usize {
    merge_categories(record.report_mut(date), categories, tree)
}

/// Fold one chunk's categories into a document's running output.
///
/// Categories with the same name are combined, keeping first-seen order.
/// A parameter entry identical to one already present is skipped.
pub fn fold_chunk(acc: &mut Vec<Category>, incoming: Vec<Category>) {
    for category in incoming {
        match acc.iter_mut().find(|c| c.name == category.name) {
            Some(existing) => {
                for param in category.parameters {
                    if !existing.parameters.contains(&param) {
                        existing.parameters.push(param);
                    }
                }
            }
            None => {
                let mut fresh = category;
                let mut seen = Vec::with_capacity(fresh.parameters.len());
                fresh.parameters.retain(|p| {
                    if seen.contains(p) {
                        false
                    } else {
                        seen.push(p.clone());
                        true
                    }
                });
                acc.push(fresh);
            }
        }
    }
}

/// Every parameter the subject has ever reported, with all distinct values
/// across dates (oldest report first).
pub fn consolidated_parameters(record: &SubjectRecord) -> BTreeMap<String, Vec<String>> {
    let mut view: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for report in &record.reports {
        for (name, values) in &report.parameters {
            let merged = view.entry(name.clone()).or_default();
            for value in values {
                if !merged.contains(value) {
                    merged.push(value.clone());
                }
            }
        }
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{FieldValue, Parameter};
    use chrono::NaiveDate;

    fn tree() -> SynonymTree {
        SynonymTree::from_json_str(
            r#"{
                "Complete Blood Count": {"Hemoglobin": ["Hb", "HGB"], "RBC": ["Red Blood Cells"]},
                "Lipid Profile": {"Total Cholesterol": ["Cholesterol"]}
            }"#,
        )
        .unwrap()
    }

    fn param(name: &str, value: &str) -> Parameter {
        Parameter {
            name: name.into(),
            value: value.into(),
            unit: FieldValue::Absent,
            reference_range: FieldValue::Absent,
        }
    }

    fn category(name: &str, params: &[(&str, &str)]) -> Category {
        Category {
            name: name.into(),
            parameters: params.iter().map(|(n, v)| param(n, v)).collect(),
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn merge_resolves_names_and_dedups_values() {
        let mut report = ReportRecord::new(date(1));
        let cats = vec![category(
            "Complete Blood Count",
            &[("Hb", "13.5"), ("Hemoglobin", "13.5"), ("HGB", "14.0")],
        )];
        assert_eq!(merge_categories(&mut report, &cats, &tree()), 2);
        assert_eq!(report.values("Hemoglobin").unwrap(), ["13.5", "14.0"]);
        assert_eq!(report.parameters.len(), 1);
    }

    #[test]
    fn leaf_category_variants_merge_under_one_name() {
        let tree = SynonymTree::from_json_str(r#"{"Hemoglobin": ["Hb", "HGB"]}"#).unwrap();
        let mut report = ReportRecord::new(date(1));
        let cats = vec![category("Hemoglobin", &[("Hb", "13.5"), ("HGB", "13.5"), ("hb", "12.8")])];
        assert_eq!(merge_categories(&mut report, &cats, &tree), 2);
        assert_eq!(report.parameters.len(), 1);
        assert_eq!(report.values("Hemoglobin").unwrap(), ["13.5", "12.8"]);
    }

    #[test]
    fn merging_twice_equals_merging_once() {
        let tree = tree();
        let cats = vec![
            category("Complete Blood Count", &[("Hb", "13.5"), ("RBC", "4.6")]),
            category("Lipid Profile", &[("Cholesterol", "190")]),
        ];
        let mut once = ReportRecord::new(date(1));
        merge_categories(&mut once, &cats, &tree);
        let mut twice = once.clone();
        assert_eq!(merge_categories(&mut twice, &cats, &tree), 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn chunkwise_merge_equals_combined_merge() {
        let tree = tree();
        let first = vec![category("Complete Blood Count", &[("Hb", "13.5")])];
        let second = vec![category("Complete Blood Count", &[("Red Blood Cells", "4.6"), ("HGB", "13.5")])];

        let mut chunkwise = ReportRecord::new(date(1));
        merge_categories(&mut chunkwise, &first, &tree);
        merge_categories(&mut chunkwise, &second, &tree);

        let mut combined_input = first.clone();
        combined_input.extend(second.clone());
        let mut combined = ReportRecord::new(date(1));
        merge_categories(&mut combined, &combined_input, &tree);

        assert_eq!(chunkwise, combined);
    }

    #[test]
    fn different_dates_create_separate_reports() {
        let tree = tree();
        let mut record = SubjectRecord::new("u1");
        merge_into_subject(&mut record, date(10), &[category("Lipid Profile", &[("Cholesterol", "190")])], &tree);
        merge_into_subject(&mut record, date(3), &[category("Lipid Profile", &[("Cholesterol", "210")])], &tree);
        assert_eq!(record.reports.len(), 2);
        assert_eq!(record.reports[0].date, date(3));
        assert_eq!(record.report(date(10)).unwrap().values("Total Cholesterol").unwrap(), ["190"]);
    }

    #[test]
    fn fold_chunk_combines_categories_and_skips_identical_entries() {
        let mut acc = Vec::new();
        fold_chunk(&mut acc, vec![category("Complete Blood Count", &[("Hemoglobin", "13.5"), ("Hemoglobin", "13.5")])]);
        fold_chunk(
            &mut acc,
            vec![
                category("Lipid Profile", &[("Total Cholesterol", "190")]),
                category("Complete Blood Count", &[("Hemoglobin", "13.5"), ("RBC", "4.6")]),
            ],
        );
        assert_eq!(acc.len(), 2);
        assert_eq!(acc[0].name, "Complete Blood Count");
        let names: Vec<_> = acc[0].parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Hemoglobin", "RBC"]);
    }

    #[test]
    fn fold_chunk_keeps_same_name_with_different_values() {
        let mut acc = vec![category("Complete Blood Count", &[("Hemoglobin", "13.5")])];
        fold_chunk(&mut acc, vec![category("Complete Blood Count", &[("Hemoglobin", "12.1")])]);
        assert_eq!(acc[0].parameters.len(), 2);
    }

    #[test]
    fn consolidated_view_unions_across_dates() {
        let tree = tree();
        let mut record = SubjectRecord::new("u1");
        merge_into_subject(&mut record, date(1), &[category("Complete Blood Count", &[("Hb", "13.5")])], &tree);
        merge_into_subject(
            &mut record,
            date(2),
            &[category("Complete Blood Count", &[("Hb", "12.9"), ("Hb", "13.5"), ("RBC", "4.4")])],
            &tree,
        );
        let view = consolidated_parameters(&record);
        assert_eq!(view["Hemoglobin"], ["13.5", "12.9"]);
        assert_eq!(view["RBC"], ["4.4"]);
    }
}
