//! One adapter per response dialect. Each walks its shape defensively:
//! wrong types anywhere yield nothing rather than an error.

use serde_json::{Map, Value};

use crate::pipeline::synonyms::{Scope, SynonymTree};
use crate::pipeline::types::{Category, FieldValue, Parameter};

// Key aliases seen across dialects, in lookup order.
const NAME_KEYS: [&str; 4] = ["name", "parameter", "Name", "Parameter"];
const VALUE_KEYS: [&str; 4] = ["value", "result", "Value", "Result"];
const UNIT_KEYS: [&str; 3] = ["unit", "Unit", "units"];
const RANGE_KEYS: [&str; 5] = [
    "reference_range",
    "referenceRange",
    "ReferenceRange",
    "Reference Range",
    "reference",
];
const CATEGORY_KEYS: [&str; 3] = ["category", "name", "Category"];

// ═══════════════════════════════════════════
// Adapters
// ═══════════════════════════════════════════

/// `[{"category": .., "parameters": [{"name", "value", "unit", "reference_range"}]}]`
pub(super) fn from_categories(body: &Value, tree: &SynonymTree) -> Vec<Category> {
    grouped_lists(body, tree)
}

/// `[{"tests": {<category>: {"parameters": [{"parameter", "result", ..}]}}}]`
pub(super) fn from_medical_reports(body: &Value, tree: &SynonymTree) -> Vec<Category> {
    let mut out = Vec::new();
    for report in array_items(body) {
        let Some(tests) = report.get("tests").and_then(Value::as_object) else {
            continue;
        };
        for (category, test) in tests {
            let mut collector = CategoryCollector::new(tree, category);
            for param in array_items(test.get("parameters").unwrap_or(&Value::Null)) {
                collector.offer_object(param);
            }
            out.extend(collector.finish());
        }
    }
    out
}

/// `[{"category": .., "parameters": [{"name", "result", ..}]}]`
pub(super) fn from_reports(body: &Value, tree: &SynonymTree) -> Vec<Category> {
    grouped_lists(body, tree)
}

/// `{<category>: {<parameter>: {"value", "unit", "reference_range"} | <scalar>}}`
pub(super) fn from_lab_results(body: &Value, tree: &SynonymTree) -> Vec<Category> {
    let Some(categories) = body.as_object() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (category, params) in categories {
        let Some(params) = params.as_object() else {
            continue;
        };
        let mut collector = CategoryCollector::new(tree, category);
        for (name, data) in params {
            match data {
                Value::Object(fields) => collector.offer(
                    name,
                    scalar_text(lookup(fields, &VALUE_KEYS)),
                    field_value(fields, &UNIT_KEYS),
                    field_value(fields, &RANGE_KEYS),
                ),
                scalar => collector.offer(
                    name,
                    scalar_text(Some(scalar)),
                    FieldValue::Absent,
                    FieldValue::Absent,
                ),
            }
        }
        out.extend(collector.finish());
    }
    out
}

/// `{"TestResults": {<test>: {"Result", "Unit", "ReferenceRange"}}}`
///
/// Each known test becomes its own category named after the test's canonical
/// name; tests the tree does not know anywhere are dropped.
pub(super) fn from_medical_report(body: &Value, tree: &SynonymTree) -> Vec<Category> {
    let Some(results) = body.get("TestResults").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (test, data) in results {
        if !tree.knows(test) {
            tracing::debug!(test = %test, "Dropping test not in synonym tree");
            continue;
        }
        let Some(fields) = data.as_object() else {
            continue;
        };
        let Some(value) = scalar_text(lookup(fields, &VALUE_KEYS)) else {
            continue;
        };
        let canonical = tree.resolve(test);
        let mut category = Category::new(&canonical);
        category.parameters.push(Parameter {
            name: canonical,
            value,
            unit: field_value(fields, &UNIT_KEYS),
            reference_range: field_value(fields, &RANGE_KEYS),
        });
        out.push(category);
    }
    out
}

/// Shared shape of the `categories` and `reports` dialects.
fn grouped_lists(body: &Value, tree: &SynonymTree) -> Vec<Category> {
    let mut out = Vec::new();
    for group in array_items(body) {
        let Some(group) = group.as_object() else {
            continue;
        };
        let Some(category) = scalar_text(lookup(group, &CATEGORY_KEYS)) else {
            continue;
        };
        let mut collector = CategoryCollector::new(tree, &category);
        for param in array_items(group.get("parameters").unwrap_or(&Value::Null)) {
            collector.offer_object(param);
        }
        out.extend(collector.finish());
    }
    out
}

// ═══════════════════════════════════════════
// Vocabulary filter
// ═══════════════════════════════════════════

/// Builds one canonical category, admitting only parameters its scope lists.
struct CategoryCollector<'t> {
    scope: Option<Scope<'t>>,
    category: Category,
    dropped: usize,
}

impl<'t> CategoryCollector<'t> {
    fn new(tree: &'t SynonymTree, raw_name: &str) -> Self {
        let scope = tree.scope(raw_name);
        let name = match scope {
            Some(scope) => scope.canonical().to_string(),
            None => tree.resolve(raw_name.trim()),
        };
        Self {
            scope,
            category: Category::new(&name),
            dropped: 0,
        }
    }

    fn offer_object(&mut self, param: &Value) {
        let Some(fields) = param.as_object() else {
            self.dropped += 1;
            return;
        };
        let Some(name) = scalar_text(lookup(fields, &NAME_KEYS)) else {
            self.dropped += 1;
            return;
        };
        self.offer(
            &name,
            scalar_text(lookup(fields, &VALUE_KEYS)),
            field_value(fields, &UNIT_KEYS),
            field_value(fields, &RANGE_KEYS),
        );
    }

    fn offer(
        &mut self,
        raw_name: &str,
        value: Option<String>,
        unit: FieldValue,
        reference_range: FieldValue,
    ) {
        let (Some(scope), Some(value)) = (self.scope, value) else {
            self.dropped += 1;
            return;
        };
        if !scope.contains(raw_name) {
            self.dropped += 1;
            return;
        }
        self.category.parameters.push(Parameter {
            name: scope.resolve(raw_name.trim()),
            value,
            unit,
            reference_range,
        });
    }

    fn finish(self) -> Option<Category> {
        if self.dropped > 0 {
            tracing::debug!(
                category = %self.category.name,
                dropped = self.dropped,
                kept = self.category.parameters.len(),
                "Parameters outside category vocabulary dropped"
            );
        }
        if self.category.parameters.is_empty() {
            None
        } else {
            Some(self.category)
        }
    }
}

// ═══════════════════════════════════════════
// Value helpers
// ═══════════════════════════════════════════

fn array_items(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// First non-null value under any of `keys`.
fn lookup<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .find(|value| !value.is_null())
}

/// Text of a scalar. Numbers and booleans are rendered, blanks read as missing.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field_value(fields: &Map<String, Value>, keys: &[&str]) -> FieldValue {
    FieldValue::from_text(scalar_text(lookup(fields, keys)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> SynonymTree {
        SynonymTree::from_json_str(
            r#"{"Complete Blood Count": {"Hemoglobin": ["Hb"], "WBC": ["Total Leucocyte Count", "TLC"]}}"#,
        )
        .unwrap()
    }

    #[test]
    fn scalar_text_renders_numbers_and_rejects_blanks() {
        assert_eq!(scalar_text(Some(&json!(7.5))), Some("7.5".into()));
        assert_eq!(scalar_text(Some(&json!("  "))), None);
        assert_eq!(scalar_text(Some(&json!([1]))), None);
        assert_eq!(scalar_text(None), None);
    }

    #[test]
    fn lookup_skips_null_aliases() {
        let fields = json!({"value": null, "result": "12"});
        let fields = fields.as_object().unwrap();
        assert_eq!(lookup(fields, &VALUE_KEYS), Some(&json!("12")));
    }

    #[test]
    fn collector_canonicalizes_category_and_parameters() {
        let tree = tree();
        let mut collector = CategoryCollector::new(&tree, " complete blood count ");
        collector.offer("tlc", Some("7400".into()), FieldValue::Absent, FieldValue::Absent);
        collector.offer("Neutrophils", Some("60".into()), FieldValue::Absent, FieldValue::Absent);
        let category = collector.finish().unwrap();
        assert_eq!(category.name, "Complete Blood Count");
        assert_eq!(category.parameters.len(), 1);
        assert_eq!(category.parameters[0].name, "WBC");
    }

    #[test]
    fn collector_without_scope_keeps_nothing() {
        let tree = tree();
        let mut collector = CategoryCollector::new(&tree, "Kidney Function");
        collector.offer("Hb", Some("13".into()), FieldValue::Absent, FieldValue::Absent);
        assert!(collector.finish().is_none());
    }

    #[test]
    fn non_object_parameters_are_ignored() {
        let body = json!([{"category": "Complete Blood Count", "parameters": ["Hb 13", {"name": "Hb", "value": "13"}]}]);
        let categories = from_reports(&body, &tree());
        assert_eq!(categories[0].parameters.len(), 1);
    }

    #[test]
    fn groups_without_category_name_are_skipped() {
        let body = json!([{"parameters": [{"name": "Hb", "value": "13"}]}]);
        assert!(from_categories(&body, &tree()).is_empty());
    }

    #[test]
    fn medical_report_without_test_results_is_empty() {
        assert!(from_medical_report(&json!({"Patient": "x"}), &tree()).is_empty());
    }
}
