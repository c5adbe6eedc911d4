// Clean OCR output before it is chunked and sent to the analyzer.
// Removes page furniture (page counters, registered-office footers, banner lines),
// invisible Unicode, dash rules, and lines too short to carry a measurement.

use std::sync::LazyLock;

use regex::Regex;

/// Lines at or below this many characters (after trimming) are dropped.
const MIN_LINE_CHARS: usize = 10;

static PAGE_FURNITURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)Page \d+ of \d+|REGD\. OFFICE.*$|Corporate Identity.*$|^\*\*.*\*\*$")
        .expect("valid regex")
});

static HORIZONTAL_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

static DASH_RULE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").expect("valid regex"));

/// Clean raw OCR text for analysis.
pub fn clean_ocr_text(raw: &str) -> String {
    let visible = remove_invisible_chars(raw);
    let without_furniture = PAGE_FURNITURE_RE.replace_all(&visible, "");
    let collapsed = HORIZONTAL_RUN_RE.replace_all(&without_furniture, " ");
    let without_rules = DASH_RULE_RE.replace_all(&collapsed, "");

    let cleaned = without_rules
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > MIN_LINE_CHARS)
        .collect::<Vec<_>>()
        .join("\n");

    tracing::debug!(
        raw_chars = raw.len(),
        cleaned_chars = cleaned.len(),
        "OCR text cleaned"
    );
    cleaned
}

/// Remove zero-width and bidi formatting characters that OCR engines and
/// PDF text layers leave behind. Standard whitespace is kept.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t') {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_page_counters_and_footers() {
        let raw = "Complete Blood Count Page 1 of 3\nREGD. OFFICE: 12 Main Street, Springfield\nHemoglobin 13.5 g/dL 13.0-17.0\nCorporate Identity Number U85110\n";
        let cleaned = clean_ocr_text(raw);
        assert!(!cleaned.contains("Page 1 of 3"));
        assert!(!cleaned.contains("REGD. OFFICE"));
        assert!(!cleaned.contains("Corporate Identity"));
        assert!(cleaned.contains("Hemoglobin 13.5 g/dL 13.0-17.0"));
    }

    #[test]
    fn drops_banner_lines_and_short_lines() {
        let raw = "**LABORATORY REPORT**\nRBC\nRBC Count 4.5 mill/cumm\n";
        let cleaned = clean_ocr_text(raw);
        assert_eq!(cleaned, "RBC Count 4.5 mill/cumm");
    }

    #[test]
    fn collapses_runs_of_spaces_and_dash_rules() {
        let raw = "Platelet   Count\t\t250   10^3/uL\n----------------------\n";
        let cleaned = clean_ocr_text(raw);
        assert_eq!(cleaned, "Platelet Count 250 10^3/uL");
    }

    #[test]
    fn removes_invisible_characters() {
        let raw = "Hemo\u{200B}globin 13.5\u{FEFF} g/dL";
        assert_eq!(clean_ocr_text(raw), "Hemoglobin 13.5 g/dL");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(clean_ocr_text(""), "");
        assert_eq!(clean_ocr_text("Page 2 of 2\n\n"), "");
    }
}
