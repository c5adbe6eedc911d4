pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are an expert in medical report analysis. \
Extract only values explicitly present in the text. Never interpret, diagnose or advise.";

/// Instruction heading every chunk prompt.
pub const ANALYSIS_INSTRUCTIONS: &str = "Analyze the following medical report text chunk and extract all \
categories and parameters with their values, units, and reference ranges. \
Respond **strictly** in JSON format:\n\
{\"categories\": [{\"category\": \"<name>\", \"parameters\": [{\"name\": \"<name>\", \"value\": \"<value>\", \
\"unit\": \"<unit or N/A>\", \"reference_range\": \"<range or N/A>\"}]}]}\n\
Use the previous and next chunks only as context; extract values from the current chunk.\n\n";

/// Build the user prompt for one chunk with its optional neighbours.
pub fn build_analysis_prompt(current: &str, previous: Option<&str>, next: Option<&str>) -> String {
    let mut prompt = String::with_capacity(
        ANALYSIS_INSTRUCTIONS.len()
            + current.len()
            + previous.map_or(0, str::len)
            + next.map_or(0, str::len)
            + 64,
    );
    prompt.push_str(ANALYSIS_INSTRUCTIONS);
    if let Some(previous) = previous {
        prompt.push_str(&format!("Previous Chunk:\n{previous}\n\n"));
    }
    prompt.push_str(&format!("Current Chunk:\n{current}\n\n"));
    if let Some(next) = next {
        prompt.push_str(&format!("Next Chunk:\n{next}\n"));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_all_sections_in_order() {
        let prompt = build_analysis_prompt("Hb 13.5", Some("CBC"), Some("RBC 4.5"));
        let prev = prompt.find("Previous Chunk:\nCBC").unwrap();
        let cur = prompt.find("Current Chunk:\nHb 13.5").unwrap();
        let next = prompt.find("Next Chunk:\nRBC 4.5").unwrap();
        assert!(prompt.starts_with(ANALYSIS_INSTRUCTIONS));
        assert!(prev < cur && cur < next);
    }

    #[test]
    fn prompt_omits_missing_neighbors() {
        let prompt = build_analysis_prompt("TSH 2.1", None, None);
        assert!(!prompt.contains("Previous Chunk:"));
        assert!(!prompt.contains("Next Chunk:"));
        assert!(prompt.contains("Current Chunk:\nTSH 2.1"));
    }

    #[test]
    fn instructions_request_json_only() {
        assert!(ANALYSIS_INSTRUCTIONS.contains("strictly"));
        assert!(ANALYSIS_INSTRUCTIONS.contains("\"categories\""));
    }
}
