use std::collections::HashMap;
use std::sync::Mutex;

use super::{AnalysisRequest, AnalyzerClient, AnalyzerError};

/// Scripted analyzer for tests: a default reply plus per-chunk replies or
/// failures. Every request is recorded.
pub struct MockAnalyzer {
    default_response: String,
    responses: HashMap<usize, String>,
    failures: HashMap<usize, String>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl MockAnalyzer {
    pub fn new(default_response: &str) -> Self {
        Self {
            default_response: default_response.to_string(),
            responses: HashMap::new(),
            failures: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, chunk_index: usize, response: &str) -> Self {
        self.responses.insert(chunk_index, response.to_string());
        self
    }

    pub fn with_failure(mut self, chunk_index: usize, message: &str) -> Self {
        self.failures.insert(chunk_index, message.to_string());
        self
    }

    /// Requests seen so far, sorted by chunk index.
    pub fn requests(&self) -> Vec<AnalysisRequest> {
        let mut seen = self
            .requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        seen.sort_by_key(|r| r.chunk_index);
        seen
    }
}

impl AnalyzerClient for MockAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        if let Some(message) = self.failures.get(&request.chunk_index) {
            return Err(AnalyzerError::Connection(message.clone()));
        }
        Ok(self
            .responses
            .get(&request.chunk_index)
            .unwrap_or(&self.default_response)
            .clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
