use serde::{Deserialize, Serialize};

use super::{
    build_http_client, map_transport_error, AnalysisRequest, AnalyzerClient, AnalyzerError,
    ANALYSIS_SYSTEM_PROMPT,
};

/// Ollama HTTP client for local inference.
pub struct OllamaAnalyzer {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaAnalyzer {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, AnalyzerError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: build_http_client(timeout_secs)?,
            timeout_secs,
        })
    }

    /// Default Ollama instance at localhost:11434 with 5-minute timeout.
    pub fn default_local(model: &str) -> Result<Self, AnalyzerError> {
        Self::new("http://localhost:11434", model, 300)
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl AnalyzerClient for OllamaAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError> {
        let url = format!("{}/api/generate", self.base_url);
        let prompt = request.prompt();
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &prompt,
            system: ANALYSIS_SYSTEM_PROMPT,
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| map_transport_error(e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalyzerError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| AnalyzerError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
