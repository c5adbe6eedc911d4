use serde::{Deserialize, Serialize};

use super::{
    build_http_client, map_transport_error, AnalysisRequest, AnalyzerClient, AnalyzerError,
    ANALYSIS_SYSTEM_PROMPT,
};

/// Client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiAnalyzer {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OpenAiAnalyzer {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout_secs: u64) -> Result<Self, AnalyzerError> {
        if api_key.trim().is_empty() {
            return Err(AnalyzerError::MissingApiKey);
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: build_http_client(timeout_secs)?,
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Request body for /chat/completions
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from /chat/completions
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

fn first_reply(response: ChatResponse) -> Result<String, AnalyzerError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| AnalyzerError::ResponseParsing("Response has no message content".into()))
}

impl AnalyzerClient for OpenAiAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError> {
        let prompt = request.prompt();
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: ANALYSIS_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
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

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| AnalyzerError::ResponseParsing(e.to_string()))?;

        first_reply(parsed)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
