//! Analyzer adapters: send one chunk (with neighbour context) to a language
//! model service and return its raw text reply.

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod prompt;

pub use mock::MockAnalyzer;
pub use ollama::OllamaAnalyzer;
pub use openai::OpenAiAnalyzer;
pub use prompt::*;

use std::sync::Arc;

use thiserror::Error;

use super::types::Chunk;
use crate::pipeline_config::{AnalyzerProvider, PipelineConfig};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("Analyzer service is not reachable at {0}")]
    Connection(String),

    #[error("Analyzer service returned error (status {status}): {body}")]
    Service { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("No API key configured (set OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("Analyzer task failed: {0}")]
    TaskFailed(String),
}

/// Everything the analyzer sees for one chunk. Owned so it can cross into
/// blocking worker threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub chunk_index: usize,
    pub current: String,
    pub previous: Option<String>,
    pub next: Option<String>,
}

impl AnalysisRequest {
    pub fn from_chunk(chunk: &Chunk<'_>) -> Self {
        Self {
            chunk_index: chunk.index,
            current: chunk.text.to_string(),
            previous: chunk.previous.map(str::to_string),
            next: chunk.next.map(str::to_string),
        }
    }

    /// The user prompt sent for this chunk.
    pub fn prompt(&self) -> String {
        build_analysis_prompt(&self.current, self.previous.as_deref(), self.next.as_deref())
    }
}

/// A service that turns a chunk into free-form (ideally JSON) text.
pub trait AnalyzerClient: Send + Sync {
    fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError>;

    /// Short label for logs.
    fn name(&self) -> &str;
}

/// Build the analyzer the configuration asks for.
pub fn analyzer_from_config(config: &PipelineConfig) -> Result<Arc<dyn AnalyzerClient>, AnalyzerError> {
    let analyzer: Arc<dyn AnalyzerClient> = match config.provider {
        AnalyzerProvider::OpenAi => {
            let api_key = config.api_key.clone().ok_or(AnalyzerError::MissingApiKey)?;
            Arc::new(OpenAiAnalyzer::new(
                config.base_url(),
                &api_key,
                config.model_name(),
                config.timeout_secs,
            )?)
        }
        AnalyzerProvider::Ollama => Arc::new(OllamaAnalyzer::new(
            config.base_url(),
            config.model_name(),
            config.timeout_secs,
        )?),
    };
    tracing::info!(
        analyzer = analyzer.name(),
        model = config.model_name(),
        "Analyzer configured"
    );
    Ok(analyzer)
}

/// Map a transport error the same way for every HTTP-backed analyzer.
pub(crate) fn map_transport_error(e: reqwest::Error, base_url: &str, timeout_secs: u64) -> AnalyzerError {
    if e.is_connect() {
        AnalyzerError::Connection(base_url.to_string())
    } else if e.is_timeout() {
        AnalyzerError::HttpClient(format!("Request timed out after {timeout_secs}s"))
    } else {
        AnalyzerError::HttpClient(e.to_string())
    }
}

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, AnalyzerError> {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AnalyzerError::HttpClient(e.to_string()))
}
