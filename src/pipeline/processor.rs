//! Document processing orchestrator.
//!
//! Drives one document through the pipeline:
//! chunk → analyze (concurrent) → extract → normalize → fold → (merge).
//!
//! Analyzer calls run on blocking worker threads, bounded by a semaphore.
//! Results are folded in chunk order no matter when they complete. A chunk
//! that fails contributes nothing; its siblings carry on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use super::analyzer::{AnalysisRequest, AnalyzerClient, AnalyzerError};
use super::chunker::WindowChunker;
use super::diagnostic;
use super::extractor::{extract_payload, MalformedResponse};
use super::merge::{fold_chunk, MergeStore, StoreError, SubjectRecord};
use super::normalize::normalize;
use super::synonyms::{SynonymError, SynonymTree};
use super::types::{CanonicalOutput, Category, Document, RawAnalysisResult};
use crate::pipeline_config::{ConfigError, PipelineConfig};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that stop a document (or the whole run).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Document {0} has no text to analyze")]
    EmptyDocument(Uuid),

    #[error("Synonym tree failed to load: {0}")]
    SynonymTreeLoad(#[from] SynonymError),

    #[error("Merge failed: {0}")]
    Store(#[from] StoreError),

    #[error("Analyzer setup failed: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

/// Why one chunk contributed nothing. Recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),

    #[error(transparent)]
    Malformed(#[from] MalformedResponse),

    #[error("Unrecognized response schema (keys: {keys:?})")]
    UnrecognizedSchema { keys: Vec<String> },
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub error: ChunkError,
}

/// A processed document: possibly partial canonical output plus the chunks
/// that contributed nothing.
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub document_id: Uuid,
    pub subject_id: String,
    pub report_date: NaiveDate,
    pub output: CanonicalOutput,
    pub chunk_count: usize,
    /// Chunks that failed or yielded no categories.
    pub empty_chunks: usize,
    pub failures: Vec<ChunkFailure>,
}

impl DocumentOutcome {
    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary {
            document_id: self.document_id,
            subject_id: self.subject_id.clone(),
            report_date: self.report_date,
            chunk_count: self.chunk_count,
            empty_chunks: self.empty_chunks,
            failed_chunks: self.failures.iter().map(|f| f.chunk_index).collect(),
            categories: self.output.categories.len(),
            parameters: self.output.parameter_count(),
        }
    }
}

/// Printable summary of a processed document.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSummary {
    pub document_id: Uuid,
    pub subject_id: String,
    pub report_date: NaiveDate,
    pub chunk_count: usize,
    pub empty_chunks: usize,
    pub failed_chunks: Vec<usize>,
    pub categories: usize,
    pub parameters: usize,
}

/// A processed document and the subject record it was merged into.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub outcome: DocumentOutcome,
    pub record: SubjectRecord,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct DocumentProcessor {
    analyzer: Arc<dyn AnalyzerClient>,
    tree: Arc<SynonymTree>,
    chunker: WindowChunker,
    concurrency: usize,
    dump_root: Option<PathBuf>,
}

impl DocumentProcessor {
    pub fn new(analyzer: Arc<dyn AnalyzerClient>, tree: Arc<SynonymTree>, config: &PipelineConfig) -> Self {
        Self {
            analyzer,
            tree,
            chunker: WindowChunker::new(config.chunk_size),
            concurrency: config.concurrency(),
            dump_root: diagnostic::base_dir(),
        }
    }

    /// Override where diagnostic dumps go (`None` disables them).
    pub fn with_dump_root(mut self, dump_root: Option<PathBuf>) -> Self {
        self.dump_root = dump_root;
        self
    }

    pub fn tree(&self) -> &SynonymTree {
        &self.tree
    }

    /// Run a document through the pipeline and return its canonical output.
    pub async fn process(&self, document: &Document) -> Result<DocumentOutcome, PipelineError> {
        let span = tracing::info_span!(
            "process_document",
            doc_id = %document.id,
            subject = %document.subject_id,
        );
        self.process_inner(document).instrument(span).await
    }

    /// Process a document, then merge its output into the subject's record.
    /// A document that fails to process never touches the store.
    pub async fn ingest(&self, document: &Document, store: Arc<MergeStore>) -> Result<IngestOutcome, PipelineError> {
        let outcome = self.process(document).await?;

        let tree = Arc::clone(&self.tree);
        let subject_id = document.subject_id.clone();
        let report_date = document.report_date;
        let categories = outcome.output.categories.clone();
        let record = tokio::task::spawn_blocking(move || {
            store.merge_document(&subject_id, report_date, &categories, &tree)
        })
        .await
        .map_err(|e| PipelineError::TaskFailed(e.to_string()))??;

        Ok(IngestOutcome { outcome, record })
    }

    async fn process_inner(&self, document: &Document) -> Result<DocumentOutcome, PipelineError> {
        let chunks = self.chunker.chunk(&document.text);
        if chunks.is_empty() {
            tracing::warn!("Document has no text, skipping");
            return Err(PipelineError::EmptyDocument(document.id));
        }
        let chunk_count = chunks.len();
        tracing::info!(
            chunks = chunk_count,
            text_len = document.text.len(),
            "Processing document"
        );

        let dump_dir = self
            .dump_root
            .as_deref()
            .and_then(|base| diagnostic::dump_dir_in(base, &document.id));

        let requests: Vec<AnalysisRequest> = chunks.iter().map(AnalysisRequest::from_chunk).collect();
        if let Some(dir) = &dump_dir {
            diagnostic::dump_text(dir, "00-document.txt", &document.text);
            for request in &requests {
                diagnostic::dump_text(dir, &format!("01-chunk-{}.txt", request.chunk_index), &request.current);
                diagnostic::dump_text(dir, &format!("02-prompt-{}.txt", request.chunk_index), &request.prompt());
            }
        }

        let raw_results = self.analyze_all(requests).await;

        let mut categories = Vec::new();
        let mut failures = Vec::new();
        let mut empty_chunks = 0;
        for (index, raw) in raw_results.into_iter().enumerate() {
            match self.interpret(raw, dump_dir.as_deref()) {
                Ok(chunk_categories) => {
                    if chunk_categories.is_empty() {
                        empty_chunks += 1;
                    }
                    fold_chunk(&mut categories, chunk_categories);
                }
                Err(error) => {
                    tracing::warn!(chunk = index, error = %error, "Chunk contributed nothing");
                    empty_chunks += 1;
                    failures.push(ChunkFailure {
                        chunk_index: index,
                        error,
                    });
                }
            }
        }

        let output = CanonicalOutput { categories };
        if let Some(dir) = &dump_dir {
            diagnostic::dump_json(dir, "05-canonical-output.json", &output);
        }

        tracing::info!(
            categories = output.categories.len(),
            parameters = output.parameter_count(),
            empty_chunks,
            failed = failures.len(),
            "Document processed"
        );

        Ok(DocumentOutcome {
            document_id: document.id,
            subject_id: document.subject_id.clone(),
            report_date: document.report_date,
            output,
            chunk_count,
            empty_chunks,
            failures,
        })
    }

    /// Dispatch every chunk concurrently; results come back indexed by chunk.
    async fn analyze_all(&self, requests: Vec<AnalysisRequest>) -> Vec<Result<RawAnalysisResult, AnalyzerError>> {
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for request in requests {
            let analyzer = Arc::clone(&self.analyzer);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(
                async move {
                    let chunk_index = request.chunk_index;
                    let result = match semaphore.acquire_owned().await {
                        Ok(permit) => tokio::task::spawn_blocking(move || {
                            let _permit = permit;
                            analyzer.analyze(&request)
                        })
                        .await
                        .unwrap_or_else(|e| Err(AnalyzerError::TaskFailed(e.to_string()))),
                        Err(e) => Err(AnalyzerError::TaskFailed(e.to_string())),
                    };
                    (chunk_index, result)
                }
                .in_current_span(),
            );
        }

        let mut slots: Vec<Option<Result<RawAnalysisResult, AnalyzerError>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((chunk_index, result)) => {
                    if let Some(slot) = slots.get_mut(chunk_index) {
                        *slot = Some(result.map(|text| RawAnalysisResult { chunk_index, text }));
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Chunk task failed to join"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(AnalyzerError::TaskFailed("chunk task did not complete".into())))
            })
            .collect()
    }

    fn interpret(
        &self,
        raw: Result<RawAnalysisResult, AnalyzerError>,
        dump_dir: Option<&Path>,
    ) -> Result<Vec<Category>, ChunkError> {
        let raw = raw?;
        tracing::debug!(chunk = raw.chunk_index, response_len = raw.text.len(), "Analyzer replied");
        if let Some(dir) = dump_dir {
            diagnostic::dump_text(dir, &format!("03-response-{}.txt", raw.chunk_index), &raw.text);
        }

        let result = interpret_response(&raw.text, &self.tree);
        if let (Err(ChunkError::Malformed(malformed)), Some(dir)) = (&result, dump_dir) {
            diagnostic::dump_text(dir, &format!("04-malformed-{}.txt", raw.chunk_index), &malformed.raw);
        }
        result
    }
}

/// Turn one raw analyzer reply into canonical categories.
pub fn interpret_response(raw: &str, tree: &SynonymTree) -> Result<Vec<Category>, ChunkError> {
    let payload = extract_payload(raw)?;
    let normalized = normalize(&payload, tree);
    if !normalized.is_recognized() {
        return Err(ChunkError::UnrecognizedSchema {
            keys: normalized.unrecognized_keys,
        });
    }
    Ok(normalized.categories)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analyzer::MockAnalyzer;

    fn tree() -> Arc<SynonymTree> {
        Arc::new(
            SynonymTree::from_json_str(
                r#"{
                    "Complete Blood Count": {"Hemoglobin": ["Hb", "HGB"], "RBC": ["Red Blood Cells"]},
                    "Lipid Profile": {"Total Cholesterol": ["Cholesterol"], "HDL": []}
                }"#,
            )
            .unwrap(),
        )
    }

    fn config(chunk_size: usize) -> PipelineConfig {
        PipelineConfig {
            chunk_size,
            max_concurrent_chunks: 2,
            ..PipelineConfig::default()
        }
    }

    fn processor(mock: &Arc<MockAnalyzer>, chunk_size: usize) -> DocumentProcessor {
        let analyzer: Arc<dyn AnalyzerClient> = mock.clone();
        DocumentProcessor::new(analyzer, tree(), &config(chunk_size)).with_dump_root(None)
    }

    fn document(text: &str) -> Document {
        Document::new("u1", NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(), text)
    }

    const CBC_REPLY: &str = "```json\n{\"categories\": [{\"category\": \"Complete Blood Count\", \"parameters\": [{\"name\": \"Hb\", \"value\": \"13.5\", \"unit\": \"g/dL\"}]}]}\n```";
    const LIPID_REPLY: &str = r#"{"reports": [{"category": "Lipid Profile", "parameters": [{"name": "Cholesterol", "result": "190", "unit": "mg/dL", "reference_range": "<200"}]}]}"#;
    const RBC_REPLY: &str = r#"{"lab_results": {"CBC": {"x": 1}, "Complete Blood Count": {"Red Blood Cells": {"value": "4.6"}}}}"#;

    #[tokio::test]
    async fn single_chunk_document_produces_canonical_output() {
        let mock = Arc::new(MockAnalyzer::new(CBC_REPLY));
        let outcome = processor(&mock, 3500).process(&document("Hemoglobin 13.5 g/dL")).await.unwrap();

        assert_eq!(outcome.chunk_count, 1);
        assert_eq!(outcome.empty_chunks, 0);
        assert!(outcome.failures.is_empty());
        let cbc = &outcome.output.categories[0];
        assert_eq!(cbc.name, "Complete Blood Count");
        assert_eq!(cbc.parameters[0].name, "Hemoglobin");
        assert!(cbc.parameters[0].reference_range.is_absent());
    }

    #[tokio::test]
    async fn failed_middle_chunk_keeps_siblings() {
        let mock = Arc::new(
            MockAnalyzer::new("{}")
                .with_response(0, CBC_REPLY)
                .with_failure(1, "service unavailable")
                .with_response(2, LIPID_REPLY),
        );
        let text = "a".repeat(10) + &"b".repeat(10) + &"c".repeat(10);
        let outcome = processor(&mock, 10).process(&document(&text)).await.unwrap();

        assert_eq!(outcome.chunk_count, 3);
        assert_eq!(outcome.empty_chunks, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].chunk_index, 1);
        assert!(matches!(outcome.failures[0].error, ChunkError::Analyzer(_)));
        let names: Vec<_> = outcome.output.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Complete Blood Count", "Lipid Profile"]);
    }

    #[tokio::test]
    async fn results_fold_in_chunk_order() {
        let mock = Arc::new(
            MockAnalyzer::new("{}")
                .with_response(0, LIPID_REPLY)
                .with_response(1, CBC_REPLY)
                .with_response(2, RBC_REPLY),
        );
        let text = "x".repeat(30);
        let outcome = processor(&mock, 10).process(&document(&text)).await.unwrap();

        let names: Vec<_> = outcome.output.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Lipid Profile", "Complete Blood Count"]);
        let cbc: Vec<_> = outcome.output.categories[1].parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(cbc, ["Hemoglobin", "RBC"]);
    }

    #[tokio::test]
    async fn analyzer_receives_neighbor_context() {
        let mock = Arc::new(MockAnalyzer::new("{\"categories\": []}"));
        processor(&mock, 4).process(&document("aaaabbbbcc")).await.unwrap();

        let seen = mock.requests();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].previous.as_deref(), Some("aaaa"));
        assert_eq!(seen[1].current, "bbbb");
        assert_eq!(seen[1].next.as_deref(), Some("cc"));
    }

    #[tokio::test]
    async fn malformed_and_unknown_replies_are_recovered() {
        let mock = Arc::new(
            MockAnalyzer::new(CBC_REPLY)
                .with_response(0, "Sorry, I cannot help with that.")
                .with_response(1, r#"{"patient": {"name": "x"}}"#),
        );
        let outcome = processor(&mock, 5).process(&document("0123456789abcde")).await.unwrap();

        assert_eq!(outcome.failures.len(), 2);
        match &outcome.failures[0].error {
            ChunkError::Malformed(m) => assert_eq!(m.raw, "Sorry, I cannot help with that."),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            outcome.failures[1].error,
            ChunkError::UnrecognizedSchema { keys: vec!["patient".into()] }
        );
        assert_eq!(outcome.output.parameter_count(), 1);
    }

    #[tokio::test]
    async fn empty_document_is_fatal_and_skips_store() {
        let mock = Arc::new(MockAnalyzer::new(CBC_REPLY));
        let store = Arc::new(MergeStore::in_memory());
        let err = processor(&mock, 100)
            .ingest(&document(""), Arc::clone(&store))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::EmptyDocument(_)));
        assert!(mock.requests().is_empty());
        assert!(store.subjects().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ingest_merges_into_subject_record() {
        let mock = Arc::new(MockAnalyzer::new(CBC_REPLY));
        let store = Arc::new(MergeStore::in_memory());
        let processor = processor(&mock, 3500);

        let first = Document::new("u1", NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(), "Hb 13.5");
        let second = Document::new("u1", NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(), "Hb 13.5");
        processor.ingest(&first, Arc::clone(&store)).await.unwrap();
        let ingested = processor.ingest(&second, Arc::clone(&store)).await.unwrap();

        assert_eq!(ingested.record.reports.len(), 2);
        assert_eq!(ingested.record.reports[1].values("Hemoglobin").unwrap(), ["13.5"]);
        assert_eq!(ingested.outcome.summary().parameters, 1);
    }

    #[tokio::test]
    async fn diagnostics_are_written_when_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockAnalyzer::new("not json at all"));
        let analyzer: Arc<dyn AnalyzerClient> = mock.clone();
        let processor =
            DocumentProcessor::new(analyzer, tree(), &config(3500)).with_dump_root(Some(tmp.path().to_path_buf()));
        let doc = document("Hb 13.5");
        processor.process(&doc).await.unwrap();

        let dir = tmp.path().join(doc.id.to_string());
        assert!(dir.join("01-chunk-0.txt").exists());
        assert!(dir.join("02-prompt-0.txt").exists());
        assert!(dir.join("03-response-0.txt").exists());
        assert!(dir.join("04-malformed-0.txt").exists());
        assert!(dir.join("05-canonical-output.json").exists());
    }

    #[test]
    fn interpret_response_handles_fenced_reply() {
        let categories = interpret_response(CBC_REPLY, &tree()).unwrap();
        assert_eq!(categories.len(), 1);
    }
}
