pub mod analyzer; // Chunk → raw text (OpenAI-compatible, Ollama, mock)
pub mod chunker;
pub mod diagnostic; // Intermediate artifact dump (auto in dev, MEDPARAM_DUMP_DIR in prod)
pub mod extractor;
pub mod merge; // Per-subject, per-date record merge
pub mod normalize;
pub mod preprocess; // OCR page-furniture cleanup
pub mod processor;
pub mod synonyms;
pub mod types;

pub use processor::{
    interpret_response, ChunkError, ChunkFailure, DocumentOutcome, DocumentProcessor, IngestOutcome,
    OutcomeSummary, PipelineError,
};
pub use types::*;
