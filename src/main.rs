use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use medparam_lib::pipeline::analyzer::analyzer_from_config;
use medparam_lib::pipeline::merge::{MergeStore, SqliteRecordStore};
use medparam_lib::pipeline::synonyms::SynonymTree;
use medparam_lib::pipeline::{interpret_response, CanonicalOutput, Document, DocumentProcessor};
use medparam_lib::pipeline_config::PipelineConfig;

#[derive(Parser)]
#[command(name = "medparam")]
#[command(about = "Normalize OCR'd medical reports into a per-subject parameter history")]
struct Cli {
    /// Pipeline config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Synonym tree file (JSON); defaults to the data directory
    #[arg(long, global = true)]
    synonyms: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a report text file and merge it into the subject's record
    Ingest {
        /// Subject identifier
        #[arg(long)]
        subject: String,
        /// Report date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// OCR'd report text
        input: PathBuf,
        /// Write the document's canonical output here
        #[arg(long)]
        output: Option<PathBuf>,
        /// Skip OCR page-furniture cleanup
        #[arg(long)]
        no_clean: bool,
    },
    /// Normalize a saved analyzer reply into canonical output
    Normalize {
        /// Raw analyzer reply
        input: PathBuf,
        /// Write the canonical output here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print a subject's merged record
    Show {
        /// Subject identifier
        subject: String,
        /// Print every parameter's values across all dates instead
        #[arg(long)]
        consolidated: bool,
    },
    /// List subjects with stored records
    Subjects,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> CliResult {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    medparam_lib::init_tracing();

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.synonyms {
        config.synonyms_path = path;
    }

    match cli.command {
        Commands::Ingest {
            subject,
            date,
            input,
            output,
            no_clean,
        } => ingest(&config, &subject, date, &input, output.as_deref(), no_clean),
        Commands::Normalize { input, output } => normalize(&config, &input, output.as_deref()),
        Commands::Show {
            subject,
            consolidated,
        } => show(&config, &subject, consolidated),
        Commands::Subjects => {
            for subject in open_store(&config)?.subjects()? {
                println!("{subject}");
            }
            Ok(())
        }
    }
}

fn ingest(
    config: &PipelineConfig,
    subject: &str,
    date: NaiveDate,
    input: &Path,
    output: Option<&Path>,
    no_clean: bool,
) -> CliResult {
    let tree = Arc::new(SynonymTree::load(&config.synonyms_path)?);
    let analyzer = analyzer_from_config(config)?;
    let store = Arc::new(open_store(config)?);

    let text = std::fs::read_to_string(input)?;
    let document = if no_clean {
        Document::new(subject, date, text)
    } else {
        Document::from_ocr_text(subject, date, &text)
    };

    let processor = DocumentProcessor::new(analyzer, tree, config);
    // The analyzer's blocking HTTP client must be built and dropped outside the runtime.
    let runtime = tokio::runtime::Runtime::new()?;
    let ingested = runtime.block_on(processor.ingest(&document, store))?;
    drop(runtime);

    if let Some(path) = output {
        write_json(path, &ingested.outcome.output)?;
    }
    println!("{}", serde_json::to_string_pretty(&ingested.outcome.summary())?);
    for failure in &ingested.outcome.failures {
        eprintln!("chunk {}: {}", failure.chunk_index, failure.error);
    }
    Ok(())
}

fn normalize(config: &PipelineConfig, input: &Path, output: Option<&Path>) -> CliResult {
    let tree = SynonymTree::load(&config.synonyms_path)?;
    let raw = std::fs::read_to_string(input)?;
    let output_doc = CanonicalOutput {
        categories: interpret_response(&raw, &tree)?,
    };
    match output {
        Some(path) => write_json(path, &output_doc)?,
        None => println!("{}", serde_json::to_string_pretty(&output_doc)?),
    }
    Ok(())
}

fn show(config: &PipelineConfig, subject: &str, consolidated: bool) -> CliResult {
    let store = open_store(config)?;
    if consolidated {
        println!("{}", serde_json::to_string_pretty(&store.consolidated(subject)?)?);
        return Ok(());
    }
    match store.record(subject)? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => eprintln!("No record for subject {subject}"),
    }
    Ok(())
}

fn open_store(config: &PipelineConfig) -> Result<MergeStore, Box<dyn std::error::Error>> {
    let backend = SqliteRecordStore::open(&config.database_path)?;
    Ok(MergeStore::new(Arc::new(backend)))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> CliResult {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    tracing::info!(path = %path.display(), "Canonical output written");
    Ok(())
}
