//! CLI interface for tabletutor

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, Config};
use crate::engine::{grading, AnswerRequest, Engine, IngestEntry};
use crate::graph::GraphBuilder;
use crate::store::SqliteRecordStore;
use crate::types::{AnswerOutcome, FlowPath, Table};

#[derive(Parser)]
#[command(name = "tabletutor")]
#[command(about = "Adaptive table question answering with confidence-gated guidance", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question about a table
    Ask {
        /// The question text
        question: String,
        /// Path to the table JSON file ({"headers": [...], "rows": [[...]]})
        #[arg(short, long)]
        table: PathBuf,
        /// Expected answer; enables training mode and error logging
        #[arg(short, long)]
        expected: Option<String>,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Answer a batch of questions from a JSON file
    Batch {
        /// Path to a JSON array of {question, table, expected_answer}
        file: PathBuf,
        /// Print the full batch report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ingest knowledge records from a JSON file
    Ingest {
        /// Path to a JSON array of knowledge entries
        file: PathBuf,
    },
    /// Show record store statistics
    Stats,
    /// Build the similarity neighborhood graph around a question
    Graph {
        /// The question text
        question: String,
        /// Table id when the question is a stored one
        #[arg(long)]
        table_id: Option<String>,
        /// Expansion depth
        #[arg(long, default_value = "2")]
        layers: u8,
        /// Similar questions per node
        #[arg(long, default_value = "5")]
        top_n: usize,
    },
    /// Configure the engine
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Set the guidance confidence threshold (0.0 to 1.0)
        #[arg(long)]
        set_confidence_threshold: Option<f64>,
        /// Set the funnel result size
        #[arg(long)]
        set_top_n: Option<usize>,
        /// Set the chat model
        #[arg(long)]
        set_chat_model: Option<String>,
        /// Set the embedding model
        #[arg(long)]
        set_embedding_model: Option<String>,
        /// Set the table-structure classifier endpoint
        #[arg(long)]
        set_classifier_endpoint: Option<String>,
        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            question,
            table,
            expected,
            json,
        } => {
            let engine = Engine::new(Config::load()?).await?;
            let table = read_table(&table)?;
            let outcome = engine
                .answer(AnswerRequest {
                    question,
                    table,
                    expected_answer: expected,
                })
                .await;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
        }
        Commands::Batch { file, json } => {
            let engine = Engine::new(Config::load()?).await?;
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let requests: Vec<AnswerRequest> = serde_json::from_str(&contents)
                .context("Failed to parse batch file")?;
            let report = engine.answer_batch(requests).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for (i, outcome) in report.outcomes.iter().enumerate() {
                    let answer = grading::extract_answer(&outcome.answer)
                        .unwrap_or_else(|| outcome.answer.clone());
                    println!("[{}] {} {}", i + 1, outcome.flow_path, answer);
                }
                println!(
                    "{} answered, {} failed of {}",
                    report.succeeded, report.failed, report.total
                );
            }
        }
        Commands::Ingest { file } => {
            let engine = Engine::new(Config::load()?).await?;
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let entries: Vec<IngestEntry> = serde_json::from_str(&contents)
                .context("Failed to parse ingest file")?;
            let count = engine.ingest(entries).await?;
            println!("Ingested {} knowledge records.", count);
        }
        Commands::Stats => {
            let store = open_store().await?;
            let stats = store.statistics().await?;
            println!("Knowledge records: {}", stats.knowledge_count);
            println!("Learning records:");
            for (flag, count) in &stats.learning_by_flag {
                println!("  flag {}: {}", flag, count);
            }
            println!("Teaching records:");
            for (strategy, count) in &stats.teaching_by_strategy {
                println!("  {}: {}", strategy, count);
            }
            println!("Error records: {}", stats.error_count);
        }
        Commands::Graph {
            question,
            table_id,
            layers,
            top_n,
        } => {
            let store = open_store().await?;
            let builder = GraphBuilder::with_limits(store, layers, top_n);
            let graph = builder.build(&question, table_id.as_deref()).await;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Commands::Config {
            show,
            set_confidence_threshold,
            set_top_n,
            set_chat_model,
            set_embedding_model,
            set_classifier_endpoint,
            reset,
        } => {
            let mut handled = false;
            if let Some(threshold) = set_confidence_threshold {
                config::set_confidence_threshold(threshold)?;
                handled = true;
            }
            if let Some(top_n) = set_top_n {
                config::set_top_n(top_n)?;
                handled = true;
            }
            if let Some(model) = set_chat_model {
                config::set_chat_model(&model)?;
                handled = true;
            }
            if let Some(model) = set_embedding_model {
                config::set_embedding_model(&model)?;
                handled = true;
            }
            if let Some(endpoint) = set_classifier_endpoint {
                config::set_classifier_endpoint(&endpoint)?;
                handled = true;
            }
            if reset {
                config::reset_config()?;
                handled = true;
            }
            if show || !handled {
                config::show_config()?;
            }
        }
    }

    Ok(())
}

/// Open the configured record store without building the full pipeline;
/// read-only commands do not need API credentials
async fn open_store() -> Result<Arc<SqliteRecordStore>> {
    let config = Config::load()?;
    let db_path = config.storage.resolve_db_path()?;
    Ok(Arc::new(SqliteRecordStore::new(&db_path).await?))
}

fn read_table(path: &Path) -> Result<Table> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).context("Failed to parse table file")
}

fn print_outcome(outcome: &AnswerOutcome) {
    println!("{}", outcome.answer);
    if let Some(extracted) = grading::extract_answer(&outcome.answer) {
        println!();
        println!("Answer:       {}", extracted);
    }
    println!("Flow:         {}", outcome.flow_path);
    println!(
        "Confidence:   {:.3} first pass, {:.3} final",
        outcome.confidence, outcome.final_confidence
    );
    println!("Context used: {}", outcome.context_used);
    if !outcome.candidates.is_empty() {
        println!("Candidates:");
        for candidate in &outcome.candidates {
            println!(
                "  {} score {:.3} {}",
                candidate.table_id,
                candidate.score,
                if candidate.correct { "correct" } else { "incorrect" }
            );
        }
    }
    if !outcome.not_found.is_empty() {
        println!("Unresolved:   {}", outcome.not_found.join(", "));
    }
    if let Some(guidance) = &outcome.guidance {
        println!(
            "Guidance:     session {} with {} trials",
            guidance.session_id,
            guidance.trials.len()
        );
    }
    if let Some(correct) = outcome.graded_correct {
        println!(
            "Graded:       {}",
            if correct { "correct" } else { "incorrect" }
        );
    }
    if outcome.flow_path == FlowPath::Error {
        if let Some(error) = &outcome.error {
            println!("Error:        {}", error);
        }
    }
}
