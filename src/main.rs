use askdata::job::JobLock;
use askdata::llm::{CompletionService, LlmClient, OfflineCompletion, ReplayCompletion};
use askdata::profiler::KindStats;
use askdata::response::{AssistantResponse, TableAnswer};
use askdata::store::DirectoryStore;
use askdata::{AssistantConfig, Pipeline, PipelineRun};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

static BATCH_LOCK: JobLock = JobLock::new();

#[derive(Parser)]
#[command(name = "askdata")]
#[command(about = "Answer natural-language questions over a directory of datasets")]
#[command(version)]
struct Args {
    /// Directory of *.json / *.csv collections (one collection per file)
    #[arg(short, long, default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Comma-separated collections that must never be used
    #[arg(long, global = true)]
    restrict: Option<String>,

    #[arg(long, global = true)]
    max_retries: Option<usize>,

    /// Wall-clock limit for one generated procedure
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Replay completion responses from a file (separated by `---` lines) instead of calling the API
    #[arg(long, global = true)]
    replay: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one query
    Ask { query: String },
    /// Show the profile of every accessible collection
    Profile,
    /// Show heuristic collection scores for a query without calling the completion service
    Score { query: String },
    /// Answer every non-empty line of a file, one run at a time
    Batch { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("askdata=info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = AssistantConfig::from_env()?;
    if let Some(restrict) = &args.restrict {
        config
            .restricted_collections
            .extend(askdata::config::split_list(restrict));
    }
    if let Some(max_retries) = args.max_retries {
        config.synthesis.max_retries = max_retries;
    }
    if let Some(secs) = args.timeout_secs {
        config.synthesis.timeout = Duration::from_secs(secs);
    }

    let completion: Arc<dyn CompletionService> = match (&args.replay, LlmClient::from_config(&config.llm)) {
        (Some(path), _) => {
            let script = std::fs::read_to_string(path)
                .with_context(|| format!("reading replay file {}", path.display()))?;
            info!("Replaying completion responses from {}", path.display());
            Arc::new(ReplayCompletion::from_script(&script))
        }
        (None, Some(client)) => {
            info!("Using model {}", config.llm.model);
            Arc::new(client)
        }
        (None, None) => {
            warn!("OPENAI_API_KEY not set; completion-dependent steps will fail safe");
            Arc::new(OfflineCompletion)
        }
    };

    let store = Arc::new(DirectoryStore::new(&args.data_dir));
    let pipeline = Pipeline::new(&config, store, completion);

    match &args.command {
        Commands::Ask { query } => {
            let run = pipeline.run(query).await;
            print_run(&run, args.json)?;
        }
        Commands::Profile => {
            let profiles = pipeline.profiles().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&profiles)?);
            } else {
                for profile in &profiles {
                    println!("{} ({} documents)", profile.name, profile.document_count);
                    for field in &profile.fields {
                        let stats = match &field.stats {
                            KindStats::Numeric { min, max } => format!("{} .. {}", min, max),
                            KindStats::Datetime { min, max } => format!("{} .. {}", min, max),
                            KindStats::Categorical { unique_values } => {
                                format!("{} distinct", unique_values.len())
                            }
                            KindStats::Unknown => String::new(),
                        };
                        println!("  {:<24} {:<12} {}", field.field_name, format!("{:?}", field.kind), stats);
                    }
                }
            }
        }
        Commands::Score { query } => {
            let profiles = pipeline.profiles().await?;
            let ranked = pipeline.resolver().score(query, &profiles);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&ranked)?);
            } else {
                for result in &ranked {
                    println!("{:>8.2}  {}  {}", result.score, result.collection_name, result.rationale);
                }
            }
        }
        Commands::Batch { file } => {
            let Some(guard) = BATCH_LOCK.try_acquire() else {
                bail!("another batch job is already running");
            };
            let contents = std::fs::read_to_string(file)
                .with_context(|| format!("reading batch file {}", file.display()))?;
            let queries: Vec<&str> = contents.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
            info!("Running batch of {} queries", queries.len());
            for query in queries {
                if !args.json {
                    println!("> {}", query);
                }
                let run = pipeline.run(query).await;
                print_run(&run, args.json)?;
            }
            guard.release();
        }
    }

    Ok(())
}

fn print_run(run: &PipelineRun, json: bool) -> Result<()> {
    tracing::debug!(
        "Diagnostics: {}",
        serde_json::to_string(&run.diagnostics).unwrap_or_default()
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&run.response)?);
        return Ok(());
    }

    match &run.response {
        AssistantResponse::Chart(answer) => print_answer("chart", answer),
        AssistantResponse::Description(answer) => print_answer("description", answer),
        AssistantResponse::Report { sections } => {
            for (i, section) in sections.iter().enumerate() {
                println!("--- section {} [{:?}] {} ({})", i + 1, section.kind, section.sub_query, section.collection);
                match (&section.answer, &section.error) {
                    (Some(answer), _) => print_answer("section", answer),
                    (None, Some(error)) => println!("error: {}", error),
                    (None, None) => {}
                }
            }
        }
        AssistantResponse::Error { message } => println!("error: {}", message),
    }
    Ok(())
}

fn print_answer(label: &str, answer: &TableAnswer) {
    println!("[{}] {} ({})", label, answer.collection, answer.rationale);
    if answer.degraded {
        println!("(could not transform the data; showing the collection as stored)");
    }
    println!("{}", answer.columns.join("\t"));
    for row in answer.rows.iter().take(25) {
        let cells: Vec<String> = answer
            .columns
            .iter()
            .map(|c| match &row[c.as_str()] {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
    if answer.rows.len() > 25 {
        println!("... {} more rows", answer.rows.len() - 25);
    }
}
