//! Quarry CLI - ask questions of a ClickHouse database in plain language
//!
//! Usage:
//!   quarry validate <sql>
//!   quarry run <sql> [--param name=value]...
//!   quarry explain <sql> [--question <question>]
//!   quarry schema [table] [--list] [--schema <schema.json>]
//!   quarry context <question> [--schema <schema.json>]
//!   quarry ask <question> [--schema <schema.json>] [--execute] [--full-schema]
//!   quarry embed-schema [--schema <schema.json>]
//!
//! Examples:
//!   quarry validate "SELECT count(*) FROM orders"
//!   quarry run "SELECT * FROM orders WHERE amount > {min:Float64}" -p min=100
//!   quarry schema orders
//!   quarry context "total revenue per customer" --schema schema.json
//!   quarry ask "how many orders were paid last week" --execute

use std::fmt::Display;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use quarry::cache::{EmbeddingStore, JsonFileStore, MemoryStore, SqliteStore};
use quarry::config::{CacheBackend, Settings};
use quarry::embedding::{model_from_settings, EmbeddingIndex, EmbeddingModel, HashingEmbedder};
use quarry::gateway::{ClickHouseGateway, ExecutionGateway, Parameters};
use quarry::llm::OpenAiGenerator;
use quarry::metadata::{ClickHouseMetadataProvider, MetadataProvider, StaticMetadataProvider};
use quarry::pipeline::{execute_validated, ContextMode, Pipeline, PipelineError};
use quarry::retrieval::{QueryProcessor, SchemaEmbedder};
use quarry::validation::{ComplexityLimits, SqlValidator};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Quarry - natural-language questions to safe ClickHouse SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a SQL statement against the security rules
    Validate {
        /// The statement to check
        sql: String,
    },

    /// Validate a SQL statement and run it
    Run {
        /// The statement to run
        sql: String,

        /// Bind a `{name:Type}` parameter; the value is read as JSON, or
        /// taken as a string when it is not valid JSON
        #[arg(short, long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },

    /// Explain a SQL statement in plain language
    Explain {
        /// The statement to explain
        sql: String,

        /// The question the statement answers
        #[arg(short, long)]
        question: Option<String>,
    },

    /// Show the schema of every table, or of one table
    Schema {
        /// Table to show
        table: Option<String>,

        /// Print table names only
        #[arg(short, long)]
        list: bool,

        /// Read the schema from a JSON file instead of the database
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// Show the schema context retrieved for a question
    Context {
        /// Natural-language question
        question: String,

        /// Read the schema from a JSON file instead of the database
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// Generate (and optionally run) SQL for a question
    Ask {
        /// Natural-language question
        question: String,

        /// Read the schema from a JSON file instead of the database
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Execute the validated statement and print the rows
        #[arg(short, long)]
        execute: bool,

        /// Give the model every table instead of the most relevant elements
        #[arg(short, long)]
        full_schema: bool,
    },

    /// Re-embed the schema and save the embedding cache
    EmbedSchema {
        /// Read the schema from a JSON file instead of the database
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quarry=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => return fail(format!("Error loading configuration: {}", e)),
    };

    match cli.command {
        Commands::Validate { sql } => cmd_validate(&settings, &sql),
        Commands::Run { sql, params } => cmd_run(&settings, &sql, params).await,
        Commands::Explain { sql, question } => cmd_explain(&settings, &sql, question).await,
        Commands::Schema {
            table,
            list,
            schema,
        } => cmd_schema(&settings, table, list, schema).await,
        Commands::Context { question, schema } => cmd_context(&settings, &question, schema).await,
        Commands::Ask {
            question,
            schema,
            execute,
            full_schema,
        } => {
            let mode = if full_schema {
                ContextMode::FullSchema
            } else {
                ContextMode::Retrieved
            };
            cmd_ask(&settings, &question, schema, mode, execute).await
        }
        Commands::EmbedSchema { schema } => cmd_embed_schema(&settings, schema).await,
    }
}

fn fail(message: impl Display) -> ExitCode {
    eprintln!("{}", message);
    ExitCode::FAILURE
}

fn fail_pipeline(e: PipelineError) -> ExitCode {
    if e.is_user_correctable() {
        fail(format!("Refused: {}", e))
    } else if e.is_retriable() {
        fail(format!("Error: {} (temporary, try again)", e))
    } else {
        fail(format!("Error: {}", e))
    }
}

fn print_json(value: &impl Serialize) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => fail(format!("Error rendering result: {}", e)),
    }
}

/// Parse `name=value`. The value is JSON when it parses as JSON, a string
/// otherwise.
fn parse_param(arg: &str) -> Result<(String, Value), String> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", arg))?;
    if name.is_empty() {
        return Err(format!("missing parameter name in '{}'", arg));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

fn validator(settings: &Settings) -> SqlValidator {
    SqlValidator::new(ComplexityLimits::from(&settings.validator))
}

fn gateway(settings: &Settings) -> Result<Arc<ClickHouseGateway>, String> {
    ClickHouseGateway::new(&settings.clickhouse)
        .map(Arc::new)
        .map_err(|e| format!("Error configuring ClickHouse: {}", e))
}

fn provider(
    settings: &Settings,
    gateway: Arc<ClickHouseGateway>,
    schema: Option<PathBuf>,
) -> Arc<dyn MetadataProvider> {
    match schema {
        Some(path) => Arc::new(StaticMetadataProvider::from_file(path)),
        None => Arc::new(ClickHouseMetadataProvider::new(
            gateway,
            settings.clickhouse.database.clone(),
        )),
    }
}

/// Components shared by the schema-aware commands.
struct Retrieval {
    index: Arc<EmbeddingIndex>,
    processor: QueryProcessor,
    gateway: Arc<ClickHouseGateway>,
}

impl Retrieval {
    /// Wire up retrieval. Without `ranking`, nothing is ever embedded, so the
    /// configured model is not loaded and the cache is not opened.
    fn build(settings: &Settings, schema: Option<PathBuf>, ranking: bool) -> Result<Self, String> {
        let index = if ranking {
            let model = model_from_settings(&settings.embedding)
                .map_err(|e| format!("Error loading embedding model: {}", e))?;
            EmbeddingIndex::open(model, open_store(settings))
        } else {
            let model: Arc<dyn EmbeddingModel> = Arc::new(HashingEmbedder::default());
            EmbeddingIndex::in_memory(model)
        };
        let index = Arc::new(index);

        let gateway = gateway(settings)?;
        let provider = provider(settings, gateway.clone(), schema);

        let embedder = Arc::new(SchemaEmbedder::new(provider, index.clone()));
        let processor = QueryProcessor::with_settings(embedder, &settings.retrieval);

        Ok(Self {
            index,
            processor,
            gateway,
        })
    }

    fn save(&self) {
        if let Err(e) = self.index.save() {
            warn!(error = %e, "failed to save embedding cache");
        }
    }
}

/// Open the configured embedding store, falling back to memory when the
/// store cannot be opened.
fn open_store(settings: &Settings) -> Arc<dyn EmbeddingStore> {
    let path = match settings.embedding.resolved_cache_path() {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "cannot resolve embedding cache path, using memory");
            None
        }
    };

    match (settings.embedding.cache_backend, path) {
        (CacheBackend::Sqlite, Some(path)) => match SqliteStore::open(&path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open embedding cache, using memory");
                Arc::new(MemoryStore::new())
            }
        },
        (CacheBackend::Json, Some(path)) => Arc::new(JsonFileStore::new(path)),
        _ => Arc::new(MemoryStore::new()),
    }
}

fn cmd_validate(settings: &Settings, sql: &str) -> ExitCode {
    let verdict = validator(settings).validate(sql);

    if verdict.is_safe {
        println!("OK: statement is safe");
        return ExitCode::SUCCESS;
    }

    println!("Rejected: {}", verdict);
    if let Some(ops) = &verdict.allowed_operations {
        println!("Allowed operations: {}", ops.join(", "));
    }
    ExitCode::FAILURE
}

async fn cmd_run(settings: &Settings, sql: &str, params: Vec<(String, Value)>) -> ExitCode {
    let gateway = match gateway(settings) {
        Ok(g) => g,
        Err(e) => return fail(e),
    };
    let parameters: Parameters = params.into_iter().collect();

    match execute_validated(&validator(settings), gateway.as_ref(), sql, &parameters).await {
        Ok(result) => print_json(&result),
        Err(e) => fail_pipeline(e),
    }
}

async fn cmd_explain(settings: &Settings, sql: &str, question: Option<String>) -> ExitCode {
    let generator = match OpenAiGenerator::from_settings(&settings.llm) {
        Ok(g) => g,
        Err(e) => return fail(format!("Error configuring language model: {}", e)),
    };

    match generator.explain(sql, question.as_deref()).await {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => fail(format!("Error generating explanation: {}", e)),
    }
}

async fn cmd_schema(
    settings: &Settings,
    table: Option<String>,
    list: bool,
    schema: Option<PathBuf>,
) -> ExitCode {
    let gateway = match gateway(settings) {
        Ok(g) => g,
        Err(e) => return fail(e),
    };
    let provider = provider(settings, gateway, schema);

    if list {
        return match provider.table_names().await {
            Ok(names) => {
                for name in names {
                    println!("{}", name);
                }
                ExitCode::SUCCESS
            }
            Err(e) => fail(format!("Error listing tables: {}", e)),
        };
    }

    match table {
        Some(name) => match provider.table(&name).await {
            Ok(info) => print_json(&info),
            Err(e) => fail(format!("Error reading schema: {}", e)),
        },
        None => match provider.snapshot().await {
            Ok(snapshot) => print_json(&snapshot),
            Err(e) => fail(format!("Error reading schema: {}", e)),
        },
    }
}

async fn cmd_context(settings: &Settings, question: &str, schema: Option<PathBuf>) -> ExitCode {
    let retrieval = match Retrieval::build(settings, schema, true) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    let result = retrieval.processor.process_query(question).await;
    retrieval.save();

    if result.degraded {
        eprintln!("Note: schema retrieval degraded, context may be incomplete");
    }
    println!("Relevant tables: {}", result.relevant_tables.join(", "));
    println!();
    println!("{}", result.focused_context);
    ExitCode::SUCCESS
}

async fn cmd_ask(
    settings: &Settings,
    question: &str,
    schema: Option<PathBuf>,
    mode: ContextMode,
    execute: bool,
) -> ExitCode {
    let retrieval = match Retrieval::build(settings, schema, mode == ContextMode::Retrieved) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    let generator = match OpenAiGenerator::from_settings(&settings.llm) {
        Ok(g) => g,
        Err(e) => return fail(format!("Error configuring language model: {}", e)),
    };

    let index = retrieval.index.clone();
    let gateway: Arc<dyn ExecutionGateway> = retrieval.gateway.clone();
    let pipeline = Pipeline::new(
        retrieval.processor,
        Arc::new(generator),
        validator(settings),
        gateway,
    );

    let outcome = pipeline.answer(question, mode, execute).await;

    if mode == ContextMode::Retrieved {
        if let Err(e) = index.save() {
            warn!(error = %e, "failed to save embedding cache");
        }
    }

    match outcome {
        Ok(outcome) => print_json(&outcome),
        Err(e) => fail_pipeline(e),
    }
}

async fn cmd_embed_schema(settings: &Settings, schema: Option<PathBuf>) -> ExitCode {
    let retrieval = match Retrieval::build(settings, schema, true) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    let embedder = retrieval.processor.embedder();
    embedder.reset();
    let elements = match embedder.embed_schema().await {
        Ok(elements) => elements,
        Err(e) => return fail(format!("Error embedding schema: {}", e)),
    };

    if let Err(e) = retrieval.index.save() {
        return fail(format!("Error saving embedding cache: {}", e));
    }

    let stats = retrieval.index.stats();
    println!(
        "Embedded {} schema elements ({} cached embeddings, {} dimensions, model {})",
        elements.len(),
        stats.entries,
        stats.dimension,
        stats.model
    );
    ExitCode::SUCCESS
}
