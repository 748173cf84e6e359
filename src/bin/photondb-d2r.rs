//! PhotonDB D2R command line
//!
//! Inspect how documents are split into relational rows and which
//! identifiers the engine generates for them.
//!
//! # Examples
//!
//! ```bash
//! # Show the rows of every document in orders.json
//! photondb-d2r split --database shop --collection orders orders.json
//!
//! # Split, store and rebuild documents, failing on any difference
//! photondb-d2r roundtrip --database shop --collection orders orders.jsonl
//!
//! # Identifier of a field column
//! photondb-d2r identifier field price double
//!
//! # Effective configuration
//! photondb-d2r config
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use photondb_d2r::config::EngineConfig;
use photondb_d2r::{
    D2RTranslator, FieldType, IdentifierFactory, KvDocument, MemoryBackend, MetaSnapshot, MetainfoRepository,
    ReservedIdGenerator, StorageBackend, TableRef,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// PhotonDB D2R - Document/Relational Mapping Engine
#[derive(Parser, Debug)]
#[command(name = "photondb-d2r")]
#[command(version = photondb_d2r::VERSION)]
#[command(about = "Map schemaless documents to relational tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "PHOTONDB_D2R_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "PHOTONDB_D2R_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the configuration
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split documents into doc-part rows and print them
    Split {
        #[arg(short, long)]
        database: String,

        #[arg(short, long)]
        collection: String,

        /// JSON array or JSON-lines file
        input: PathBuf,
    },

    /// Split, store and rebuild documents
    Roundtrip {
        #[arg(short, long)]
        database: String,

        #[arg(short, long)]
        collection: String,

        /// JSON array or JSON-lines file
        input: PathBuf,
    },

    /// Generate one identifier against an empty catalog
    Identifier {
        #[command(subcommand)]
        kind: IdentifierKind,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug)]
enum IdentifierKind {
    /// Schema identifier of a database
    Database { name: String },

    /// Identifier of a collection
    Collection { database: String, collection: String },

    /// Table identifier of the doc part at a path of object fields
    DocPart {
        database: String,
        collection: String,
        path: Vec<String>,
    },

    /// Column identifier of a field stored as the given type
    Field { name: String, field_type: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;

    setup_logging(&cli, &config)?;

    let result = match cli.command {
        Commands::Split {
            database,
            collection,
            input,
        } => split_command(&config, &database, &collection, &input).await,
        Commands::Roundtrip {
            database,
            collection,
            input,
        } => roundtrip_command(&config, &database, &collection, &input).await,
        Commands::Identifier { kind } => identifier_command(&config, kind),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

/// Setup logging with rolling files and stderr output
fn setup_logging(cli: &Cli, config: &EngineConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "photondb-d2r.log");

    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.logging.level)
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    // Rows and documents go to stdout, so console logs use stderr.
    let console = if config.logging.json {
        fmt::layer().with_writer(std::io::stderr).json().boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    tracing_subscriber::registry()
        .with(console)
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(filter)
        .init();

    Ok(())
}

fn read_documents(input: &Path) -> anyhow::Result<Vec<KvDocument>> {
    let text = std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;

    let values: Vec<Value> = if text.trim_start().starts_with('[') {
        serde_json::from_str(&text).with_context(|| format!("parsing {}", input.display()))?
    } else {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| {
                serde_json::from_str(line).with_context(|| format!("parsing line {} of {}", number + 1, input.display()))
            })
            .collect::<anyhow::Result<_>>()?
    };

    values
        .into_iter()
        .map(|value| match value {
            Value::Object(map) => Ok(KvDocument::from(Value::Object(map))),
            other => bail!("expected a JSON object, found {}", other),
        })
        .collect()
}

/// Translate and store `documents`, returning the catalog they produced.
async fn store(
    config: &EngineConfig,
    backend: &MemoryBackend,
    database: &str,
    collection: &str,
    documents: &[KvDocument],
) -> anyhow::Result<Arc<MetaSnapshot>> {
    let factory = IdentifierFactory::new(config.identifier_constraints()?).with_budget(config.generation_budget());
    let rids = ReservedIdGenerator::new();
    let repository = MetainfoRepository::new();

    let data = repository.modify(|snapshot| {
        let mut translator = D2RTranslator::new(&factory, &rids, snapshot, database, collection)?;
        for document in documents {
            translator.translate(document)?;
        }
        Ok(translator.into_collection_data_accumulator())
    })?;
    info!(
        documents = data.document_count(),
        rows = data.row_count(),
        doc_parts = data.doc_parts().len(),
        "Split documents"
    );

    let snapshot = repository.snapshot();
    backend.write(&snapshot, &data).await?;
    Ok(snapshot)
}

async fn split_command(config: &EngineConfig, database: &str, collection: &str, input: &Path) -> anyhow::Result<()> {
    let documents = read_documents(input)?;
    let backend = MemoryBackend::new();
    let snapshot = store(config, &backend, database, collection, &documents).await?;

    let meta_collection = snapshot
        .collection_by_name(database, collection)
        .context("collection missing after write")?;
    let schema = snapshot.database(meta_collection.database()).identifier();
    for doc_part in snapshot.doc_parts_of(meta_collection.handle()) {
        println!("{}.{} ({})", schema, doc_part.identifier(), doc_part.table_ref());
        for row in backend.rows(schema, doc_part.identifier()) {
            println!("  {}", serde_json::to_string(&row)?);
        }
    }
    Ok(())
}

async fn roundtrip_command(
    config: &EngineConfig,
    database: &str,
    collection: &str,
    input: &Path,
) -> anyhow::Result<()> {
    let documents = read_documents(input)?;
    let backend = MemoryBackend::new();
    let snapshot = store(config, &backend, database, collection, &documents).await?;
    let rebuilt = backend.read_documents(&snapshot, database, collection).await?;

    if rebuilt.len() != documents.len() {
        bail!("stored {} documents but read back {}", documents.len(), rebuilt.len());
    }
    for (original, document) in documents.iter().zip(&rebuilt) {
        println!("{}", serde_json::to_string(&document.to_json())?);
        if original != &document.root {
            bail!("document {} differs after the round trip", document.did);
        }
    }
    info!(documents = rebuilt.len(), "Round trip succeeded");
    Ok(())
}

fn identifier_command(config: &EngineConfig, kind: IdentifierKind) -> anyhow::Result<()> {
    let factory = IdentifierFactory::new(config.identifier_constraints()?).with_budget(config.generation_budget());
    let mut snapshot = MetaSnapshot::new();

    let identifier = match kind {
        IdentifierKind::Database { name } => factory.database_identifier(&snapshot, &name)?,
        IdentifierKind::Collection { database, collection } => {
            factory.collection_identifier(&snapshot, &database, &collection)?
        }
        IdentifierKind::DocPart {
            database,
            collection,
            path,
        } => {
            let table_ref = path.iter().fold(TableRef::root(), |table_ref, field| table_ref.child(field.as_str()));
            let db_identifier = factory.database_identifier(&snapshot, &database)?;
            let handle = snapshot.add_database(&database, &db_identifier)?;
            factory.doc_part_identifier(snapshot.database(handle), &collection, &table_ref)?
        }
        IdentifierKind::Field { name, field_type } => {
            let field_type: FieldType = field_type.parse()?;
            let db = snapshot.add_database("cli", "cli")?;
            let coll = snapshot.add_collection(db, "cli", "cli_cli")?;
            let part = snapshot.add_doc_part(coll, TableRef::root(), "cli")?;
            factory.field_identifier(snapshot.doc_part(part), &name, field_type)?
        }
    };

    println!("{}", identifier);
    Ok(())
}
