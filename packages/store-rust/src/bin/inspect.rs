//! `entitygraph-inspect`: load a schema and a payload, then print how the
//! store reads records back.
//!
//! ```text
//! entitygraph-inspect --schema models.json --payload books.json \
//!     --model Book --ids 1,2 --deep
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use entitygraph_core::{parse_definitions, IdSelector, ReadMode, RecordId};
use entitygraph_store::logging::init_tracing;
use entitygraph_store::{ModelStore, RemovalMode, StoreConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "entitygraph-inspect")]
#[command(about = "Normalize a JSON payload and print shallow or deep reads")]
struct Args {
    /// JSON file holding an array of `{ name, idAttr, fields }` definitions
    #[arg(long)]
    schema: PathBuf,

    /// JSON file with an object or array of objects to write into `--model`
    #[arg(long)]
    payload: Option<PathBuf>,

    /// Model to write into and read from
    #[arg(long)]
    model: String,

    /// Ids to read; defaults to every live record of the model
    #[arg(long, value_delimiter = ',')]
    ids: Vec<String>,

    /// Ids to remove after writing and before reading
    #[arg(long, value_delimiter = ',')]
    remove: Vec<String>,

    /// Hydrate relations instead of printing ids
    #[arg(long)]
    deep: bool,

    /// What removal leaves behind
    #[arg(long, value_enum, default_value_t = RemovalMode::Tombstone)]
    removal: RemovalMode,

    /// Tracing filter directive
    #[arg(long, env = "ENTITYGRAPH_LOG", default_value = "warn")]
    log: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log, args.json_logs)?;

    let schema_text = std::fs::read_to_string(&args.schema)
        .with_context(|| format!("failed to read {}", args.schema.display()))?;
    let definitions = parse_definitions(&schema_text).context("invalid schema")?;

    let store = ModelStore::new(StoreConfig {
        removal: args.removal,
        ..StoreConfig::default()
    });
    store
        .register_all(definitions)
        .context("failed to register models")?;
    let model = store
        .model(&args.model)
        .with_context(|| format!("model {} is not in the schema", args.model))?;

    if let Some(path) = &args.payload {
        let payload = read_json(path)?;
        let written = model.write_json(&payload).context("write failed")?;
        info!(model = %args.model, ids = ?written.ids(), "payload written");
    }

    if !args.remove.is_empty() {
        let ids: Vec<RecordId> = args.remove.iter().map(|id| RecordId::from(id.as_str())).collect();
        model.remove(ids).context("remove failed")?;
    }

    let ids: Vec<RecordId> = if args.ids.is_empty() {
        model.table()?.table.ids()
    } else {
        args.ids.iter().map(|id| RecordId::from(id.as_str())).collect()
    };
    if ids.is_empty() {
        bail!("model {} holds no records to read", args.model);
    }

    let mode = if args.deep { ReadMode::Deep } else { ReadMode::Shallow };
    let result = store
        .read(&args.model, IdSelector::Many(ids), mode)
        .context("read failed")?;
    println!("{}", serde_json::to_string_pretty(&result.to_json())?);
    Ok(())
}
