#![forbid(unsafe_code)]

use cm_core::{BoundingBox, DirectiveSpec, EntityId, ShapeQuery};
use cm_storage::{BatchMode, SqliteStore, StoreConfig, SubmitChangesetRequest};
use serde_json::Value;
use std::io::Read as _;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_STORAGE_DIR: &str = ".chronomap";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Data,
    Nodes,
    Geometry,
}

#[derive(Debug, PartialEq)]
enum Command {
    /// `input` is a path, or `-` for stdin.
    Apply { input: String, id: Option<String> },
    Changeset { id: String },
    Shape { id: EntityId },
    Query { view: View, query: ShapeQuery },
}

#[derive(Debug, PartialEq)]
struct CliArgs {
    storage_dir: Option<PathBuf>,
    busy_timeout_ms: Option<u64>,
    batch_mode: Option<BatchMode>,
    command: Command,
}

fn usage() -> &'static str {
    "chronomap: apply directive changesets and query historical shapes\n\n\
USAGE:\n\
  chronomap [GLOBAL] apply FILE [--id ID]\n\
  chronomap [GLOBAL] changeset ID\n\
  chronomap [GLOBAL] shape ID\n\
  chronomap [GLOBAL] data|nodes|geometry SELECTOR [--types IDS] [--bbox W,S,E,N]\n\n\
GLOBAL:\n\
  --storage-dir DIR      (CHRONOMAP_STORAGE_DIR, default .chronomap)\n\
  --busy-timeout-ms MS   (CHRONOMAP_BUSY_TIMEOUT_MS)\n\
  --batch-mode MODE      isolated | all_or_nothing (CHRONOMAP_BATCH_MODE)\n\n\
SELECTOR (exactly one):\n\
  --ids IDS | --changeset ID | --period ID | --year YEAR\n\n\
NOTES:\n\
  - FILE holds a JSON array of directives or an object {\"id\", \"directives\"}; `-` reads stdin.\n\
  - Submitting an existing changeset id replaces its stored directive list only.\n\
  - Results are printed as JSON on stdout; logs go to stderr (RUST_LOG).\n"
}

fn parse_id_list(flag: &str, raw: &str) -> Result<Vec<EntityId>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<EntityId>()
                .map_err(|_| format!("{flag} expects comma-separated integer ids, got `{part}`"))
        })
        .collect()
}

fn parse_bbox(raw: &str) -> Result<BoundingBox, String> {
    let parts = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| "--bbox expects four numbers: WEST,SOUTH,EAST,NORTH".to_string())?;
    let &[west, south, east, north] = parts.as_slice() else {
        return Err("--bbox expects four numbers: WEST,SOUTH,EAST,NORTH".to_string());
    };
    Ok(BoundingBox {
        west,
        south,
        east,
        north,
    })
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut storage_dir: Option<PathBuf> = None;
    let mut busy_timeout_ms: Option<u64> = None;
    let mut batch_mode: Option<BatchMode> = None;
    let mut changeset_flag: Option<String> = None;
    let mut query = ShapeQuery::default();
    let mut query_flag: Option<&'static str> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 0usize;
    while i < args.len() {
        let a = args[i].as_str();
        match a {
            "--storage-dir" => {
                i += 1;
                let v = args.get(i).ok_or("--storage-dir requires DIR")?;
                storage_dir = Some(PathBuf::from(v));
            }
            "--busy-timeout-ms" => {
                i += 1;
                let v = args.get(i).ok_or("--busy-timeout-ms requires MS")?;
                busy_timeout_ms = Some(
                    v.parse::<u64>()
                        .map_err(|_| "--busy-timeout-ms must be an integer (milliseconds)")?,
                );
            }
            "--batch-mode" => {
                i += 1;
                let v = args.get(i).ok_or("--batch-mode requires MODE")?;
                batch_mode = Some(
                    BatchMode::parse(v)
                        .ok_or("--batch-mode must be isolated or all_or_nothing")?,
                );
            }
            "--id" => {
                i += 1;
                let v = args.get(i).ok_or("--id requires ID")?;
                changeset_flag = Some(v.to_string());
            }
            "--ids" => {
                i += 1;
                let v = args.get(i).ok_or("--ids requires IDS")?;
                query.ids = Some(parse_id_list("--ids", v)?);
                query_flag.get_or_insert("--ids");
            }
            "--changeset" => {
                i += 1;
                let v = args.get(i).ok_or("--changeset requires ID")?;
                query.changeset = Some(v.to_string());
                query_flag.get_or_insert("--changeset");
            }
            "--period" => {
                i += 1;
                let v = args.get(i).ok_or("--period requires ID")?;
                query.period = Some(
                    v.parse::<EntityId>()
                        .map_err(|_| "--period must be an integer id")?,
                );
                query_flag.get_or_insert("--period");
            }
            "--year" => {
                i += 1;
                let v = args.get(i).ok_or("--year requires YEAR")?;
                query.year = Some(v.parse::<i32>().map_err(|_| "--year must be an integer")?);
                query_flag.get_or_insert("--year");
            }
            "--types" => {
                i += 1;
                let v = args.get(i).ok_or("--types requires IDS")?;
                query.types = Some(parse_id_list("--types", v)?);
                query_flag.get_or_insert("--types");
            }
            "--bbox" => {
                i += 1;
                let v = args.get(i).ok_or("--bbox requires WEST,SOUTH,EAST,NORTH")?;
                query.bbox = Some(parse_bbox(v)?);
                query_flag.get_or_insert("--bbox");
            }
            other if other.starts_with("--") || (other.starts_with('-') && other != "-") => {
                return Err(format!("Unknown arg: {other}\n\n{}", usage()));
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let name = positional
        .next()
        .ok_or_else(|| format!("Missing command\n\n{}", usage()))?;
    let operand = positional.next();
    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {extra}\n\n{}", usage()));
    }

    let view = match name.as_str() {
        "data" => Some(View::Data),
        "nodes" => Some(View::Nodes),
        "geometry" => Some(View::Geometry),
        _ => None,
    };
    if let Some(flag) = query_flag.filter(|_| view.is_none()) {
        return Err(format!("{flag} only applies to data, nodes or geometry"));
    }
    if changeset_flag.is_some() && name != "apply" {
        return Err("--id only applies to apply".to_string());
    }

    let command = match (name.as_str(), view) {
        (_, Some(view)) => {
            if let Some(extra) = operand {
                return Err(format!("Unexpected argument: {extra}\n\n{}", usage()));
            }
            query.selector().map_err(|e| e.to_string())?;
            Command::Query { view, query }
        }
        ("apply", None) => Command::Apply {
            input: operand.ok_or("apply requires FILE (or - for stdin)")?,
            id: changeset_flag,
        },
        ("changeset", None) => Command::Changeset {
            id: operand.ok_or("changeset requires ID")?,
        },
        ("shape", None) => Command::Shape {
            id: operand
                .ok_or("shape requires ID")?
                .parse::<EntityId>()
                .map_err(|_| "shape ID must be an integer")?,
        },
        (other, None) => return Err(format!("Unknown command: {other}\n\n{}", usage())),
    };

    Ok(CliArgs {
        storage_dir,
        busy_timeout_ms,
        batch_mode,
        command,
    })
}

/// Environment first, flags last.
fn store_config(cli: &CliArgs) -> StoreConfig {
    let mut config = StoreConfig::from_env(DEFAULT_STORAGE_DIR);
    if let Some(dir) = &cli.storage_dir {
        config.storage_dir = dir.clone();
    }
    if let Some(ms) = cli.busy_timeout_ms {
        config = config.with_busy_timeout(Duration::from_millis(ms));
    }
    if let Some(mode) = cli.batch_mode {
        config = config.with_batch_mode(mode);
    }
    config
}

/// A bare array is a batch without an id; `--id` wins over an id in the body.
fn parse_submission(text: &str, id: Option<String>) -> Result<SubmitChangesetRequest, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| format!("invalid changeset JSON: {e}"))?;
    let mut request = match value {
        Value::Array(_) => SubmitChangesetRequest {
            id: None,
            directives: Some(
                serde_json::from_value::<Vec<DirectiveSpec>>(value)
                    .map_err(|e| format!("invalid directive list: {e}"))?,
            ),
        },
        Value::Object(_) => serde_json::from_value::<SubmitChangesetRequest>(value)
            .map_err(|e| format!("invalid changeset object: {e}"))?,
        _ => {
            return Err(
                "changeset input must be a JSON array of directives or an object with `directives`"
                    .to_string(),
            );
        }
    };
    if id.is_some() {
        request.id = id;
    }
    Ok(request)
}

fn read_input(input: &str) -> Result<String, String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| format!("read stdin: {e}"))?;
        return Ok(text);
    }
    std::fs::read_to_string(input).map_err(|e| format!("read {input}: {e}"))
}

fn run(cli: CliArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = store_config(&cli);
    tracing::debug!(storage_dir = %config.storage_dir.display(), batch_mode = %config.batch_mode, "opening store");
    let mut store = SqliteStore::open_with(config)?;

    let value = match cli.command {
        Command::Apply { input, id } => {
            let request = parse_submission(&read_input(&input)?, id)?;
            serde_json::to_value(store.changeset_submit(request)?)?
        }
        Command::Changeset { id } => match store.changeset_get(&id)? {
            Some(changeset) => serde_json::to_value(changeset)?,
            None => return Err(format!("changeset {id} not found").into()),
        },
        Command::Shape { id } => match store.shape_get(id)? {
            Some(shape) => serde_json::to_value(shape)?,
            None => return Err(format!("shape {id} not found").into()),
        },
        Command::Query { view, query } => match view {
            View::Data => serde_json::to_value(store.shape_data(&query)?)?,
            View::Nodes => serde_json::to_value(store.shape_nodes(&query)?)?,
            View::Geometry => serde_json::to_value(store.shape_geometry(&query)?)?,
        },
    };
    Ok(value)
}

fn main() {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print!("{}", usage());
        std::process::exit(0);
    }
    let cli = parse_args(&args).unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(2);
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests;
