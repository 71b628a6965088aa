//! The qualcode binary codes a text column of a CSV or JSON file with an LLM.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use qualcode::io::{read_csv, read_json, write_coded, Format};
use qualcode::prelude::*;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug events
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Code one column of a table against a schema
    Code(CodeArgs),
    /// Print the JSON Schema that would be sent to the provider
    Schema {
        /// Schema descriptor or JSON Schema file
        #[arg(long)]
        schema: PathBuf,
    },
}

#[derive(clap::Args)]
struct CodeArgs {
    /// Input table (.csv or .json)
    #[arg(long)]
    input: PathBuf,

    /// Schema descriptor or JSON Schema file
    #[arg(long)]
    schema: PathBuf,

    /// Text column, by name or 0-based index. Prefix with `name:` for a
    /// header that is numeric or contains commas (e.g. `name:2021`)
    #[arg(long, default_value = "0")]
    column: String,

    /// Model identifier
    #[arg(long, default_value = qualcode_chat::DEFAULT_MODEL)]
    model: String,

    /// OpenAI-compatible endpoint
    #[arg(long, default_value = qualcode_chat::DEFAULT_BASE_URL)]
    base_url: String,

    /// System prompt applied to every row
    #[arg(long, conflicts_with = "system_prompt_file")]
    system_prompt: Option<String>,

    /// Read the system prompt from a file
    #[arg(long)]
    system_prompt_file: Option<PathBuf>,

    /// Sampling seed
    #[arg(long)]
    seed: Option<i64>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f64>,

    /// Generation parameter as key=value (value parsed as JSON when possible)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Provider-specific request field as key=value
    #[arg(long = "api-arg", value_name = "KEY=VALUE")]
    api_args: Vec<String>,

    /// Progress output: none, output or all
    #[arg(long, default_value = "none")]
    echo: EchoMode,

    /// Output only the structured results, without the input columns
    #[arg(long)]
    no_source: bool,

    /// Character volume above which confirmation is required
    #[arg(long, default_value_t = qualcode::config::DEFAULT_CHAR_WARNING_THRESHOLD)]
    char_warning_threshold: usize,

    /// Skip the confirmation prompt for large inputs
    #[arg(short, long)]
    yes: bool,

    /// Rows in flight at once
    #[arg(long, default_value_t = 10)]
    max_active: usize,

    /// Attempts per row before failing
    #[arg(long, default_value_t = 3)]
    max_attempts: usize,

    /// Output format: csv or json
    #[arg(long, default_value = "csv")]
    format: Format,

    /// Output file (stdout if omitted)
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, &cli.log_format);

    let result = match cli.command {
        Commands::Code(args) => run_code(args).await,
        Commands::Schema { schema } => run_schema(&schema),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let cancelled = e
                .downcast_ref::<CodingError>()
                .is_some_and(CodingError::is_cancellation);
            if cancelled {
                // An unanswered prompt still holds a blocking thread that
                // dropping the runtime would wait for.
                std::process::exit(130)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(verbose: bool, format: &str) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_code(args: CodeArgs) -> anyhow::Result<()> {
    let table = load_table(&args.input)?;
    let schema = load_schema(&args.schema)?;
    let column = ColumnSelector::parse(&args.column)?;

    let mut model = ModelConfig::new(args.model).with_base_url(args.base_url);
    model.seed = args.seed;
    if let Some(temperature) = args.temperature {
        model = model.with_temperature(temperature);
    }
    for pair in &args.params {
        let (key, value) = parse_pair(pair)?;
        model.params.insert(key, value);
    }
    for pair in &args.api_args {
        let (key, value) = parse_pair(pair)?;
        model.api_args.insert(key, value);
    }

    let system_prompt = match (args.system_prompt, &args.system_prompt_file) {
        (Some(prompt), _) => Some(prompt),
        (None, Some(path)) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("reading system prompt {}", path.display()))?,
        ),
        (None, None) => None,
    };
    let session = SessionConfig {
        system_prompt,
        echo: args.echo,
        max_active: args.max_active,
        max_attempts: args.max_attempts,
    };

    let mut coder = Coder::new(OpenAiChat::new())
        .model(model)
        .session(session)
        .include_source(!args.no_source)
        .char_warning_threshold(args.char_warning_threshold);
    if args.yes {
        coder = coder.confirm(AlwaysAllow);
    }

    let interrupted = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let coded = coder.code_until(table, &schema, column, interrupted).await?;

    match &args.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            write_coded(&coded, args.format, BufWriter::new(file))?;
            tracing::info!(event = "output_written", rows = coded.len(), path = %path.display(), "output_written");
        }
        None => write_coded(&coded, args.format, io::stdout().lock())?,
    }
    Ok(())
}

fn run_schema(path: &Path) -> anyhow::Result<()> {
    let schema = load_schema(path)?;
    println!("{}", serde_json::to_string_pretty(&schema.to_json_schema())?);
    Ok(())
}

fn load_table(path: &Path) -> anyhow::Result<Table> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        read_json(reader)
    } else {
        read_csv(reader)
    }
}

/// Accepts a descriptor (`{"type": "object", "fields": [...]}`) or a JSON
/// Schema document (`{"type": "object", "properties": {...}}`).
fn load_schema(path: &Path) -> anyhow::Result<Schema> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: Value = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let schema: Schema = if value.get("fields").is_some() {
        serde_json::from_value(value).map_err(|e| CodingError::SchemaType(e.to_string()))?
    } else {
        Schema::from_json_schema(&value).map_err(|e| CodingError::SchemaType(e.to_string()))?
    };
    Ok(schema)
}

fn parse_pair(pair: &str) -> anyhow::Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| CodingError::InvalidArgument {
            argument: "param",
            reason: format!("expected KEY=VALUE, got '{pair}'"),
        })?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.trim().to_string(), value))
}
