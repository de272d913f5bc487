use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use fieldflow_config::{EngineConfig, FieldValues, FormDef};
use fieldflow_loader::HttpDataLoader;
use fieldflow_runtime::FetchSession;
use fieldflow_schema::{FieldRegistry, Visibility};
use fieldflow_state::FormState;

/// Fieldflow - dependent option loading for configuration forms
#[derive(Parser)]
#[command(name = "fieldflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the engine config file (default: ~/.fieldflow/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a form schema and print its dependency tree
  Check {
    /// Path to the form schema (JSON)
    schema_file: PathBuf,
  },

  /// Print the fields visible for a set of values
  Visible {
    /// Path to the form schema (JSON)
    schema_file: PathBuf,

    /// Field values as a JSON object (default: stdin, or none)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Active UI tab (fields restricted to a tab are hidden unless it is active)
    #[arg(long)]
    tab: Option<String>,
  },

  /// Open a session against the integrations API and print what it loads
  Fetch {
    /// Path to the form schema (JSON)
    schema_file: PathBuf,

    /// Base URL of the integrations API
    #[arg(long)]
    base_url: String,

    /// Integration the options are loaded for
    #[arg(long)]
    integration: String,

    /// Bearer API key
    #[arg(long)]
    api_key: Option<String>,

    /// Field assignment applied in order, e.g. `--set server=S1`.
    /// Values are parsed as JSON, falling back to a plain string.
    #[arg(long = "set", value_parser = parse_assignment)]
    assignments: Vec<(String, serde_json::Value)>,
  },
}

fn main() -> Result<()> {
  init_logging();
  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Check { schema_file }) => check(&schema_file)?,
    Some(Commands::Visible {
      schema_file,
      state,
      tab,
    }) => visible(&schema_file, state.as_deref(), tab)?,
    Some(Commands::Fetch {
      schema_file,
      base_url,
      integration,
      api_key,
      assignments,
    }) => {
      let config = load_config(cli.config.as_deref())?;
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async {
        fetch(
          &schema_file,
          config,
          &base_url,
          integration,
          api_key,
          assignments,
        )
        .await
      })?;
    }
    None => {
      println!("fieldflow - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_logging() {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fieldflow=info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

fn check(schema_file: &Path) -> Result<()> {
  let registry = load_registry(schema_file)?;

  eprintln!(
    "Schema OK: {} ({} fields)",
    registry.node_type(),
    registry.len()
  );
  for root in registry.graph().roots() {
    print_tree(&registry, root, 0);
  }

  Ok(())
}

fn print_tree(registry: &FieldRegistry, name: &str, depth: usize) {
  let source = registry
    .get(name)
    .and_then(|f| f.dynamic_source.as_deref())
    .map(|s| format!(" <- {}", s))
    .unwrap_or_default();
  println!("{}{}{}", "  ".repeat(depth), name, source);

  for child in registry.graph().dependents(name) {
    print_tree(registry, child, depth + 1);
  }
}

fn visible(schema_file: &Path, state_file: Option<&Path>, tab: Option<String>) -> Result<()> {
  let registry = load_registry(schema_file)?;

  let values = match state_file {
    Some(path) => {
      let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state file: {}", path.display()))?;
      parse_values(&content)
        .with_context(|| format!("failed to parse state file: {}", path.display()))?
    }
    None => read_values_from_stdin()?,
  };

  let mut state = FormState::new();
  state.load_initial("cli", values);
  let defaulted = state.apply_defaults(&registry);
  if !defaulted.is_empty() {
    eprintln!("Defaults applied: {}", defaulted.join(", "));
  }

  let mut visibility = Visibility::new();
  visibility.set_active_tab(tab);

  let names: Vec<&str> = visibility
    .visible_fields(&registry, state.values())
    .into_iter()
    .map(|f| f.name.as_str())
    .collect();

  println!("{}", serde_json::to_string_pretty(&names)?);
  Ok(())
}

async fn fetch(
  schema_file: &Path,
  config: EngineConfig,
  base_url: &str,
  integration: String,
  api_key: Option<String>,
  assignments: Vec<(String, serde_json::Value)>,
) -> Result<()> {
  let registry = load_registry(schema_file)?;

  let mut loader =
    HttpDataLoader::new(base_url).with_context(|| format!("invalid base URL: {}", base_url))?;
  if let Some(key) = api_key {
    loader = loader.with_api_key(key);
  }
  eprintln!("Loading from: {}", loader.endpoint());

  let session = FetchSession::builder(registry, Arc::new(loader))
    .config(config)
    .integration_id(integration)
    .open();
  session.wait_idle().await;

  for (field, value) in assignments {
    eprintln!("Setting {} = {}", field, value);
    session
      .set_value(&field, value)
      .with_context(|| format!("failed to set '{}'", field))?;
    session.wait_idle().await;
  }

  let snapshot = session.snapshot();
  for (field, error) in &snapshot.errors {
    warn!(field = %field, kind = ?error.kind, detail = %error.detail, "field has an error");
  }
  println!("{}", serde_json::to_string_pretty(&snapshot)?);

  session.close();
  Ok(())
}

fn load_registry(schema_file: &Path) -> Result<FieldRegistry> {
  let content = std::fs::read_to_string(schema_file)
    .with_context(|| format!("failed to read schema file: {}", schema_file.display()))?;

  let form = FormDef::from_json(&content)
    .with_context(|| format!("failed to parse schema file: {}", schema_file.display()))?;

  FieldRegistry::new(form)
    .with_context(|| format!("invalid form schema: {}", schema_file.display()))
}

/// Explicit `--config`, then `~/.fieldflow/config.json`, then defaults.
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
  if let Some(path) = path {
    return EngineConfig::from_file(path)
      .with_context(|| format!("failed to load config file: {}", path.display()));
  }

  match dirs::home_dir().map(|home| home.join(".fieldflow").join("config.json")) {
    Some(path) if path.exists() => EngineConfig::from_file(&path)
      .with_context(|| format!("failed to load config file: {}", path.display())),
    _ => Ok(EngineConfig::default()),
  }
}

fn parse_assignment(raw: &str) -> Result<(String, serde_json::Value)> {
  let Some((field, value)) = raw.split_once('=') else {
    bail!("expected field=value, got '{}'", raw);
  };
  if field.is_empty() {
    bail!("missing field name in '{}'", raw);
  }
  let value = serde_json::from_str(value)
    .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
  Ok((field.to_string(), value))
}

fn parse_values(content: &str) -> Result<FieldValues> {
  match serde_json::from_str::<serde_json::Value>(content)? {
    serde_json::Value::Object(values) => Ok(values),
    other => bail!("expected a JSON object of field values, got {}", other),
  }
}

fn read_values_from_stdin() -> Result<FieldValues> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, no values
    Ok(FieldValues::new())
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read field values from stdin")?;

    if input.trim().is_empty() {
      Ok(FieldValues::new())
    } else {
      parse_values(&input).context("failed to parse field values from stdin")
    }
  }
}
