use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use codegenesis_core::config::{Config, LoggingConfig};
use codegenesis_preview::{PreviewFile, PreviewOptions, assemble};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "codegenesis",
    about = "CodeGenesis gateway and preview sandbox tooling",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on (default: 3000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Assemble a preview document from a directory of project files
    Preview {
        /// Directory holding index.html and friends
        dir: PathBuf,

        /// Inject the visual-edit probe
        #[arg(long)]
        visual_edit: bool,

        /// Write the document here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show configuration summary and whether a gateway is answering
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// Check the configuration for problems
    Validate,
}

/// Build the log filter: `RUST_LOG` wins, then `--verbose`, then the config.
fn log_filter(logging: Option<&LoggingConfig>, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if verbose {
        "debug".to_string()
    } else {
        logging
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };
    let mut directives = vec![level];
    if let Some(logging) = logging {
        directives.extend(logging.filters.iter().cloned());
    }
    EnvFilter::new(directives.join(","))
}

fn init_logging(logging: Option<&LoggingConfig>, verbose: bool) {
    let filter = log_filter(logging, verbose);
    let json = logging.is_some_and(|l| l.format.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Read every file under `dir`, named by its `/`-separated relative path and
/// sorted so the first `.html`/`.css`/`.js` is stable.
fn collect_files(dir: &Path) -> anyhow::Result<Vec<PreviewFile>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                tracing::debug!(path = %path.display(), "Skipping non-UTF-8 file");
                continue;
            };
            let name = path
                .strip_prefix(dir)?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(PreviewFile::new(name, content));
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Parse a `config set` value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let mut config = Config::load(&config_path)?;

    init_logging(config.logging.as_ref(), cli.verbose);

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.gateway_port());
            let (warnings, errors) = config.validate();
            for w in &warnings {
                tracing::warn!("{w}");
            }
            if !errors.is_empty() {
                anyhow::bail!("Invalid configuration: {}", errors.join("; "));
            }
            tracing::info!(port, config = %config_path.display(), "Starting CodeGenesis gateway");
            let state = codegenesis_gateway::GatewayState::from_config(config)?;
            codegenesis_gateway::start_gateway(Arc::new(state), port).await?;
        }
        Commands::Preview {
            dir,
            visual_edit,
            out,
        } => {
            let files = collect_files(&dir)?;
            let document = assemble(&files, PreviewOptions { visual_edit });
            let html = if document.is_empty() {
                codegenesis_preview::document::default_html()
            } else {
                document.html
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, html)?;
                    tracing::info!(
                        files = files.len(),
                        probe = document.probe_injected,
                        out = %path.display(),
                        "Preview written"
                    );
                }
                None => println!("{html}"),
            }
        }
        Commands::Status => {
            let port = config.gateway_port();
            println!("CodeGenesis v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Gateway: {}:{port}", config.gateway_bind());
            println!("Auth mode: {:?}", config.auth().mode);
            match &config.supabase {
                Some(sb) => println!("Store: supabase ({})", sb.url),
                None => println!("Store: in-memory"),
            }
            match &config.generation {
                Some(g) => println!("Generation: {}", g.endpoint),
                None => println!("Generation: disabled"),
            }

            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()?;
            let running = client
                .get(format!("http://127.0.0.1:{port}/health"))
                .send()
                .await
                .is_ok_and(|r| r.status().is_success());
            println!("Status: {}", if running { "running" } else { "not running" });
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at '{key}'"),
            },
            ConfigAction::Set { key, value } => {
                config.set_path(&key, parse_value(&value))?;
                config.save(&config_path)?;
                tracing::info!(key = %key, path = %config_path.display(), "Config updated");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Configuration OK");
            }
        },
    }

    Ok(())
}
