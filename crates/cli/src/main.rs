//! `specbridge`: list and invoke the tools compiled from one build config.
//!
//! Results go to stdout as JSON; logs go to stderr.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize as _;
use rmcp::model::{ErrorData, JsonObject};
use serde_json::{Value, json};
use specbridge_http_tools::AuthenticatorRegistry;
use specbridge_http_tools::binder::DRY_RUN_ARGUMENT;
use specbridge_spec_tools::{BuildConfig, ToolServer};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "specbridge", version)]
#[command(about = "Compile OpenAPI / Google Discovery documents into callable tools")]
struct Cli {
    /// Build config file (JSON or YAML)
    #[arg(long, env = "SPECBRIDGE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the compiled tools as JSON
    Tools,
    /// Invoke one tool and print the result
    Call {
        /// Tool name as listed by `tools`
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        /// Describe the request instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// List the supported authentication types and their settings
    AuthTypes,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let authenticators = AuthenticatorRegistry::with_builtins();

    match cli.command {
        Command::AuthTypes => {
            print_json(&authenticators.list_available())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Tools => {
            let server = build_server(cli.config.as_deref(), &authenticators).await?;
            let tools: Vec<Value> = server
                .registry()
                .tools()
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.metadata.description,
                        "inputSchema": t.metadata.input_schema,
                        "tags": t.metadata.tags,
                    })
                })
                .collect();
            print_json(&tools)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Call {
            tool,
            args,
            dry_run,
        } => {
            let arguments = parse_arguments(&args, dry_run)?;
            let server = build_server(cli.config.as_deref(), &authenticators).await?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            match server.call_tool(&tool, arguments, &cancel).await {
                Ok(result) => {
                    print_json(&result)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    print_json(&error_json(&e))?;
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

async fn build_server(
    config_path: Option<&Path>,
    authenticators: &AuthenticatorRegistry,
) -> anyhow::Result<ToolServer> {
    let path = config_path.context("--config (or SPECBRIDGE_CONFIG) is required")?;
    let config = BuildConfig::from_file(path)
        .with_context(|| format!("load config {}", path.display()))?;
    ToolServer::from_config(&config, authenticators)
        .await
        .with_context(|| format!("compile tools for '{}'", config.server_name))
}

fn parse_arguments(raw: &str, dry_run: bool) -> anyhow::Result<JsonObject> {
    let mut arguments: JsonObject =
        serde_json::from_str(raw).context("--args must be a JSON object")?;
    if dry_run {
        arguments.insert(DRY_RUN_ARGUMENT.to_string(), Value::Bool(true));
    }
    Ok(arguments)
}

fn error_json(error: &ErrorData) -> Value {
    json!({
        "code": error.code.0,
        "message": error.message,
        "data": error.data,
    })
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}
