mod check;
mod serve;
mod settings;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Document circuit workflow engine.
#[derive(Parser)]
#[command(name = "circuit", version, about = "Document circuit workflow engine")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and summarize its circuits
    Check {
        /// Path to the TOML configuration file
        config: PathBuf,
    },

    /// Start the workflow HTTP API server
    Serve {
        /// Path to the TOML configuration file
        #[arg(long)]
        config: PathBuf,
        /// Port to listen on (overrides `[server] port`)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Commands::Check { config } => {
            check::cmd_check(&config, cli.output, cli.quiet);
        }
        Commands::Serve { config, port } => {
            let settings = match settings::read_settings(&config) {
                Ok(s) => s,
                Err(e) => {
                    report_error(&e, cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    let msg = format!("failed to create tokio runtime: {e}");
                    report_error(&msg, cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(settings, port)) {
                report_error(&format!("server error: {e}"), cli.output, cli.quiet);
                process::exit(1);
            }
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`, `warn` with `--quiet`).
fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
