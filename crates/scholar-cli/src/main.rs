//! Scholar CLI - runs one dashboard request against the configured backends
//!
//! Connection settings come from the environment (see `DashboardConfig`);
//! the response is printed as JSON for the rendering layer.

mod commands;

use clap::{Parser, Subcommand};
use commands::{RequestCommand, StatusCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SCHOLAR_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "SCHOLAR_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the connection state of every backend
    Status(StatusCommand),
    /// Run a dashboard request
    #[command(flatten)]
    Request(RequestCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // If RUST_LOG is set, use it as-is; otherwise every scholar crate logs
    // at the requested level and the drivers at warn
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "scholar_cli={level},\
             scholar_dashboard={level},\
             scholar_query={level},\
             scholar_query_postgres={level},\
             scholar_query_mongodb={level},\
             scholar_query_neo4j={level},\
             tokio_postgres=warn,\
             mongodb=warn,\
             neo4rs=warn",
            level = cli.log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Status(status_cmd) => status_cmd.execute(),
        Commands::Request(request_cmd) => request_cmd.execute(),
    }
}
