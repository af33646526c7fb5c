/// workloadctl - create, delete and scale Kubernetes workloads
///
/// Talks to the API server's apps/v1 REST endpoints directly. Settings come from
/// an optional JSON/YAML config file and the process environment, with the file
/// taking precedence.
mod config;
mod error;
mod k8s;
mod loader;
mod mode;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Settings;
use crate::mode::Report;

#[derive(Parser)]
#[command(name = "workloadctl")]
#[command(
    about = "Create, delete or scale a Deployment or StatefulSet via the Kubernetes API",
    long_about = "Settings are read from a config file and the environment: K8S_API, NAMESPACE, \
MODE (create|delete|scale), BEARER_TOKEN, RESOURCE_URI (create), RESOURCE_NAME (delete/scale), \
SCALE_COUNT (scale), INSECURE_SKIP_TLS_VERIFY, REQUEST_TIMEOUT_SECS."
)]
struct Cli {
    /// Config file path or http(s) URL (overrides CONFIG_JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing on stderr; stdout carries only the result line
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("workloadctl={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match execute(&cli).await {
        Ok(report) => {
            println!("{}", report.line());
            std::process::exit(report.exit_code());
        }
        Err(e) => {
            // Written directly so RUST_LOG cannot hide the terminal line
            eprintln!("{}", fatal_line(&e));
            std::process::exit(1);
        }
    }
}

async fn execute(cli: &Cli) -> Result<Report> {
    let settings = Settings::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;

    Ok(mode::run(&settings).await?)
}

fn fatal_line(e: &anyhow::Error) -> String {
    format!("Error: {:#}", e)
}
