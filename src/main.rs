//! shared-gateway command line entry point.
//!
//! Reads a deployment template, reconciles it against the shared gateway and
//! writes the patched template.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use shared_gateway::admin::{GatewayAdmin, HttpGatewayAdmin, InMemoryGatewayAdmin};
use shared_gateway::config::{LogFormat, ReconcileConfig};
use shared_gateway::domain::Template;
use shared_gateway::error::ReconcileError;
use shared_gateway::service::ReconcileSession;

/// Retarget a deployment template at a shared API gateway.
#[derive(Debug, Parser)]
#[command(name = "shared-gateway", version, about)]
struct Cli {
    /// Template to reconcile.
    #[arg(long, short)]
    template: PathBuf,

    /// Where to write the patched template; overwrites the input if omitted.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Live state snapshot to reconcile against instead of the
    /// administration API.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Where to write the JSON run report.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ReconcileConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::default());
            tracing::error!(code = e.error_code(), "{e}");
            return ExitCode::from(e.exit_code());
        }
    };
    init_tracing(config.log_format);

    match run(cli, config).await {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => match e.downcast_ref::<ReconcileError>() {
            Some(reconcile) => {
                tracing::error!(code = reconcile.error_code(), "{e:#}");
                ExitCode::from(reconcile.exit_code())
            }
            None => {
                tracing::error!("{e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli, config: ReconcileConfig) -> anyhow::Result<String> {
    let text = tokio::fs::read_to_string(&cli.template)
        .await
        .with_context(|| format!("reading template {}", cli.template.display()))?;
    let template = Template::from_json_str(&text)?;

    let admin: Arc<dyn GatewayAdmin> = match &cli.snapshot {
        Some(path) => {
            let snapshot = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading snapshot {}", path.display()))?;
            Arc::new(InMemoryGatewayAdmin::from_json_str(&snapshot)?)
        }
        None => Arc::new(HttpGatewayAdmin::new(&config.admin)?),
    };

    let mut session = ReconcileSession::new(admin, config);
    let reconciliation = session.run(&template).await?;

    let output = cli.output.as_ref().unwrap_or(&cli.template);
    tokio::fs::write(output, reconciliation.template.to_json_pretty()?)
        .await
        .with_context(|| format!("writing template {}", output.display()))?;
    tracing::info!(path = %output.display(), "wrote reconciled template");

    if let Some(path) = &cli.report {
        let report = serde_json::to_string_pretty(&reconciliation.report)?;
        tokio::fs::write(path, report)
            .await
            .with_context(|| format!("writing report {}", path.display()))?;
    }

    Ok(reconciliation.report.summary())
}
