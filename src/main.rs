use anyhow::{anyhow, Context, Result};
use autobuild_runner::config::RunnerConfig;
use autobuild_runner::core::BuildOptions;
use autobuild_runner::{AutoBuildRunner, BuildRunner};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let source_path = args
        .next()
        .ok_or_else(|| anyhow!("usage: autobuild-runner <main.c> [target ...]"))?;
    let mut targets: Vec<String> = args.collect();
    if targets.is_empty() {
        targets.push("native_host".to_string());
    }

    let config = RunnerConfig::from_env();
    info!("Starting autobuild runner (work root {})", config.work_root.display());

    let source = tokio::fs::read(&source_path)
        .await
        .with_context(|| format!("failed to read {}", source_path))?;

    let runner = AutoBuildRunner::new(config).await?;
    let summary = match runner.submit(&source, &targets, BuildOptions::default()).await {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(report) = e.report() {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
            return Err(e.into());
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !summary.report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
