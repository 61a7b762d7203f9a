//! prizefeed binary entrypoint.
//! Loads the source configuration, runs the ingestion pipeline once, and
//! writes the catalog and health report. Exits non-zero only on
//! configuration failure; source failures degrade to empty yields.

use std::path::PathBuf;

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ENV_OUT_DIR: &str = "PRIZEFEED_OUT_DIR";
const ENV_LOG: &str = "PRIZEFEED_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(ENV_LOG)
        .unwrap_or_else(|_| EnvFilter::new("prizefeed=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

struct CliArgs {
    config: Option<PathBuf>,
    out_dir: PathBuf,
}

fn parse_args() -> Result<CliArgs> {
    let mut config = None;
    let mut out_dir = std::env::var(ENV_OUT_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("out"));

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(PathBuf::from(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--config needs a path"))?,
                ));
            }
            "--out-dir" => {
                out_dir = PathBuf::from(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--out-dir needs a path"))?,
                );
            }
            "--help" | "-h" => {
                println!("usage: prizefeed [--config <path>] [--out-dir <path>]");
                std::process::exit(0);
            }
            other => return Err(anyhow::anyhow!("unknown argument {other}")),
        }
    }
    Ok(CliArgs { config, out_dir })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op elsewhere.
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = parse_args()?;
    let cfg = match &args.config {
        Some(path) => prizefeed::Config::load_from(path)?,
        None => prizefeed::Config::load_default()?,
    };
    tracing::info!(
        feeds = cfg.feeds.len(),
        sites = cfg.sites.len(),
        "starting ingestion run"
    );

    let output = prizefeed::run(&cfg).await?;
    prizefeed::write_artifacts(&args.out_dir, &output)?;

    tracing::info!(
        raw = output.health.stages.raw,
        kept = output.health.stages.kept,
        "run finished"
    );
    Ok(())
}
