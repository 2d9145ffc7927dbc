mod cli;
mod export;

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use regex::Regex;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use opcua_harvester::{
    HarvestError, NodeIdParseError, SourceConfig, TagNodeId, harvest_endpoint, status_hint,
};

use crate::cli::Args;
use crate::export::{ExportError, ExportMeta, Layout, export};

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Harvest(#[from] HarvestError),
    #[error(transparent)]
    BadNode(#[from] NodeIdParseError),
    #[error("invalid filter pattern: {0}")]
    BadFilter(#[from] regex::Error),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl AppError {
    /// 1 for anything that prevented a harvest, 2 for a failed export.
    fn exit_code(&self) -> u8 {
        match self {
            Self::Export(_) => 2,
            Self::Harvest(_) | Self::BadNode(_) | Self::BadFilter(_) => 1,
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Harvest(err) => status_hint(&err.to_string()),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            if let Some(hint) = err.hint() {
                eprintln!("Hint: {hint}");
            }
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(args: &Args) -> Result<(), AppError> {
    let started = Instant::now();

    let root: TagNodeId = args.node.parse()?;
    let filter = Regex::new(&args.filter)?;
    let config = SourceConfig {
        endpoint: args.endpoint.clone(),
        timeout: args.timeout(),
    };

    let report = harvest_endpoint(&config, &root, &filter).await?;
    tracing::info!(
        discovered = report.discovered,
        matched = report.matched,
        read = report.records.len(),
        failed = report.failed.len(),
        "harvest complete"
    );

    if report.records.is_empty() {
        tracing::warn!("no tags read, skipping export");
    } else {
        let meta = ExportMeta {
            endpoint: &args.endpoint,
            filter: &args.filter,
        };
        export(
            &report.records,
            &args.file,
            meta,
            Layout::with_order(args.column_order),
        )?;
    }

    println!("Tags items: {}", report.records.len());
    println!("Full time: {} sec", started.elapsed().as_secs());
    Ok(())
}
