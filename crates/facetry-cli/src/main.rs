//! Facetry CLI
//!
//! Faceted full-text search from the command line.

#![warn(clippy::all)]
#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use facetry_cli::{Args, commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,facetry=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let output = commands::run(args).await?;
    print!("{output}");
    Ok(())
}
