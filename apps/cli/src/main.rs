//! merchgen CLI: batch-generate per-team merch designs from league datasets.
//!
//! Reads the league's request and roster datasets, fills a design document
//! once per requested team, and exports each result locally and to the cloud.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
