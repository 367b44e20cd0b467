//! bomenrich CLI, a BOM spreadsheet enrichment tool.
//!
//! Normalizes component descriptions to the house canonical form and
//! attaches vendor source links found through web-search lookups.

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
