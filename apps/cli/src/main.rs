//! orgscout CLI: schema-driven organization profiling.
//!
//! Searches the web for each entity's schema fields, extracts structured
//! values from the pages found, and merges them into one validated record
//! per entity per run.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
