//! Lingoflow CLI: translate published blog documents into their missing
//! target languages.
//!
//! Each run can be a single resumable step (`step`), a full translation of
//! one document (`translate`), or a scheduled sweep (`auto`).

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
