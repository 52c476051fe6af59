//! nzbrelay watches release announcements on IRC, fetches the artifacts,
//! and re-announces them to per-category channels.

mod commands;
mod irc;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // Credentials may come from a local .env file; its absence is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
