use aerarium::cli::Cli;
use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    aerarium::observability::init();
    let cli = Cli::parse();
    cli.run().await
}
