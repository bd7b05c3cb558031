use anyhow::Context;
use clap::Parser;
use wx_pipeline::cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run(cli).await.context("wx-pipeline failed")
}
