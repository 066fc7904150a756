use anyhow::{Context, Result};
use clap::Parser;
use unfurl::cli::Args;
use unfurl_fetch::ReqwestClient;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    unfurl::logging::init(args.verbose);

    let client = ReqwestClient::new().context("failed to build HTTP client")?;
    unfurl::app::execute(client, &args).await?;
    Ok(())
}
