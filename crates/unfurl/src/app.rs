use anyhow::{Context, Result};
use tracing::{info, warn};
use unfurl_fetch::{Fetcher, HttpClient};
use unfurl_fs::{InstallOutcome, InstallPlan};

use crate::cli::Args;
use crate::pipeline::DownloadExtractor;
use crate::signal::spawn_cleanup_on_signal;

/// Download, unpack and install the archive described by `args`.
pub async fn execute<C: HttpClient + 'static>(client: C, args: &Args) -> Result<InstallOutcome> {
    let plan = InstallPlan::for_target(&args.target)
        .with_context(|| format!("invalid target directory {}", args.target.display()))?;

    let stale = unfurl_fs::remove_tree(plan.staging()).with_context(|| {
        format!(
            "failed to clear staging directory {}",
            plan.staging().display()
        )
    })?;
    if stale {
        warn!(path = %plan.staging().display(), "removed leftover staging directory");
    }

    let cleanup = spawn_cleanup_on_signal(plan.staging().to_path_buf());
    let result = download_and_install(client, args, &plan).await;
    cleanup.abort();
    result
}

async fn download_and_install<C: HttpClient + 'static>(
    client: C,
    args: &Args,
    plan: &InstallPlan,
) -> Result<InstallOutcome> {
    if !args.quiet {
        println!("Downloading archive file from \"{}\"", args.url);
    }

    let fetcher = Fetcher::new(client).with_options(args.fetch_options());
    let report = DownloadExtractor::new(fetcher, &args.url, plan.staging())
        .extract_options(args.extract_options())
        .buffer_chunks(args.buffer_chunks)
        .run()
        .await
        .with_context(|| format!("failed to unpack {}", args.url))?;
    info!(
        files = report.files(),
        directories = report.directories(),
        skipped = report.skipped,
        "staging complete"
    );

    match unfurl_fs::install(plan) {
        Ok(outcome) => {
            if outcome == (InstallOutcome::Replaced { backup_removed: true }) && !args.quiet {
                println!("Deleted old directory \"{}\"", plan.backup().display());
            }
            Ok(outcome)
        }
        Err(err) => {
            if let Some(path) = err.at_risk_path() {
                eprintln!(
                    "{}",
                    console::style(format!(
                        "WARNING: the previous contents of \"{}\" are now only at \"{}\"; \
                         move them back manually",
                        plan.target().display(),
                        path.display()
                    ))
                    .red()
                    .bold()
                );
            }
            Err(anyhow::Error::new(err)
                .context(format!("failed to install into {}", plan.target().display())))
        }
    }
}
