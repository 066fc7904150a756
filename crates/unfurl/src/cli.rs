use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use unfurl_archive::{ExtractEvent, ExtractOptions};
use unfurl_fetch::FetchOptions;

use crate::pipeline::DEFAULT_BUFFER_CHUNKS;

pub const DEFAULT_TARGET: &str = "latest";

#[derive(Clone, Debug, Parser)]
#[command(
    name = "unfurl",
    version = env!("CARGO_PKG_VERSION"),
    about = "Stream a .tar.gz archive from a URL and install it into a directory",
    long_about = None
)]
pub struct Args {
    /// Archive URL
    #[arg(env = "UNFURL_URL")]
    pub url: String,

    /// Directory to install into; its previous contents are replaced
    #[arg(short, long, env = "UNFURL_TARGET", default_value = DEFAULT_TARGET)]
    pub target: PathBuf,

    /// Leading path segments to drop from every archive entry
    #[arg(short = 's', long, env = "UNFURL_STRIP_COMPONENTS", default_value_t = 0)]
    pub strip_components: usize,

    /// Delete partially extracted files when the transfer fails
    #[arg(long, env = "UNFURL_REMOVE_ON_FAIL")]
    pub remove_on_fail: bool,

    /// Give up when the download takes longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Extra request header, repeatable
    #[arg(long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Downloaded chunks held in memory ahead of the extractor
    #[arg(long, value_name = "N", default_value_t = DEFAULT_BUFFER_CHUNKS)]
    pub buffer_chunks: usize,

    /// Do not print a line per extracted file
    #[arg(short, long)]
    pub quiet: bool,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn fetch_options(&self) -> FetchOptions {
        let mut options = FetchOptions::default().headers(self.headers.iter().cloned());
        if let Some(secs) = self.timeout {
            options = options.timeout(Duration::from_secs(secs));
        }
        options
    }

    pub fn extract_options(&self) -> ExtractOptions {
        let options = ExtractOptions::default()
            .strip_components(self.strip_components)
            .remove_on_fail(self.remove_on_fail);
        if self.quiet {
            return options;
        }
        options.on_event(Arc::new(print_event))
    }
}

fn print_event(event: &ExtractEvent) {
    match event {
        ExtractEvent::FileWritten { path, bytes } => {
            println!("Wrote {bytes} bytes to file \"{}\"", path.display());
        }
        ExtractEvent::RolledBack { path } => {
            println!(
                "{}",
                console::style(format!(
                    "Removed already extracted files of partially downloaded archive in \"{}\"",
                    path.display()
                ))
                .yellow()
            );
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing header name in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
