use std::path::PathBuf;

use tokio::task::JoinHandle;
use tracing::warn;

/// On SIGINT or SIGTERM, delete `staging` and exit with status 1.
///
/// Abort the returned handle once the staging directory has been
/// committed or discarded.
pub fn spawn_cleanup_on_signal(staging: PathBuf) -> JoinHandle<()> {
    tokio::spawn(async move {
        terminated().await;
        eprintln!(
            "{}",
            console::style(format!(
                "Received termination signal, deleting temporary directory \"{}\"",
                staging.display()
            ))
            .red()
        );
        if let Err(e) = unfurl_fs::remove_tree(&staging) {
            warn!(path = %staging.display(), error = %e, "failed to delete staging directory");
        }
        std::process::exit(1);
    })
}

async fn terminated() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = interrupted() => {}
                    Some(()) = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                interrupted().await;
            }
        }
    }

    #[cfg(not(unix))]
    interrupted().await;
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for interrupts");
        std::future::pending::<()>().await;
    }
}
