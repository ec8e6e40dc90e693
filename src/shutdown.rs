//! Graceful shutdown coordinator.
//!
//! Listens for SIGINT (Ctrl+C), SIGTERM, and SIGHUP, then cancels a
//! [`tokio_util::sync::CancellationToken`] so the sync run stops starting new
//! check-ins and aborts in-flight requests. A second signal force-exits.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal forces an immediate exit.
const FORCE_EXIT_CODE: i32 = 130;

/// Install signal handlers and return a [`CancellationToken`] that is
/// cancelled on the first SIGINT / SIGTERM / SIGHUP.
pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let (mut sigterm, mut sighup) = {
            use tokio::signal::unix::{signal, SignalKind};
            match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
                (Ok(term), Ok(hup)) => (term, hup),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!("Failed to register SIGTERM/SIGHUP handlers, only Ctrl+C will stop the run: {}", e);
                    wait_for_ctrl_c(&handler_token, &count).await;
                    return;
                }
            }
        };

        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                    _ = sighup.recv() => {}
                }
            }

            #[cfg(not(unix))]
            {
                if tokio::signal::ctrl_c().await.is_err() {
                    tracing::warn!("Failed to listen for Ctrl+C");
                    return;
                }
            }

            on_signal(&handler_token, &count);
        }
    });

    token
}

#[cfg(unix)]
async fn wait_for_ctrl_c(token: &CancellationToken, count: &AtomicU32) {
    while tokio::signal::ctrl_c().await.is_ok() {
        on_signal(token, count);
    }
}

fn on_signal(token: &CancellationToken, count: &AtomicU32) {
    let prev = count.fetch_add(1, Ordering::SeqCst);
    if prev == 0 {
        tracing::info!("Received shutdown signal, cancelling in-flight checkins...");
        tracing::info!("Press Ctrl+C again to force exit");
        token.cancel();
    } else {
        tracing::warn!("Force exit requested");
        std::process::exit(FORCE_EXIT_CODE);
    }
}
