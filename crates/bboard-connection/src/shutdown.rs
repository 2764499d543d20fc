//! Signal-driven shutdown

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::ConnectionManager;

/// Resolves when the process receives Ctrl+C or SIGTERM.
///
/// If a handler can't be installed the error is logged and that signal is
/// never observed; the other one still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, starting shutdown");
        }
    }
}

/// Shut the manager's pool down when Ctrl+C or SIGTERM arrives
pub fn spawn_shutdown_on_signal(manager: Arc<ConnectionManager>) -> JoinHandle<()> {
    spawn_shutdown_on(manager, shutdown_signal())
}

/// Shut the manager's pool down once `trigger` resolves
pub fn spawn_shutdown_on<F>(manager: Arc<ConnectionManager>, trigger: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        trigger.await;
        manager.shutdown().await;
    })
}
