use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 停止要求を待つ
/// Ctrl+C、SIGTERM、またはトークンのキャンセルのいずれかで返る。
/// シグナルの待ち受けに失敗した場合は、そのシグナルでは返らない
pub async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
        _ = shutdown.cancelled() => info!("Shutdown requested"),
    }
}
