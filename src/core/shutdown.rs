use std::future::Future;

use tokio::signal;
use tokio::sync::watch;

/// Process-wide stop flag shared by the HTTP server and background loops.
#[derive(Clone)]
pub(crate) struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Flips once SIGINT or SIGTERM arrives.
    pub(crate) fn on_signal() -> Self {
        let (tx, shutdown) = Self::manual();
        tokio::spawn(async move {
            wait_for_signal().await;
            if tx.send(true).is_err() {
                tracing::warn!("Failed to broadcast shutdown signal to background tasks");
            }
        });
        shutdown
    }

    pub(crate) fn manual() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub(crate) fn triggered(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            loop {
                let stopped = *rx.borrow_and_update();
                if stopped || rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
