//! Serving the HTTP API next to the worker pool.

use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use agentrun_worker::WorkerPool;

/// Serve `router` until `signal` resolves, then stop the workers.
///
/// Workers stop claiming new runs as soon as the signal fires. Open HTTP
/// connections drain while the workers get their grace period, so a long
/// SSE session does not delay the shutdown of the pool.
pub async fn serve<F>(
    listener: TcpListener,
    router: Router,
    pool: WorkerPool,
    signal: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let stop = CancellationToken::new();
    let mut server = {
        let stop = stop.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        })
    };

    let exited = tokio::select! {
        _ = signal => None,
        joined = &mut server => Some(joined),
    };
    if exited.is_some() {
        error!("HTTP server exited before shutdown was requested");
    }

    pool.stop_claiming();
    stop.cancel();
    info!("Draining HTTP connections and in-flight runs");

    let (served, ()) = tokio::join!(
        async move {
            match exited {
                Some(joined) => joined,
                None => server.await,
            }
        },
        pool.shutdown(),
    );
    served.unwrap_or_else(|e| Err(std::io::Error::other(e)))
}
