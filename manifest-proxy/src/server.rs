use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::client::PostHogClient;
use crate::config::Config;
use crate::router;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let client = match PostHogClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to create PostHog client: {}", e);
            return;
        }
    };

    let app = router::router(client, config);

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {:?}", addr),
        Err(e) => tracing::warn!("listening on unknown address: {}", e),
    }

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!("server exited with error: {}", e);
    }
}
