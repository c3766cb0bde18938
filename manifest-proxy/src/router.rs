use std::future::ready;
use std::sync::Arc;

use axum::{
    http::HeaderValue,
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::api::{CAPABILITIES, CAPABILITIES_HEADER};
use crate::client::FlagClient;
use crate::config::Config;
use crate::manifest_endpoint;
use crate::metrics_utils::{setup_metrics_recorder, track_metrics};

#[derive(Clone)]
pub struct State {
    pub client: Arc<dyn FlagClient + Send + Sync>,
    pub config: Config,
}

async fn index() -> &'static str {
    "manifest proxy"
}

async fn with_capabilities(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CAPABILITIES_HEADER, HeaderValue::from_static(CAPABILITIES));
    response
}

pub fn router<C>(client: Arc<C>, config: Config) -> Router
where
    C: FlagClient + Send + Sync + 'static,
{
    let export_prometheus = config.export_prometheus;
    let state = State { client, config };

    let manifest_router = Router::new()
        .route("/manifest", get(manifest_endpoint::get_manifest))
        .route("/manifest/flags", post(manifest_endpoint::create_flag))
        .route(
            "/manifest/flags/:key",
            get(manifest_endpoint::get_flag)
                .put(manifest_endpoint::update_flag)
                .delete(manifest_endpoint::delete_flag),
        )
        .layer(axum::middleware::map_response(with_capabilities));

    let router = Router::new()
        .route("/", get(index))
        .nest("/openfeature/v0", manifest_router)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Global metrics recorders can play poorly with e.g. tests
    if export_prometheus {
        let recorder_handle = setup_metrics_recorder();
        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
