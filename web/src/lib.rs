use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use domain::LifecycleContext;
use events::ChannelBus;
use log::*;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};

mod controller;
mod error;
mod extractors;
mod params;
pub mod router;
mod sse;

pub use error::{Error, Result};

/// Shared state of every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub service: service::AppState,
    pub lifecycle: LifecycleContext,
    pub bus: Arc<ChannelBus>,
}

impl AppState {
    pub fn new(service: service::AppState, lifecycle: LifecycleContext, bus: Arc<ChannelBus>) -> Self {
        Self {
            service,
            lifecycle,
            bus,
        }
    }
}

/// Serves the API until `shutdown` is cancelled, then drains in-flight requests.
pub async fn init_server(app_state: AppState, shutdown: CancellationToken) -> std::io::Result<()> {
    let config = &app_state.service.config;
    let interface = config.interface.as_deref().unwrap_or("127.0.0.1");
    let listen_addr = format!("{interface}:{}", config.port);

    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Ignoring invalid CORS origin '{origin}': {err}");
                None
            }
        })
        .collect();

    let cors_layer = CorsLayer::new()
        .allow_methods([
            Method::DELETE,
            Method::GET,
            Method::OPTIONS,
            Method::POST,
            Method::PUT,
        ])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static(extractors::caller::USER_ID_HEADER),
        ])
        .allow_origin(AllowOrigin::list(allowed_origins));

    info!("Server starting... listening for connections on http://{listen_addr}");

    let listener = TcpListener::bind(&listen_addr).await?;
    let app = router::define_routes(app_state).layer(cors_layer);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
