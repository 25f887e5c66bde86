pub mod config;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tandem_gateway::{Relay, connection};

/// HTTP surface: a liveness root and the socket endpoint.
pub fn app(relay: Relay, cors_origin: Option<&str>) -> anyhow::Result<Router> {
    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST])
            .allow_credentials(true),
        None => CorsLayer::permissive(),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/socket", get(ws_upgrade))
        .with_state(relay)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

async fn root() -> &'static str {
    "Socket server is running"
}

async fn ws_upgrade(State(relay): State<Relay>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, relay))
}
