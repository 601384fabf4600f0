//! HTTP server and route handlers

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mlogtail_common::Signal;
use mlogtail_control::QueueProbe;
use mlogtail_stats::{CounterName, CounterStore, Snapshot};
use serde::Serialize;
use serde_json::json;
use tokio::{net::TcpListener, sync::broadcast};
use tower_http::timeout::TimeoutLayer;

use crate::{HttpConfig, HttpError};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct HttpState {
    store: Arc<CounterStore>,
    queue: Arc<dyn QueueProbe>,
}

impl HttpState {
    pub fn new(store: Arc<CounterStore>, queue: Arc<dyn QueueProbe>) -> Self {
        Self { store, queue }
    }
}

/// Counter values as served by `/stats`; keys use underscores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsResponse {
    pub bytes_received: u64,
    pub bytes_delivered: u64,
    pub received: u64,
    pub delivered: u64,
    pub forwarded: u64,
    pub deferred: u64,
    pub bounced: u64,
    pub rejected: u64,
    pub held: u64,
    pub discarded: u64,
    pub queue_size: u64,
}

impl StatsResponse {
    #[must_use]
    pub fn new(snapshot: &Snapshot, queue_size: u64) -> Self {
        Self {
            bytes_received: snapshot[CounterName::BytesReceived],
            bytes_delivered: snapshot[CounterName::BytesDelivered],
            received: snapshot[CounterName::Received],
            delivered: snapshot[CounterName::Delivered],
            forwarded: snapshot[CounterName::Forwarded],
            deferred: snapshot[CounterName::Deferred],
            bounced: snapshot[CounterName::Bounced],
            rejected: snapshot[CounterName::Rejected],
            held: snapshot[CounterName::Held],
            discarded: snapshot[CounterName::Discarded],
            queue_size,
        }
    }
}

/// JSON endpoints over the counter store
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    /// Bind the listen address and build the router
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Bind`] if the address cannot be bound.
    pub async fn bind(config: &HttpConfig, state: HttpState) -> Result<Self, HttpError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|source| HttpError::Bind {
                address: config.listen_address.clone(),
                source,
            })?;

        tracing::info!(address = %config.listen_address, "HTTP server bound");

        Ok(Self {
            listener,
            router: router(state).layer(TimeoutLayer::new(config.timeout())),
        })
    }

    /// The address actually bound
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot report its address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve requests until a shutdown signal is received
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Server`] if the server stops with an I/O error.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), HttpError> {
        tracing::info!("HTTP server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await
            .map_err(|e| HttpError::Server(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn router(state: HttpState) -> Router {
    Router::new()
        .route("/stats", get(stats_handler))
        .route("/counter/{name}", get(counter_handler))
        .route("/reset", post(reset_handler).fallback(method_not_allowed))
        .route(
            "/stats_reset",
            post(stats_reset_handler).fallback(method_not_allowed),
        )
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn stats_handler(State(state): State<HttpState>) -> Json<StatsResponse> {
    let snapshot = state.store.snapshot();
    let queue_size = state.queue.queue_size().await;
    Json(StatsResponse::new(&snapshot, queue_size))
}

async fn counter_handler(State(state): State<HttpState>, Path(name): Path<String>) -> Response {
    match state.store.get(&name) {
        Ok(value) => Json(json!({ "counter": name, "value": value })).into_response(),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("Unknown counter: {name}") })),
        )
            .into_response(),
    }
}

async fn reset_handler(State(state): State<HttpState>) -> Json<serde_json::Value> {
    state.store.reset_all();
    tracing::debug!("Counters reset over HTTP");
    Json(json!({ "status": "ok", "message": "Counters reset successfully" }))
}

async fn stats_reset_handler(State(state): State<HttpState>) -> Json<StatsResponse> {
    let snapshot = state.store.reset_all();
    let queue_size = state.queue.queue_size().await;
    Json(StatsResponse::new(&snapshot, queue_size))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed. Use POST" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use mlogtail_control::FixedQueue;
    use tower::ServiceExt;

    use super::*;

    fn state() -> HttpState {
        let store = Arc::new(CounterStore::new());
        store.increment(CounterName::Received, 2);
        store.increment(CounterName::BytesReceived, 2048);
        HttpState::new(store, Arc::new(FixedQueue(6)))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn call(method: Method, uri: &str, state: HttpState) -> Response {
        router(state)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_stats_uses_underscore_keys() {
        let Json(stats) = stats_handler(State(state())).await;
        let value = serde_json::to_value(stats).unwrap();

        assert_eq!(value["bytes_received"], 2048);
        assert_eq!(value["received"], 2);
        assert_eq!(value["queue_size"], 6);
        assert_eq!(value.as_object().unwrap().len(), CounterName::COUNT + 1);
    }

    #[tokio::test]
    async fn test_counter_known_and_unknown() {
        let response = counter_handler(State(state()), Path("received".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "counter": "received", "value": 2 })
        );

        let response = counter_handler(State(state()), Path("nope".to_string())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Unknown counter: nope" })
        );
    }

    #[tokio::test]
    async fn test_stats_reset_returns_previous_values() {
        let state = state();
        let store = Arc::clone(&state.store);

        let Json(stats) = stats_reset_handler(State(state)).await;
        assert_eq!(stats.received, 2);
        assert!(store.snapshot().is_zero());
    }

    #[tokio::test]
    async fn test_reset_over_router() {
        let state = state();
        let store = Arc::clone(&state.store);

        let response = call(Method::POST, "/reset", state).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "status": "ok", "message": "Counters reset successfully" })
        );
        assert!(store.snapshot().is_zero());
    }

    #[tokio::test]
    async fn test_reset_requires_post() {
        for uri in ["/reset", "/stats_reset"] {
            let state = state();
            let store = Arc::clone(&state.store);

            let response = call(Method::GET, uri, state).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(
                body_json(response).await,
                json!({ "error": "Method not allowed. Use POST" })
            );
            assert_eq!(store.value(CounterName::Received), 2);
        }
    }

    #[tokio::test]
    async fn test_health() {
        let response = call(Method::GET, "/health", state()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") })
        );
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let server = HttpServer::bind(&HttpConfig::new("127.0.0.1:0"), state())
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(server.serve(rx));
        tx.send(Signal::Shutdown).unwrap();

        handle.await.unwrap().unwrap();
    }
}
