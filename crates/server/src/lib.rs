//! Server crate provides HTTP server functionality.
//!
//! This module implements the `/v1/orders` HTTP API on top of
//! [`OrderService`], plus health and Prometheus metrics endpoints.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{MatchedPath, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use model::{NewOrder, Order, OrderFilter};
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use serde_json::json;
use service::{OrderService, ServiceError};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Server represents an HTTP server for working with orders.
pub struct Server {
    service: Arc<dyn OrderService>,
    port: u16,
    cors: CorsLayer,
    shutdown_timeout: Duration,
    metrics: Arc<Metrics>,
}

/// Metrics collects and exposes HTTP server metrics.
struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    errors_total: CounterVec,
}

impl Metrics {
    fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "endpoint"],
        )?;

        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total number of errors"),
            &["source", "endpoint"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
        })
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, endpoint, status.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
    }

    fn record_error(&self, source: &str, endpoint: &str) {
        self.errors_total.with_label_values(&[source, endpoint]).inc();
    }
}

/// JSON error response for a failed [`OrderService`] call.
struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ServiceError::InvalidOrder(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            ServiceError::DuplicateOrderNumber(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string())
            }
            ServiceError::DuplicateOrderId(_) | ServiceError::IdAllocationExhausted { .. } => {
                error!("Order creation failed: {}", self.0);
                (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string())
            }
            ServiceError::Db(e) => {
                error!("Database failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = json!({
            "statusCode": status.as_u16(),
            "message": message,
            "error": status.canonical_reason().unwrap_or("Error"),
        });
        (status, Json(body)).into_response()
    }
}

impl Server {
    /// Creates a new Server instance.
    ///
    /// # Arguments
    ///
    /// * `port` - The port on which the server will listen
    /// * `service` - The order service backing the API
    /// * `cors_allow_origin` - Allowed CORS origin, `*` for any
    /// * `shutdown_timeout` - How long in-flight requests may run after a shutdown signal
    ///
    /// # Errors
    ///
    /// Fails if the CORS origin is not a valid header value or metrics cannot be registered.
    pub fn new(
        port: u16,
        service: Arc<dyn OrderService>,
        cors_allow_origin: &str,
        shutdown_timeout: Duration,
    ) -> Result<Self> {
        info!("Initializing HTTP server on port {}", port);

        let cors = if cors_allow_origin == "*" {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origin: HeaderValue = cors_allow_origin
                .parse()
                .with_context(|| format!("Invalid CORS origin '{cors_allow_origin}'"))?;
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Ok(Self {
            service,
            port,
            cors,
            shutdown_timeout,
            metrics: Arc::new(Metrics::new().context("Failed to register metrics")?),
        })
    }

    /// Starts the server and blocks until it's shut down.
    ///
    /// After a shutdown signal, in-flight requests get `shutdown_timeout`
    /// to finish before the server stops waiting for them.
    pub async fn start(&self) -> Result<()> {
        let app = self.create_router();

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .context("Failed to bind to port")?;

        info!("HTTP server listening on port {}", self.port);

        let (signalled_tx, mut signalled_rx) = watch::channel(false);
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = signalled_tx.send(true);
            })
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            res = &mut serve => {
                res.context("Server error")?;
                info!("HTTP server shut down gracefully");
                return Ok(());
            }
            _ = signalled_rx.changed() => {}
        }

        match tokio::time::timeout(self.shutdown_timeout, serve).await {
            Ok(res) => {
                res.context("Server error")?;
                info!("HTTP server shut down gracefully");
            }
            Err(_) => warn!(
                "Graceful shutdown timed out after {:?}, dropping open connections",
                self.shutdown_timeout
            ),
        }
        Ok(())
    }

    fn create_router(&self) -> Router {
        let metrics = self.metrics.clone();

        Router::new()
            .route(
                "/v1/orders",
                get(Self::handle_list_orders).post(Self::handle_create_order),
            )
            .route("/v1/orders/countries", get(Self::handle_filter_countries))
            .route("/health", get(Self::handle_health))
            .route("/metrics", get(Self::handle_metrics))
            .route_layer(axum::middleware::from_fn_with_state(
                metrics.clone(),
                Self::metrics_middleware,
            ))
            .layer(self.cors.clone())
            .with_state(AppState {
                service: self.service.clone(),
                metrics,
            })
    }

    /// Middleware for collecting metrics on HTTP requests
    async fn metrics_middleware(
        State(metrics): State<Arc<Metrics>>,
        req: axum::extract::Request,
        next: axum::middleware::Next,
    ) -> Response {
        let method = req.method().to_string();
        let endpoint = req
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());

        let start = std::time::Instant::now();
        let response = next.run(req).await;
        let duration = start.elapsed();

        let status = response.status().as_u16();
        metrics.record_request(&method, &endpoint, status, duration);
        if status >= 400 {
            metrics.record_error("http", &endpoint);
        }

        response
    }

    async fn handle_list_orders(
        State(state): State<AppState>,
        Query(filter): Query<OrderFilter>,
    ) -> Result<Json<Vec<Order>>, ApiError> {
        info!(
            payment_description = ?filter.payment_description,
            country = ?filter.country,
            "Received request to list orders"
        );
        let orders = state.service.list_orders(filter).await?;
        Ok(Json(orders))
    }

    async fn handle_create_order(
        State(state): State<AppState>,
        Json(input): Json<NewOrder>,
    ) -> Result<(StatusCode, Json<Order>), ApiError> {
        info!(order_number = ?input.order_number, "Received request to create order");
        let order = state.service.create_order(input).await?;
        Ok((StatusCode::CREATED, Json(order)))
    }

    async fn handle_filter_countries(
        State(state): State<AppState>,
    ) -> Result<Json<Vec<String>>, ApiError> {
        let countries = state.service.filter_countries().await?;
        Ok(Json(countries))
    }

    async fn handle_health() -> &'static str {
        "OK"
    }

    async fn handle_metrics(State(state): State<AppState>) -> Response {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&state.metrics.registry.gather(), &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
        }

        match String::from_utf8(buffer) {
            Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
            Err(e) => {
                error!("Failed to convert metrics to UTF-8: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid metrics data").into_response()
            }
        }
    }
}

/// Application state shared between request handlers
#[derive(Clone)]
struct AppState {
    service: Arc<dyn OrderService>,
    metrics: Arc<Metrics>,
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use repository::InMemoryOrdersRepository;
    use serde_json::Value;
    use service::OrderServiceImpl;
    use tower::ServiceExt;

    // Helper function to create a test server
    fn create_test_server() -> Server {
        let service = OrderServiceImpl::with_defaults(InMemoryOrdersRepository::new());
        Server::new(3000, Arc::new(service), "*", Duration::from_secs(1)).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_order(body: Value) -> Request<Body> {
        Request::post("/v1/orders")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_server_creation() {
        let server = create_test_server();
        assert_eq!(server.port, 3000);
        assert_eq!(server.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_cors_origin_rejected() {
        let service = OrderServiceImpl::with_defaults(InMemoryOrdersRepository::new());
        let result = Server::new(3000, Arc::new(service), "bad\norigin", Duration::from_secs(1));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_create_order_returns_created() {
        let app = create_test_server().create_router();

        let (status, body) = send(
            &app,
            post_order(json!({
                "orderNumber": "ON-001",
                "paymentDescription": "Test payment",
                "country": "Estonia",
                "amount": 100.5,
                "currency": "EUR",
                "paymentDueDate": "2024-12-31"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["orderNumber"], "ON-001");
        assert_eq!(body["orderId"].as_str().unwrap().len(), 8);
        assert_eq!(body["amount"], "100.50");
        assert_eq!(body["paymentDueDate"], "2024-12-31");
        assert!(body["street"].is_null());
        assert!(body["id"].is_number());
    }

    #[tokio::test]
    async fn test_duplicate_order_number_is_unprocessable() {
        let app = create_test_server().create_router();

        let (status, _) = send(&app, post_order(json!({ "orderNumber": "ON-001" }))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, post_order(json!({ "orderNumber": "ON-001" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["statusCode"], 422);
        assert_eq!(body["message"], "Order number 'ON-001' already exists");
    }

    #[tokio::test]
    async fn test_missing_order_number_is_bad_request() {
        let app = create_test_server().create_router();

        let (status, body) = send(&app, post_order(json!({ "country": "Estonia" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["statusCode"], 400);
    }

    #[tokio::test]
    async fn test_list_orders_with_filters() {
        let app = create_test_server().create_router();
        for (number, desc, country, due) in [
            ("ON-1", "other", "Latvia", "2024-01-01"),
            ("ON-2", "Test payment", "Estonia", "2024-03-01"),
            ("ON-3", "test fee", "Estonia", "2024-02-01"),
        ] {
            let (status, _) = send(
                &app,
                post_order(json!({
                    "orderNumber": number,
                    "paymentDescription": desc,
                    "country": country,
                    "paymentDueDate": due
                })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = send(&app, get("/v1/orders")).await;
        assert_eq!(status, StatusCode::OK);
        let numbers: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["orderNumber"].as_str().unwrap())
            .collect();
        assert_eq!(numbers, vec!["ON-3", "ON-2", "ON-1"]);

        let (_, body) = send(&app, get("/v1/orders?paymentDescription=TEST&country=Estonia")).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = send(&app, get("/v1/orders?country=Lithuania")).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_filter_countries() {
        let app = create_test_server().create_router();
        for (number, country) in [("ON-1", "Latvia"), ("ON-2", "Estonia"), ("ON-3", "Latvia")] {
            send(&app, post_order(json!({ "orderNumber": number, "country": country }))).await;
        }

        let (status, body) = send(&app, get("/v1/orders/countries")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["Estonia", "Latvia"]));
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let app = create_test_server().create_router();

        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get("/metrics")).await.unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("http_requests_total"));
        assert!(text.contains("endpoint=\"/health\""));
    }
}
