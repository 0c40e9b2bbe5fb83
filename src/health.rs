//! Health server for liveness probes and Prometheus metrics
//!
//! Provides HTTP endpoints for:
//! - `/healthz` - Liveness probe (is the agent process alive?)
//! - `/readyz` - Readiness probe (has the agent evaluated its node yet?)
//! - `/metrics` - Prometheus metrics

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::model::{Severity, SignalSource};

/// Labels for status evaluation metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct EvaluationLabels {
    pub severity: String,
    pub source: String,
}

impl prometheus_client::encoding::EncodeLabelSet for EvaluationLabels {
    fn encode(
        &self,
        encoder: &mut prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("severity", self.severity.as_str()).encode(encoder.encode_label())?;
        ("source", self.source.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for membership operation metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OperationLabels {
    pub operation: String,
    pub outcome: String,
}

impl prometheus_client::encoding::EncodeLabelSet for OperationLabels {
    fn encode(
        &self,
        encoder: &mut prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for single-valued metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct NameLabels {
    pub name: String,
}

impl prometheus_client::encoding::EncodeLabelSet for NameLabels {
    fn encode(
        &self,
        encoder: &mut prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics state
pub struct Metrics {
    /// Status evaluations by winning severity and source
    pub status_evaluations_total: Family<EvaluationLabels, Counter>,
    /// Membership operations by operation and outcome
    pub membership_operations_total: Family<OperationLabels, Counter>,
    /// Topology violations by rule
    pub topology_violations_total: Family<NameLabels, Counter>,
    /// Event handling duration by event
    pub event_duration_seconds: Family<NameLabels, Histogram>,

    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let status_evaluations_total = Family::<EvaluationLabels, Counter>::default();
        registry.register(
            "mongodb_coordinator_status_evaluations",
            "Total number of node status evaluations",
            status_evaluations_total.clone(),
        );

        let membership_operations_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "mongodb_coordinator_membership_operations",
            "Total number of replica set membership operations",
            membership_operations_total.clone(),
        );

        let topology_violations_total = Family::<NameLabels, Counter>::default();
        registry.register(
            "mongodb_coordinator_topology_violations",
            "Total number of topology violations detected",
            topology_violations_total.clone(),
        );

        let event_duration_seconds = Family::<NameLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.001, 2.0, 15))
        });
        registry.register(
            "mongodb_coordinator_event_duration_seconds",
            "Duration of event handling in seconds",
            event_duration_seconds.clone(),
        );

        Self {
            status_evaluations_total,
            membership_operations_total,
            topology_violations_total,
            event_duration_seconds,
            registry,
        }
    }

    /// Record the result of a status evaluation
    pub fn record_evaluation(&self, severity: Severity, source: SignalSource) {
        let labels = EvaluationLabels {
            severity: severity.to_string(),
            source: source.to_string(),
        };
        self.status_evaluations_total.get_or_create(&labels).inc();
    }

    /// Record a finished membership operation
    pub fn record_membership_operation(&self, operation: &str, outcome: &str) {
        let labels = OperationLabels {
            operation: operation.to_string(),
            outcome: outcome.to_string(),
        };
        self.membership_operations_total.get_or_create(&labels).inc();
    }

    /// Record a topology violation
    pub fn record_topology_violation(&self, reason: &str) {
        let labels = NameLabels {
            name: reason.to_string(),
        };
        self.topology_violations_total.get_or_create(&labels).inc();
    }

    /// Record how long an event took to handle
    pub fn record_event(&self, event: &str, duration_secs: f64) {
        let labels = NameLabels {
            name: event.to_string(),
        };
        self.event_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Encode metrics to Prometheus text format
    ///
    /// Returns an empty string if encoding fails (should never happen with valid metrics).
    fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the agent has completed its first evaluation
    pub ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the agent as ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the agent is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 200 OK once the agent has evaluated its node.
/// Returns 503 Service Unavailable before that.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
///
/// Returns Prometheus-formatted metrics.
async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server on `addr` until the listener fails
pub async fn run_health_server(state: Arc<HealthState>, addr: SocketAddr) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Health server listening on {}", addr);

    axum::serve(listener, app).await
}
