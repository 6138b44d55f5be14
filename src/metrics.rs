use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Call once per process.
    pub fn init() -> anyhow::Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time descriptions so series show up on /metrics before first use.
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Sync invocations by outcome.");
        describe_counter!(
            "sync_step_failures_total",
            "Sync failures by pipeline step."
        );
        describe_histogram!("sync_duration_ms", "End-to-end sync time in milliseconds.");
        describe_counter!(
            "reconcile_events_applied_total",
            "Live insert events prepended to a watched view."
        );
        describe_counter!(
            "reconcile_events_duplicate_total",
            "Live insert events ignored because the id was already present."
        );
        describe_counter!(
            "reconcile_events_dropped_total",
            "Malformed live insert events dropped."
        );
        describe_counter!(
            "reconcile_resubscribes_total",
            "Live subscriptions reopened after the stream ended or failed to open."
        );
    });
}
