// Prometheus metrics definitions for the arena backend.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::monsters::image_sync::SyncReport;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    /// Monsters processed by image sync runs, by outcome
    /// (updated, skipped, not_found, error).
    pub static ref MONSTER_IMAGE_SYNC_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_monster_image_sync_total", "Monsters processed by image sync"),
        &["outcome"],
    )
    .unwrap();

    /// Calls to the hosted vision flow, by mode (run, stream) and outcome.
    pub static ref VISION_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_vision_requests_total", "Calls to the hosted vision flow"),
        &["mode", "outcome"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "arena_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0]),
        &["endpoint"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(MONSTER_IMAGE_SYNC_TOTAL.clone()),
        Box::new(VISION_REQUESTS_TOTAL.clone()),
        Box::new(API_REQUEST_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::warn!(error = %e, "Metric already registered");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Label used for requests that matched no route.
pub const UNMATCHED_ENDPOINT: &str = "other";

/// Endpoint label for a request: its route template (`/api/openrag/filters/{id}`)
/// or [`UNMATCHED_ENDPOINT`], so labels stay bounded by the route table.
pub fn endpoint_label(matched: Option<&MatchedPath>) -> String {
    matched
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string())
}

pub fn record_sync(report: &SyncReport) {
    let counts = [
        ("updated", report.updated),
        ("skipped", report.skipped),
        ("not_found", report.not_found),
        ("error", report.errors.len()),
    ];
    for (outcome, n) in counts {
        MONSTER_IMAGE_SYNC_TOTAL
            .with_label_values(&[outcome])
            .inc_by(n as u64);
    }
}

pub fn record_vision(mode: &str, outcome: &str) {
    VISION_REQUESTS_TOTAL.with_label_values(&[mode, outcome]).inc();
}

/// Middleware counting and timing every request.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = endpoint_label(req.extensions().get::<MatchedPath>());
    let started = Instant::now();

    let response = next.run(req).await;

    API_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();
    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[&endpoint])
        .observe(started.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monsters::image_sync::SyncFailure;

    #[test]
    fn test_unmatched_requests_share_one_label() {
        assert_eq!(endpoint_label(None), UNMATCHED_ENDPOINT);
    }

    #[test]
    fn test_gather_metrics_returns_string() {
        // Registering twice must not panic
        register_metrics();
        register_metrics();
        let output = gather_metrics();
        assert!(output.is_empty() || output.contains("arena_"));
    }

    #[test]
    fn test_record_sync_counts_outcomes() {
        let before = MONSTER_IMAGE_SYNC_TOTAL.with_label_values(&["error"]).get();
        let report = SyncReport {
            updated: 2,
            skipped: 1,
            not_found: 0,
            errors: vec![SyncFailure {
                name: "Goblin".to_string(),
                error: "boom".to_string(),
            }],
        };
        record_sync(&report);
        assert_eq!(
            MONSTER_IMAGE_SYNC_TOTAL.with_label_values(&["error"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_record_vision() {
        let before = VISION_REQUESTS_TOTAL.with_label_values(&["unit", "ok"]).get();
        record_vision("unit", "ok");
        assert_eq!(
            VISION_REQUESTS_TOTAL.with_label_values(&["unit", "ok"]).get(),
            before + 1
        );
    }
}
