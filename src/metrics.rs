use crate::fetch::ResponseOutcome;
use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};

/// Metric name prefix for all catalog-harvest metrics
const PREFIX: &str = "catalog_harvest";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref FETCH_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_fetch_attempts_total"), "Fetch attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create fetch_attempts_total metric");

    pub static ref ACQUISITIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_acquisitions_total"), "Resource acquisitions by id type and result"),
        &["id_type", "result"]
    ).expect("Failed to create acquisitions_total metric");

    pub static ref MERGES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_merges_total"),
        "Total entity merges"
    ).expect("Failed to create merges_total metric");

    pub static ref SEARCH_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_search_failures_total"), "Federated search sources that failed or timed out"),
        &["site"]
    ).expect("Failed to create search_failures_total metric");
}

/// Registers all metrics with the registry. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(FETCH_ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ACQUISITIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MERGES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SEARCH_FAILURES_TOTAL.clone()));
}

pub fn record_fetch_attempt(outcome: ResponseOutcome) {
    FETCH_ATTEMPTS_TOTAL
        .with_label_values(&[outcome.as_str()])
        .inc();
}

pub fn record_acquisition(id_type: &str, result: &str) {
    ACQUISITIONS_TOTAL
        .with_label_values(&[id_type, result])
        .inc();
}

pub fn record_merge() {
    MERGES_TOTAL.inc();
}

pub fn record_search_failure(site: &str) {
    SEARCH_FAILURES_TOTAL.with_label_values(&[site]).inc();
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
