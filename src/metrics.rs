use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum VendorOperation {
    Acquire,
    Start,
    Stop,
    Query,
}

impl VendorOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Query => "query",
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum StorageOperation {
    List,
    Presign,
    Ping,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Ok,
    Error,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum TokenKind {
    Rtc,
    Rtm,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct VendorCallLabels {
    pub operation: VendorOperation,
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct VendorOperationLabels {
    pub operation: VendorOperation,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StorageCallLabels {
    pub operation: StorageOperation,
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TokenLabels {
    pub kind: TokenKind,
}

impl<T, E> From<&Result<T, E>> for Outcome {
    fn from(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            Outcome::Ok
        } else {
            Outcome::Error
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Every Prometheus metric exposed by the gateway.
pub struct Metrics {
    pub vendor_calls: Family<VendorCallLabels, Counter>,
    pub vendor_call_duration_seconds: Family<VendorOperationLabels, Histogram>,
    pub storage_calls: Family<StorageCallLabels, Counter>,
    pub tokens_issued: Family<TokenLabels, Counter>,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let vendor_calls = Family::<VendorCallLabels, Counter>::default();
        registry.register(
            "recgate_vendor_calls",
            "Cloud recording API calls by operation and outcome",
            vendor_calls.clone(),
        );

        let vendor_call_duration_seconds =
            Family::<VendorOperationLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.01, 2.0, 12))
            });
        registry.register(
            "recgate_vendor_call_duration_seconds",
            "Cloud recording API latency in seconds",
            vendor_call_duration_seconds.clone(),
        );

        let storage_calls = Family::<StorageCallLabels, Counter>::default();
        registry.register(
            "recgate_storage_calls",
            "Object storage calls by operation and outcome",
            storage_calls.clone(),
        );

        let tokens_issued = Family::<TokenLabels, Counter>::default();
        registry.register(
            "recgate_tokens_issued",
            "RTC / RTM tokens minted",
            tokens_issued.clone(),
        );

        Self {
            vendor_calls,
            vendor_call_duration_seconds,
            storage_calls,
            tokens_issued,
        }
    }

    pub fn observe_vendor(&self, operation: VendorOperation, outcome: Outcome, seconds: f64) {
        self.vendor_calls
            .get_or_create(&VendorCallLabels {
                operation: operation.clone(),
                outcome,
            })
            .inc();
        self.vendor_call_duration_seconds
            .get_or_create(&VendorOperationLabels { operation })
            .observe(seconds);
    }

    pub fn observe_storage(&self, operation: StorageOperation, outcome: Outcome) {
        self.storage_calls
            .get_or_create(&StorageCallLabels { operation, outcome })
            .inc();
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in [`crate::AppState`].
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all gateway metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }

    /// Render the registry in OpenMetrics text format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)
            .map_err(|e| anyhow::anyhow!("metrics encoding failed: {e}"))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_vendor_and_storage_counters() {
        let m = MetricsRegistry::new();
        m.metrics
            .observe_vendor(VendorOperation::Acquire, Outcome::Ok, 0.05);
        m.metrics
            .observe_storage(StorageOperation::Presign, Outcome::Error);

        let text = m.encode().unwrap();
        assert!(text.contains("recgate_vendor_calls_total{operation=\"Acquire\",outcome=\"Ok\"} 1"));
        assert!(text.contains("recgate_storage_calls_total{operation=\"Presign\",outcome=\"Error\"} 1"));
        assert!(text.contains("recgate_vendor_call_duration_seconds_count{operation=\"Acquire\"} 1"));
    }

    #[test]
    fn outcome_from_result() {
        let ok: Result<(), ()> = Ok(());
        let err: Result<(), ()> = Err(());
        assert_eq!(Outcome::from(&ok), Outcome::Ok);
        assert_eq!(Outcome::from(&err), Outcome::Error);
    }
}
