use std::sync::OnceLock;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::Error;
use crate::Result;

const INGRESS_REGISTRY_PREFIX: &str = "ingress";

const PIPELINE_NAME_LABEL: &str = "pipeline";
const POLICY_LABEL: &str = "policy";

// counters (the registry appends the _total suffix)
const READ_TOTAL: &str = "read";
const EMITTED_TOTAL: &str = "emitted";
const DROPPED_TOTAL: &str = "dropped";
const ADJUSTED_TOTAL: &str = "adjusted";
const PUNCTUATION_TOTAL: &str = "punctuation";

// gauges
const PENDING: &str = "pending";
const WATERMARK: &str = "watermark";

/// The global register of all metrics.
#[derive(Default)]
struct GlobalRegistry {
    // It is okay to use a plain mutex because we register each metric only one time.
    registry: parking_lot::Mutex<Registry>,
}

impl GlobalRegistry {
    fn new() -> Self {
        GlobalRegistry {
            registry: parking_lot::Mutex::new(Registry::default()),
        }
    }
}

static GLOBAL_REGISTRY: OnceLock<GlobalRegistry> = OnceLock::new();

fn global_registry() -> &'static GlobalRegistry {
    GLOBAL_REGISTRY.get_or_init(GlobalRegistry::new)
}

/// Metrics of the ingress pipelines in this process, labelled by pipeline name.
pub(crate) struct IngressMetrics {
    pub(crate) read_total: Family<Vec<(String, String)>, Counter>,
    pub(crate) emitted_total: Family<Vec<(String, String)>, Counter>,
    pub(crate) dropped_total: Family<Vec<(String, String)>, Counter>,
    pub(crate) adjusted_total: Family<Vec<(String, String)>, Counter>,
    pub(crate) punctuation_total: Family<Vec<(String, String)>, Counter>,
    pub(crate) pending: Family<Vec<(String, String)>, Gauge>,
    pub(crate) watermark: Family<Vec<(String, String)>, Gauge>,
}

impl IngressMetrics {
    fn new() -> Self {
        let metrics = Self {
            read_total: Family::<Vec<(String, String)>, Counter>::default(),
            emitted_total: Family::<Vec<(String, String)>, Counter>::default(),
            dropped_total: Family::<Vec<(String, String)>, Counter>::default(),
            adjusted_total: Family::<Vec<(String, String)>, Counter>::default(),
            punctuation_total: Family::<Vec<(String, String)>, Counter>::default(),
            pending: Family::<Vec<(String, String)>, Gauge>::default(),
            watermark: Family::<Vec<(String, String)>, Gauge>::default(),
        };

        let mut registry = global_registry().registry.lock();
        let registry = registry.sub_registry_with_prefix(INGRESS_REGISTRY_PREFIX);
        registry.register(
            READ_TOTAL,
            "A Counter to keep track of the total number of events pushed into the pipeline",
            metrics.read_total.clone(),
        );
        registry.register(
            EMITTED_TOTAL,
            "A Counter to keep track of the total number of data events released in order",
            metrics.emitted_total.clone(),
        );
        registry.register(
            DROPPED_TOTAL,
            "A Counter to keep track of the total number of late events dropped",
            metrics.dropped_total.clone(),
        );
        registry.register(
            ADJUSTED_TOTAL,
            "A Counter to keep track of the total number of late events with an adjusted start time",
            metrics.adjusted_total.clone(),
        );
        registry.register(
            PUNCTUATION_TOTAL,
            "A Counter to keep track of the total number of punctuations emitted",
            metrics.punctuation_total.clone(),
        );
        registry.register(
            PENDING,
            "A Gauge to keep track of the number of events held in the reorder buffer",
            metrics.pending.clone(),
        );
        registry.register(
            WATERMARK,
            "A Gauge to keep track of the high-water mark of the pipeline",
            metrics.watermark.clone(),
        );
        metrics
    }
}

static INGRESS_METRICS: OnceLock<IngressMetrics> = OnceLock::new();

pub(crate) fn ingress_metrics() -> &'static IngressMetrics {
    INGRESS_METRICS.get_or_init(IngressMetrics::new)
}

/// Labels for the metrics of one pipeline.
pub(crate) fn pipeline_metric_labels(name: &str, policy: &str) -> Vec<(String, String)> {
    vec![
        (PIPELINE_NAME_LABEL.to_string(), name.to_string()),
        (POLICY_LABEL.to_string(), policy.to_string()),
    ]
}

/// Renders every registered metric in the OpenMetrics text format.
pub fn metrics_text() -> Result<String> {
    // make sure the ingress metrics are registered even if no pipeline ran yet
    ingress_metrics();
    let registry = global_registry().registry.lock();
    let mut buffer = String::new();
    encode(&mut buffer, &registry)
        .map_err(|e| Error::Metrics(format!("Failed to encode metrics: {e}")))?;
    Ok(buffer)
}
