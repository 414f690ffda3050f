use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Opts, Registry};
use std::collections::HashMap;
use std::sync::Arc;

/// Prometheus metrics for one engine
///
/// Every metric carries an `index` const label and the `rtsearch_` prefix.
#[derive(Clone)]
pub struct EngineMetrics {
    // Counters
    pub puts_total: Counter,
    pub removes_total: Counter,
    pub searches_total: Counter,
    pub search_errors: Counter,
    pub compactions_total: Counter,
    pub compaction_failures: Counter,

    // Gauges
    pub live_bytes: Gauge,
    pub live_docs: Gauge,
    pub disk_docs: Gauge,

    // Histograms
    pub search_latency: Histogram,
    pub compaction_duration: Histogram,

    registry: Arc<Registry>,
}

impl EngineMetrics {
    /// Create metrics registered in a fresh registry for `index`
    pub fn new(index: &str) -> Result<Self, prometheus::Error> {
        let mut labels = HashMap::new();
        labels.insert("index".to_string(), index.to_string());
        let registry = Registry::new_custom(Some("rtsearch".to_string()), Some(labels))?;

        // Counters
        let puts_total = Counter::with_opts(Opts::new(
            "puts_total",
            "Total number of documents put",
        ))?;
        registry.register(Box::new(puts_total.clone()))?;

        let removes_total = Counter::with_opts(Opts::new(
            "removes_total",
            "Total number of remove requests",
        ))?;
        registry.register(Box::new(removes_total.clone()))?;

        let searches_total = Counter::with_opts(Opts::new(
            "searches_total",
            "Total number of searches",
        ))?;
        registry.register(Box::new(searches_total.clone()))?;

        let search_errors = Counter::with_opts(Opts::new(
            "search_errors_total",
            "Total number of failed searches",
        ))?;
        registry.register(Box::new(search_errors.clone()))?;

        let compactions_total = Counter::with_opts(Opts::new(
            "compactions_total",
            "Total number of committed compaction cycles",
        ))?;
        registry.register(Box::new(compactions_total.clone()))?;

        let compaction_failures = Counter::with_opts(Opts::new(
            "compaction_failures_total",
            "Total number of failed compaction cycles",
        ))?;
        registry.register(Box::new(compaction_failures.clone()))?;

        // Gauges
        let live_bytes = Gauge::with_opts(Opts::new(
            "live_bytes",
            "Estimated memory footprint of the Live segment",
        ))?;
        registry.register(Box::new(live_bytes.clone()))?;

        let live_docs = Gauge::with_opts(Opts::new(
            "live_docs",
            "Documents in the Live segment",
        ))?;
        registry.register(Box::new(live_docs.clone()))?;

        let disk_docs = Gauge::with_opts(Opts::new(
            "disk_docs",
            "Live documents in the Disk segment",
        ))?;
        registry.register(Box::new(disk_docs.clone()))?;

        // Histograms
        let search_latency = Histogram::with_opts(
            HistogramOpts::new("search_latency_seconds", "Search latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(search_latency.clone()))?;

        let compaction_duration = Histogram::with_opts(
            HistogramOpts::new("compaction_duration_seconds", "Compaction cycle duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(compaction_duration.clone()))?;

        Ok(Self {
            puts_total,
            removes_total,
            searches_total,
            search_errors,
            compactions_total,
            compaction_failures,
            live_bytes,
            live_docs,
            disk_docs,
            search_latency,
            compaction_duration,
            registry: Arc::new(registry),
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Record a search and its latency
    pub fn record_search(&self, duration_secs: f64) {
        self.searches_total.inc();
        self.search_latency.observe(duration_secs);
    }

    pub fn record_search_error(&self) {
        self.search_errors.inc();
    }

    /// Record a compaction cycle outcome
    pub fn record_compaction(&self, duration_secs: f64, success: bool) {
        if success {
            self.compactions_total.inc();
        } else {
            self.compaction_failures.inc();
        }
        self.compaction_duration.observe(duration_secs);
    }

    /// Update the Live gauges
    pub fn set_live(&self, bytes: usize, docs: u32) {
        self.live_bytes.set(bytes as f64);
        self.live_docs.set(docs as f64);
    }

    pub fn set_disk_docs(&self, docs: u32) {
        self.disk_docs.set(docs as f64);
    }

    /// Render the registry in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;

        let mut buffer = Vec::new();
        prometheus::TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
