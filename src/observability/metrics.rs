use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub available_riders: IntGauge,
    pub propagation_events_total: IntCounterVec,
    pub orders_resynced_total: IntCounter,
    pub propagation_checkpoint: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Rider assignments at order creation by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of rider selection plus order write in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let available_riders = IntGauge::new(
            "available_riders",
            "Size of the available rider pool at the last selection",
        )
        .expect("valid available_riders metric");

        let propagation_events_total = IntCounterVec::new(
            Opts::new(
                "propagation_events_total",
                "Rider change events handled by the propagator by outcome",
            ),
            &["outcome"],
        )
        .expect("valid propagation_events_total metric");

        let orders_resynced_total = IntCounter::new(
            "orders_resynced_total",
            "Orders whose embedded rider address was rewritten",
        )
        .expect("valid orders_resynced_total metric");

        let propagation_checkpoint = IntGauge::new(
            "propagation_checkpoint",
            "Resume token of the last change event handled by the propagator",
        )
        .expect("valid propagation_checkpoint metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(available_riders.clone()))
            .expect("register available_riders");
        registry
            .register(Box::new(propagation_events_total.clone()))
            .expect("register propagation_events_total");
        registry
            .register(Box::new(orders_resynced_total.clone()))
            .expect("register orders_resynced_total");
        registry
            .register(Box::new(propagation_checkpoint.clone()))
            .expect("register propagation_checkpoint");

        Self {
            registry,
            assignments_total,
            assignment_latency_seconds,
            available_riders,
            propagation_events_total,
            orders_resynced_total,
            propagation_checkpoint,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
