use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub bids_total: IntCounterVec,
    pub settlements_total: IntCounterVec,
    pub open_orders: IntGauge,
    pub platform_revenue: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bids_total = IntCounterVec::new(
            Opts::new("bids_total", "Total bids by outcome"),
            &["outcome"],
        )
        .expect("valid bids_total metric");

        let settlements_total = IntCounterVec::new(
            Opts::new("settlements_total", "Total per-courier settlements by outcome"),
            &["outcome"],
        )
        .expect("valid settlements_total metric");

        let open_orders = IntGauge::new("open_orders", "Current number of open orders")
            .expect("valid open_orders metric");

        let platform_revenue = Gauge::new(
            "platform_revenue",
            "System wallet balance accumulated from platform fees",
        )
        .expect("valid platform_revenue metric");

        registry
            .register(Box::new(bids_total.clone()))
            .expect("register bids_total");
        registry
            .register(Box::new(settlements_total.clone()))
            .expect("register settlements_total");
        registry
            .register(Box::new(open_orders.clone()))
            .expect("register open_orders");
        registry
            .register(Box::new(platform_revenue.clone()))
            .expect("register platform_revenue");

        Self {
            registry,
            bids_total,
            settlements_total,
            open_orders,
            platform_revenue,
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
