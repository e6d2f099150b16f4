//! Counters and histograms for the print ledger.
//!
//! - `printctl_settlements_total{outcome}`: settlement attempts by outcome
//! - `printctl_reconciliations_total{outcome}`: webhook deliveries by outcome
//! - `printctl_page_units_total{direction}`: page units debited, credited and refunded
//! - `printctl_conversion_duration_seconds{strategy,result}`: document normalization attempts

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::pricing::PageUnits;

#[derive(Clone)]
pub struct LedgerMetrics {
    settlements: IntCounterVec,
    reconciliations: IntCounterVec,
    page_units: IntCounterVec,
    conversion_duration: HistogramVec,
    registry: Registry,
}

impl LedgerMetrics {
    /// Create the instruments and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let settlements = IntCounterVec::new(
            Opts::new("printctl_settlements_total", "Print job settlement attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(settlements.clone()))?;

        let reconciliations = IntCounterVec::new(
            Opts::new("printctl_reconciliations_total", "Payment webhook deliveries by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(reconciliations.clone()))?;

        let page_units = IntCounterVec::new(
            Opts::new("printctl_page_units_total", "Page units moved through the ledger"),
            &["direction"],
        )?;
        registry.register(Box::new(page_units.clone()))?;

        // Office conversions range from sub-second to the engine timeout
        let buckets = vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0, 160.0];
        let conversion_duration = HistogramVec::new(
            HistogramOpts::new("printctl_conversion_duration_seconds", "Document normalization duration").buckets(buckets),
            &["strategy", "result"],
        )?;
        registry.register(Box::new(conversion_duration.clone()))?;

        Ok(Self {
            settlements,
            reconciliations,
            page_units,
            conversion_duration,
            registry: registry.clone(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_settlement(&self, outcome: &str) {
        self.settlements.with_label_values(&[outcome]).inc();
    }

    pub fn record_reconciliation(&self, outcome: &str) {
        self.reconciliations.with_label_values(&[outcome]).inc();
    }

    /// `direction` is one of `debit`, `credit` or `refund`
    pub fn record_page_units(&self, direction: &str, units: PageUnits) {
        if let Ok(units) = u64::try_from(units) {
            self.page_units.with_label_values(&[direction]).inc_by(units);
        }
    }

    pub fn record_conversion(&self, strategy: &str, success: bool, duration_seconds: f64) {
        let result = if success { "success" } else { "failure" };
        self.conversion_duration
            .with_label_values(&[strategy, result])
            .observe(duration_seconds);
    }

    /// Render every metric in the registry in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
