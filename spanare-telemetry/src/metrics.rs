//! ## spanare-telemetry::metrics
//! **Prometheus gauges mirroring the status snapshot**

use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use spanare_core::status::StatusSnapshot;

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    packets_processed: IntGauge,
    requests_failed: IntGauge,
    errors: IntGauge,
    buffer_full: IntGauge,
    buffer_fill: IntGauge,
    active_workers: IntGauge,
    worker_restarts: IntGauge,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let gauge = |name: &str, help: &str| -> Result<IntGauge, prometheus::Error> {
            let g = IntGauge::new(name, help)?;
            registry.register(Box::new(g.clone()))?;
            Ok(g)
        };

        Ok(Self {
            packets_processed: gauge(
                "spanare_packets_processed",
                "Records placed in the ring buffer",
            )?,
            requests_failed: gauge("spanare_requests_failed", "Failed endpoint requests")?,
            errors: gauge("spanare_errors", "Rejected records and unparseable responses")?,
            buffer_full: gauge("spanare_buffer_full", "Records dropped on a full ring")?,
            buffer_fill: gauge("spanare_buffer_fill", "Records currently buffered")?,
            active_workers: gauge("spanare_active_workers", "Running poll workers")?,
            worker_restarts: gauge("spanare_worker_restarts", "Workers respawned by the watchdog")?,
            registry,
        })
    }

    /// Copies a snapshot into the gauges.
    pub fn observe(&self, snapshot: &StatusSnapshot) {
        let set = |g: &IntGauge, v: u64| g.set(i64::try_from(v).unwrap_or(i64::MAX));
        set(&self.packets_processed, snapshot.packets_processed);
        set(&self.requests_failed, snapshot.requests_failed);
        set(&self.errors, snapshot.error_count);
        set(&self.buffer_full, snapshot.buffer_full_count);
        set(&self.buffer_fill, snapshot.buffer_fill);
        set(&self.active_workers, snapshot.active_workers);
        set(&self.worker_restarts, snapshot.worker_restarts);
    }

    /// Renders the registry in the Prometheus text format.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
