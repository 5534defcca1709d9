/// Metrics and telemetry for Credit Meter
///
/// Prometheus-compatible counters for ledger traffic and admin actions,
/// exposed in text format at `/metrics`.

use crate::error::{MeterError, MeterResult};
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    /// Ledger calls by operation and outcome (ok, exhausted, rejected, error)
    pub static ref LEDGER_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ledger_operations_total",
        "Total number of credit ledger operations",
        &["operation", "outcome"]
    )
    .unwrap();

    /// Units added by grants
    pub static ref LEDGER_UNITS_GRANTED_TOTAL: IntCounter = register_int_counter!(
        "ledger_units_granted_total",
        "Total credit units granted"
    )
    .unwrap();

    /// Units consumed by successful ticks
    pub static ref LEDGER_UNITS_CONSUMED_TOTAL: IntCounter = register_int_counter!(
        "ledger_units_consumed_total",
        "Total credit units consumed"
    )
    .unwrap();

    /// Admin actions by kind
    pub static ref ADMIN_ACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "admin_actions_total",
        "Total number of admin actions",
        &["action"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> MeterResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| MeterError::Internal(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer).map_err(|e| MeterError::Internal(format!("Metrics are not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_ledger_counters() {
        LEDGER_OPERATIONS_TOTAL
            .with_label_values(&["tick", "ok"])
            .inc();
        LEDGER_UNITS_CONSUMED_TOTAL.inc();

        let text = render_metrics().unwrap();
        assert!(text.contains("ledger_operations_total"));
        assert!(text.contains("ledger_units_consumed_total"));
    }
}
