use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_messages_total",
        "Total messages received from MQTT"
    ))
    .unwrap();
    pub static ref TELEMETRY_APPLIED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_telemetry_applied_total",
        "Total telemetry messages applied to a known device"
    ))
    .unwrap();
    pub static ref MALFORMED_MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_malformed_messages_total",
        "Total messages dropped because topic or payload did not parse"
    ))
    .unwrap();
    pub static ref UNKNOWN_DEVICE_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_unknown_device_total",
        "Total telemetry messages for devices not in the roster"
    ))
    .unwrap();
    pub static ref QUEUE_FULL_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_queue_full_total",
        "Times the MQTT pump waited for room in the store queue"
    ))
    .unwrap();
    pub static ref ACTIVE_NOTIFICATIONS: Gauge = Gauge::with_opts(Opts::new(
        "dashboard_active_notifications",
        "Number of active operator notifications"
    ))
    .unwrap();
    pub static ref ROSTER_SIZE: Gauge = Gauge::with_opts(Opts::new(
        "dashboard_roster_size",
        "Number of devices in the roster"
    ))
    .unwrap();
}

static INIT: Once = Once::new();

pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY.register(Box::new(MESSAGES_TOTAL.clone())).unwrap();
        REGISTRY
            .register(Box::new(TELEMETRY_APPLIED_TOTAL.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(MALFORMED_MESSAGES_TOTAL.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(UNKNOWN_DEVICE_TOTAL.clone()))
            .unwrap();
        REGISTRY.register(Box::new(QUEUE_FULL_TOTAL.clone())).unwrap();
        REGISTRY
            .register(Box::new(ACTIVE_NOTIFICATIONS.clone()))
            .unwrap();
        REGISTRY.register(Box::new(ROSTER_SIZE.clone())).unwrap();
    });
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_after_init() {
        init_metrics();
        init_metrics();
        MESSAGES_TOTAL.inc();
        let text = gather_metrics();
        assert!(text.contains("dashboard_messages_total"));
        assert!(text.contains("dashboard_roster_size"));
    }
}
