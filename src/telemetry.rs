//! Metric names and recording helpers.
//!
//! Nothing is exported unless the host process installs a `metrics` recorder.

use metrics::{counter, describe_counter};

/// Register descriptions for all metrics.
pub fn register_metric_descriptions() {
    describe_counter!(
        "ewelink_payloads_sent_total",
        "Total number of parameter payloads delivered to devices"
    );
    describe_counter!(
        "ewelink_payload_failures_total",
        "Total number of payloads the platform failed to deliver"
    );
    describe_counter!(
        "ewelink_echoes_applied_total",
        "Total number of device updates that changed cached state"
    );
    describe_counter!(
        "ewelink_echoes_suppressed_total",
        "Total number of device updates dropped inside a suppression window"
    );
    describe_counter!(
        "ewelink_edits_superseded_total",
        "Total number of local edits dropped because a newer edit arrived during settle"
    );
}

pub struct Metrics;

impl Metrics {
    pub fn inc_payloads_sent(device_type: &str) {
        counter!("ewelink_payloads_sent_total", "type" => device_type.to_string()).increment(1);
    }

    pub fn inc_payload_failures(device_type: &str) {
        counter!("ewelink_payload_failures_total", "type" => device_type.to_string())
            .increment(1);
    }

    pub fn inc_echoes_applied(device_type: &str) {
        counter!("ewelink_echoes_applied_total", "type" => device_type.to_string()).increment(1);
    }

    pub fn inc_echoes_suppressed(device_type: &str) {
        counter!("ewelink_echoes_suppressed_total", "type" => device_type.to_string())
            .increment(1);
    }

    pub fn inc_edits_superseded(device_type: &str) {
        counter!("ewelink_edits_superseded_total", "type" => device_type.to_string())
            .increment(1);
    }
}
