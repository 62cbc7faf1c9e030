use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use metrics::{Unit, counter, describe_counter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const ROUTE_DECISIONS_METRIC: &str = "quota_router_route_decisions_total";
pub const TARGETS_CREATED_METRIC: &str = "quota_router_targets_created_total";
pub const STORAGE_ERRORS_METRIC: &str = "quota_router_storage_errors_total";

pub const DECISION_SELECTED: &str = "selected";
pub const DECISION_REJECT: &str = "reject";

const DEFAULT_METRICS_PORT: u16 = 9464;

pub fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_METRICS_PORT)
}

pub fn start_prometheus_exporter(listen_addr: SocketAddr) -> Result<(), BuildError> {
    describe_counter!(
        ROUTE_DECISIONS_METRIC,
        Unit::Count,
        "Visitor routing outcomes, labelled by decision."
    );
    describe_counter!(
        TARGETS_CREATED_METRIC,
        Unit::Count,
        "Targets appended to the store."
    );
    describe_counter!(
        STORAGE_ERRORS_METRIC,
        Unit::Count,
        "Target store operations that failed."
    );

    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
}

pub fn record_route_decision(decision: &'static str) {
    counter!(ROUTE_DECISIONS_METRIC, "decision" => decision).increment(1);
}

pub fn record_target_created() {
    counter!(TARGETS_CREATED_METRIC).increment(1);
}

pub fn record_storage_error() {
    counter!(STORAGE_ERRORS_METRIC).increment(1);
}
