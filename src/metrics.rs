use metrics::{Unit, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const QUOTE_REQUESTS: &str = "matcher_requests_total";
pub const QUOTE_REJECTIONS: &str = "matcher_rejections_total";
pub const BOOK_UPDATES: &str = "matcher_book_updates_total";
pub const EXECUTIONS: &str = "matcher_executions_total";
pub const EXECUTION_FAILURES: &str = "matcher_execution_failures_total";

pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_counter!(QUOTE_REQUESTS, Unit::Count, "Quote requests answered");
    describe_counter!(QUOTE_REJECTIONS, Unit::Count, "Quote requests rejected by policy or missing book");
    describe_counter!(BOOK_UPDATES, Unit::Count, "Order book snapshots that replaced the previous one");
    describe_counter!(EXECUTIONS, Unit::Count, "Execute requests taken through settlement");
    describe_counter!(EXECUTION_FAILURES, Unit::Count, "Execute requests that did not settle");
    Ok(handle)
}
