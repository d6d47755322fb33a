//! Feature-gated observability shims.
//!
//! Both `metrics` and `tracing` are optional; with the features off these
//! compile to no-ops and the crate stays dependency-free on both stacks.

#[cfg(feature = "metrics")]
pub(crate) fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn metric_inc(_name: &'static str) {}

#[cfg(feature = "metrics")]
pub(crate) fn metric_add(name: &'static str, value: u64) {
    metrics::counter!(name, value);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn metric_add(_name: &'static str, _value: u64) {}

#[cfg(feature = "metrics")]
pub(crate) fn metric_inc_reason(name: &'static str, reason: &str) {
    metrics::increment_counter!(name, "reason" => reason.to_string());
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn metric_inc_reason(_name: &'static str, _reason: &str) {}

#[cfg(feature = "tracing")]
pub(crate) fn trace_event(message: &'static str) {
    tracing::info!(message);
}

#[cfg(not(feature = "tracing"))]
pub(crate) fn trace_event(_message: &'static str) {}

#[cfg(feature = "tracing")]
pub(crate) fn trace_warn(message: &str) {
    tracing::warn!(message);
}

#[cfg(not(feature = "tracing"))]
pub(crate) fn trace_warn(_message: &str) {}

#[cfg(feature = "tracing")]
pub(crate) fn trace_debug(message: &str) {
    tracing::debug!(message);
}

#[cfg(not(feature = "tracing"))]
pub(crate) fn trace_debug(_message: &str) {}
