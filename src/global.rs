//! Process-wide convenience handle.
//!
//! All state lives in the [`Shipper`] instance; these free functions are
//! thin bindings over a possibly-null handle and behave identically to
//! calling the instance directly.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::{CaptureOutcome, DropReason};
use crate::shipper::Shipper;
use crate::types::{Breadcrumb, Level};

static HANDLE: Lazy<RwLock<Option<Arc<Shipper>>>> = Lazy::new(|| RwLock::new(None));

/// Install the process-wide handle, replacing any previous one.
pub fn install(shipper: Arc<Shipper>) {
    *HANDLE.write().expect("global handle") = Some(shipper);
}

/// Remove the process-wide handle.
pub fn uninstall() {
    *HANDLE.write().expect("global handle") = None;
}

/// The installed handle, if any.
pub fn handle() -> Option<Arc<Shipper>> {
    HANDLE.read().expect("global handle").clone()
}

/// Capture an error through the global handle.
pub async fn capture_error<E>(error: &E) -> CaptureOutcome
where
    E: std::error::Error + ?Sized,
{
    match handle() {
        Some(shipper) => shipper.capture_error(error).await,
        None => CaptureOutcome::Dropped(DropReason::NotInitialized),
    }
}

/// Capture an error with extra context through the global handle.
pub async fn capture_error_with_context<E>(
    error: &E,
    context: HashMap<String, Value>,
) -> CaptureOutcome
where
    E: std::error::Error + ?Sized,
{
    match handle() {
        Some(shipper) => shipper.capture_error_with_context(error, context).await,
        None => CaptureOutcome::Dropped(DropReason::NotInitialized),
    }
}

/// Capture a message through the global handle.
pub async fn capture_message(message: &str, level: Level) -> CaptureOutcome {
    match handle() {
        Some(shipper) => shipper.capture_message(message, level).await,
        None => CaptureOutcome::Dropped(DropReason::NotInitialized),
    }
}

/// Record a breadcrumb through the global handle; a no-op when absent.
pub fn add_breadcrumb(crumb: Breadcrumb) {
    if let Some(shipper) = handle() {
        shipper.add_breadcrumb(crumb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_without_a_handle_report_not_initialized() {
        uninstall();
        let outcome = capture_message("nobody home", Level::Info).await;
        assert_eq!(
            outcome,
            CaptureOutcome::Dropped(DropReason::NotInitialized)
        );
    }
}
