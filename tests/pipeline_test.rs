mod support;

use std::collections::HashMap;
use std::io::{Error as IoError, ErrorKind};
use std::time::Duration;

use error_shipper::{CaptureOutcome, DropReason, Level, Shipper, ShipperConfig};
use support::{test_config, RecordingTransport};

fn io_error(message: &str) -> IoError {
    IoError::new(ErrorKind::Other, message.to_string())
}

#[tokio::test(start_paused = true)]
async fn duplicate_errors_are_suppressed_within_the_window() {
    let transport = RecordingTransport::ok();
    let shipper = Shipper::builder(test_config())
        .transport(transport.clone())
        .build()
        .await;

    let outcome = shipper.capture_error(&io_error("boom")).await;
    assert_eq!(outcome, CaptureOutcome::Delivered);

    let outcome = shipper.capture_error(&io_error("boom")).await;
    assert_eq!(outcome, CaptureOutcome::Dropped(DropReason::DuplicateError));
    assert_eq!(transport.calls(), 1);

    tokio::time::advance(Duration::from_secs(6)).await;
    let outcome = shipper.capture_error(&io_error("boom")).await;
    assert_eq!(outcome, CaptureOutcome::Delivered);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn requests_beyond_the_window_cap_are_rate_limited() {
    let transport = RecordingTransport::ok();
    let shipper = Shipper::builder(test_config())
        .transport(transport.clone())
        .build()
        .await;

    for i in 0..10 {
        let outcome = shipper.capture_error(&io_error(&format!("error-{}", i))).await;
        assert_eq!(outcome, CaptureOutcome::Delivered);
    }

    let outcome = shipper.capture_error(&io_error("error-10")).await;
    assert_eq!(outcome, CaptureOutcome::Dropped(DropReason::RateLimited));
    assert_eq!(transport.calls(), 10);

    // Counters must not have advanced for the dropped capture.
    let stats = shipper.get_stats().await;
    assert_eq!(stats.rate_limit.window_count, 10);
    assert_eq!(stats.quota.daily_used, 10);
    assert_eq!(stats.health.errors_suppressed, 1);

    // Once the window rolls, the next capture admits again.
    tokio::time::advance(Duration::from_secs(61)).await;
    let outcome = shipper.capture_error(&io_error("error-11")).await;
    assert_eq!(outcome, CaptureOutcome::Delivered);
}

#[tokio::test(start_paused = true)]
async fn sensitive_context_never_reaches_the_wire() {
    let transport = RecordingTransport::ok();
    let shipper = Shipper::builder(test_config())
        .transport(transport.clone())
        .build()
        .await;

    let mut context = HashMap::new();
    context.insert("password".to_string(), serde_json::json!("hunter2"));
    context.insert("contact".to_string(), serde_json::json!("reach me at a@b.co"));

    let outcome = shipper
        .capture_error_with_context(&io_error("login failed"), context)
        .await;
    assert_eq!(outcome, CaptureOutcome::Delivered);

    let body = serde_json::to_string(&transport.decoded_bodies()[0]).unwrap();
    assert!(!body.contains("hunter2"));
    assert!(!body.contains("a@b.co"));

    let report = &transport.decoded_bodies()[0];
    assert_eq!(report["context"]["password"], "[REDACTED]");

    // The pre-redaction pattern hit surfaces as a warning.
    let stats = shipper.get_stats().await;
    assert!(stats.health.validation_warnings >= 1);
}

#[tokio::test(start_paused = true)]
async fn before_send_can_drop_or_rewrite_reports() {
    let transport = RecordingTransport::ok();
    let config = ShipperConfig {
        before_send: Some(std::sync::Arc::new(|mut report| {
            if report.message.contains("ignore") {
                return None;
            }
            report.message = format!("[filtered] {}", report.message);
            Some(report)
        })),
        ..test_config()
    };
    let shipper = Shipper::builder(config)
        .transport(transport.clone())
        .build()
        .await;

    let outcome = shipper.capture_error(&io_error("ignore me")).await;
    assert_eq!(outcome, CaptureOutcome::Dropped(DropReason::FilteredByHook));
    assert_eq!(transport.calls(), 0);

    let outcome = shipper.capture_error(&io_error("keep me")).await;
    assert_eq!(outcome, CaptureOutcome::Delivered);
    assert_eq!(transport.sent_messages(), vec!["[filtered] keep me"]);
}

#[tokio::test(start_paused = true)]
async fn disabled_shipper_drops_at_the_entry() {
    let transport = RecordingTransport::ok();
    let config = ShipperConfig { enabled: false, ..test_config() };
    let shipper = Shipper::builder(config)
        .transport(transport.clone())
        .build()
        .await;

    assert!(!shipper.is_enabled());
    let outcome = shipper.capture_message("nobody listens", Level::Error).await;
    assert_eq!(outcome, CaptureOutcome::Dropped(DropReason::Disabled));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_configuration_leaves_the_shipper_constructed_but_disabled() {
    let transport = RecordingTransport::ok();
    let config = ShipperConfig::new("http://plaintext.example.com", "demo")
        .with_environment("production");
    let shipper = Shipper::builder(config)
        .transport(transport.clone())
        .build()
        .await;

    assert!(!shipper.is_enabled());
    let outcome = shipper.capture_error(&io_error("boom")).await;
    assert_eq!(outcome, CaptureOutcome::Dropped(DropReason::Disabled));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn breadcrumbs_ride_along_oldest_first() {
    let transport = RecordingTransport::ok();
    let shipper = Shipper::builder(test_config())
        .transport(transport.clone())
        .build()
        .await;

    shipper.add_breadcrumb(error_shipper::Breadcrumb::new("opened page", "nav", Level::Info));
    shipper.add_breadcrumb(error_shipper::Breadcrumb::new("clicked pay", "ui", Level::Info));

    shipper.capture_error(&io_error("payment failed")).await;

    let body = &transport.decoded_bodies()[0];
    let crumbs = body["breadcrumbs"].as_array().unwrap();
    assert_eq!(crumbs.len(), 2);
    assert_eq!(crumbs[0]["message"], "opened page");
    assert_eq!(crumbs[1]["message"], "clicked pay");

    shipper.clear_breadcrumbs();
    shipper.capture_error(&io_error("second failure")).await;
    let body = &transport.decoded_bodies()[1];
    assert!(body.get("breadcrumbs").is_none());
}

#[tokio::test(start_paused = true)]
async fn user_and_context_are_attached_and_removable() {
    let transport = RecordingTransport::ok();
    let shipper = Shipper::builder(test_config())
        .transport(transport.clone())
        .build()
        .await;

    shipper.set_user(Some(error_shipper::UserInfo::with_id("user-1")));
    shipper.set_context("tenant", serde_json::json!("acme"));
    shipper.set_context("region", serde_json::json!("eu-1"));
    shipper.remove_context("region");

    shipper.capture_error(&io_error("boom")).await;

    let body = &transport.decoded_bodies()[0];
    assert_eq!(body["user"]["id"], "user-1");
    assert_eq!(body["context"]["tenant"], "acme");
    assert!(body["context"].get("region").is_none());
}

#[tokio::test(start_paused = true)]
async fn message_captures_carry_their_level() {
    let transport = RecordingTransport::ok();
    let shipper = Shipper::builder(test_config())
        .transport(transport.clone())
        .build()
        .await;

    let outcome = shipper.capture_message("deploy finished", Level::Warning).await;
    assert_eq!(outcome, CaptureOutcome::Delivered);

    let body = &transport.decoded_bodies()[0];
    assert_eq!(body["exceptionClass"], "Message");
    assert_eq!(body["context"]["level"], "warning");
}

#[tokio::test(start_paused = true)]
async fn every_capture_has_exactly_one_terminal_outcome() {
    let transport = RecordingTransport::ok();
    let shipper = Shipper::builder(test_config())
        .transport(transport.clone())
        .build()
        .await;

    let mut delivered = 0u64;
    let mut dropped = 0u64;
    for i in 0..15 {
        match shipper.capture_error(&io_error(&format!("e-{}", i))).await {
            CaptureOutcome::Delivered => delivered += 1,
            CaptureOutcome::Dropped(_) => dropped += 1,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    let stats = shipper.get_stats().await;
    assert_eq!(delivered, stats.health.errors_reported);
    assert_eq!(dropped, stats.health.errors_suppressed);
    assert_eq!(delivered + dropped, 15);
    let by_reason: u64 = stats.health.suppressed_by_reason.values().sum();
    assert_eq!(by_reason, dropped);
}
