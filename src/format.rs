//! Report assembly helpers: stack-frame scanning and host snapshots.

use std::backtrace::Backtrace;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::RuntimeInfo;

/// File placeholder when no frame can be parsed.
pub const UNKNOWN_FILE: &str = "unknown";

/// Frame shapes recognized in stack text, tried in order per line:
/// `at func (file:line:col)` / `at file:line:col`, `func@file:line:col`,
/// and a bare `file:line:col`.
static FRAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"at (?:.{0,256}? \()?([^()\s]{1,512}):([0-9]{1,9}):[0-9]{1,9}\)?")
            .expect("frame pattern"),
        Regex::new(r"[^@\s]{1,256}@([^@\s]{1,512}):([0-9]{1,9}):[0-9]{1,9}")
            .expect("frame pattern"),
        Regex::new(r"^\s*([^\s]{1,512}):([0-9]{1,9}):[0-9]{1,9}")
            .expect("frame pattern"),
    ]
});

/// Extract `(file, line)` from the first recognizable stack frame.
///
/// Returns `("unknown", 0)` when nothing in the text looks like a frame;
/// a scan failure never fails the report.
pub fn scan_stack(stack: &str) -> (String, u32) {
    for line in stack.lines() {
        for pattern in FRAME_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(line) {
                let file = captures.get(1).map(|m| m.as_str()).unwrap_or(UNKNOWN_FILE);
                let line_no = captures
                    .get(2)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .unwrap_or(0);
                return (file.to_string(), line_no);
            }
        }
    }
    (UNKNOWN_FILE.to_string(), 0)
}

/// Capture the current call stack as text.
pub fn capture_stack() -> String {
    Backtrace::force_capture().to_string()
}

/// Snapshot of the host process.
pub fn runtime_snapshot() -> RuntimeInfo {
    RuntimeInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        hostname: std::env::var("HOSTNAME").ok(),
        sdk_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}
