//! Threshold-gated gzip for outbound bodies.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::observe;

/// Body encoding actually applied, which drives the outbound headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
}

impl Encoding {
    pub fn content_type(&self) -> &'static str {
        match self {
            Encoding::Identity => "application/json",
            Encoding::Gzip => "application/octet-stream",
        }
    }

    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Encoding::Identity => None,
            Encoding::Gzip => Some("gzip"),
        }
    }
}

/// Gzips bodies at or above a byte threshold; smaller bodies pass through.
///
/// An encoder failure falls back to the uncompressed body (logged once)
/// rather than failing delivery.
pub struct Compressor {
    enabled: bool,
    threshold: usize,
    failure_logged: AtomicBool,
}

impl Compressor {
    pub fn new(enabled: bool, threshold: usize) -> Self {
        Self {
            enabled,
            threshold,
            failure_logged: AtomicBool::new(false),
        }
    }

    pub fn encode(&self, body: Vec<u8>) -> (Vec<u8>, Encoding) {
        if !self.enabled || body.len() < self.threshold {
            return (body, Encoding::Identity);
        }

        match gzip(&body) {
            Ok(compressed) => (compressed, Encoding::Gzip),
            Err(e) => {
                if !self.failure_logged.swap(true, Ordering::Relaxed) {
                    observe::trace_warn(&format!("gzip failed, sending uncompressed: {}", e));
                }
                (body, Encoding::Identity)
            }
        }
    }
}

fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}
