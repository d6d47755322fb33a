//! Shared test fixtures: a scriptable recording transport and config
//! presets that keep timing-sensitive knobs out of individual tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Read;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use error_shipper::{
    BatchEnvelope,
    Encoding,
    ErrorReport,
    FailureReason,
    ShipperConfig,
    Transport,
    WebhookRequest,
};

/// Records every request and replays a scripted outcome per call; the
/// default outcome applies once the script runs dry.
pub struct RecordingTransport {
    script: Mutex<VecDeque<Result<(), FailureReason>>>,
    default: Mutex<Result<(), FailureReason>>,
    requests: Mutex<Vec<WebhookRequest>>,
}

impl RecordingTransport {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(Ok(())),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(reason: FailureReason) -> Arc<Self> {
        let transport = Self::ok();
        transport.set_default(Err(reason));
        transport
    }

    pub fn set_default(&self, outcome: Result<(), FailureReason>) {
        *self.default.lock().unwrap() = outcome;
    }

    pub fn push_script(&self, outcome: Result<(), FailureReason>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Bodies decoded to JSON, gunzipping where the encoding requires it.
    pub fn decoded_bodies(&self) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| {
                let raw = match request.encoding {
                    Encoding::Identity => request.body.clone(),
                    Encoding::Gzip => {
                        let mut decoder = flate2::read::GzDecoder::new(request.body.as_slice());
                        let mut out = Vec::new();
                        decoder.read_to_end(&mut out).expect("gunzip");
                        out
                    }
                };
                serde_json::from_slice(&raw).expect("json body")
            })
            .collect()
    }

    /// Report messages in send order, flattening envelopes.
    pub fn sent_messages(&self) -> Vec<String> {
        self.decoded_bodies()
            .into_iter()
            .flat_map(|value| {
                if let Ok(envelope) = serde_json::from_value::<BatchEnvelope>(value.clone()) {
                    envelope.reports.into_iter().map(|r| r.message).collect::<Vec<_>>()
                } else {
                    let report: ErrorReport = serde_json::from_value(value).expect("report body");
                    vec![report.message]
                }
            })
            .collect()
    }

    /// Envelope bodies only, in send order.
    pub fn envelopes(&self) -> Vec<BatchEnvelope> {
        self.decoded_bodies()
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect()
    }

    pub fn raw_requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, request: &WebhookRequest) -> Result<(), FailureReason> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.lock().unwrap().clone())
    }
}

/// Direct-send configuration: no batching, compression off so bodies are
/// directly inspectable, and a roomy batch byte cap so only count/time
/// triggers fire in batching tests.
pub fn test_config() -> ShipperConfig {
    ShipperConfig {
        enable_batching: false,
        enable_compression: false,
        max_batch_payload_size: 10 * 1024 * 1024,
        ..ShipperConfig::new("https://ingest.example.com/hook", "demo")
            .with_environment("test")
    }
}
