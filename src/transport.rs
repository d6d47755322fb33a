//! The HTTP seam.
//!
//! The pipeline talks to a [`Transport`] trait so tests can inject
//! recording or failing transports; the real implementation posts with
//! `reqwest` behind the `http` feature.

use std::time::Duration;

use async_trait::async_trait;

use crate::compress::Encoding;
use crate::error::FailureReason;

/// Everything a transport needs to perform one POST.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: String,
    pub body: Vec<u8>,
    pub encoding: Encoding,
    pub timeout: Duration,
}

/// One delivery attempt. Implementations classify the result themselves;
/// the retry executor decides what is worth another attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: &WebhookRequest) -> Result<(), FailureReason>;
}

/// Map an HTTP status to a delivery outcome.
///
/// Anything below 400 is success. 400, 401, 403 and 404 carry a
/// definitive rejection; every other failure status may be transient.
pub fn classify_status(status: u16) -> Result<(), FailureReason> {
    match status {
        s if s < 400 => Ok(()),
        400 | 401 | 403 | 404 => Err(FailureReason::ClientError),
        _ => Err(FailureReason::RemoteError),
    }
}

#[cfg(feature = "http")]
pub use http_transport::HttpTransport;

#[cfg(feature = "http")]
mod http_transport {
    use super::*;

    const USER_AGENT: &str = concat!("error-shipper/", env!("CARGO_PKG_VERSION"));

    /// Production transport over `reqwest`.
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        pub fn new() -> Self {
            Self {
                client: reqwest::Client::new(),
            }
        }
    }

    impl Default for HttpTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn post(&self, request: &WebhookRequest) -> Result<(), FailureReason> {
            let mut builder = self
                .client
                .post(&request.url)
                .timeout(request.timeout)
                .header("User-Agent", USER_AGENT)
                .header("Content-Type", request.encoding.content_type())
                .body(request.body.clone());

            if let Some(encoding) = request.encoding.content_encoding() {
                builder = builder.header("Content-Encoding", encoding);
            }

            match builder.send().await {
                Ok(response) => classify_status(response.status().as_u16()),
                Err(err) => {
                    if err.is_timeout() {
                        Err(FailureReason::Timeout)
                    } else {
                        Err(FailureReason::Network)
                    }
                }
            }
        }
    }
}
