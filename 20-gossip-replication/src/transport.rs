//! Delivery of one notification to one peer.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::message::Notification;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {peer} failed: {source}")]
    Request {
        peer: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("peer {peer} answered with status {status}")]
    Status {
        peer: String,
        status: reqwest::StatusCode,
    },
    #[error("peer {0} is unreachable")]
    Unreachable(String),
}

/// Outbound half of the reconciliation protocol.
///
/// Pushes are fire-and-forget from the caller's perspective: an `Ok` only
/// means the peer received the message, not that it accepted the state.
pub trait Transport: Send + Sync + 'static {
    fn push(
        &self,
        peer: &str,
        notification: Notification,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Posts notifications as JSON to `http://{peer}/notify`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn push(&self, peer: &str, notification: Notification) -> Result<(), TransportError> {
        let response = self
            .client
            .post(format!("http://{peer}/notify"))
            .json(&notification)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                peer: peer.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                peer: peer.to_string(),
                status,
            });
        }
        Ok(())
    }
}
