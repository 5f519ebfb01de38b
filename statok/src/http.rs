//! Abstraction over the HTTP client used for frame delivery.
//!
//! The sender only ever issues one kind of request, so the seam is a single
//! method rather than a general request builder. The default implementation
//! wraps [`reqwest`]; tests and embedders with special transport needs can
//! substitute their own.

use std::future::Future;
use std::pin::Pin;

/// Future returned by [`HttpTransport::post`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<u16, HttpError>> + Send + 'a>>;

/// An error from the delivery transport.
///
/// Transport errors never reach the reporting application; the sender
/// retries internally and eventually discards the frame.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request could not be performed.
    #[error("could not send request")]
    Reqwest(#[from] reqwest::Error),

    /// The collector answered with a non-success status.
    #[error("delivery rejected with status {0}")]
    Status(u16),
}

/// The HTTP capability the sender requires.
pub trait HttpTransport: Send + Sync + 'static {
    /// POSTs `body` to `url` on behalf of `api_key` and resolves to the
    /// response status code.
    fn post<'a>(&'a self, url: &'a str, api_key: &'a str, body: &'a [u8]) -> TransportFuture<'a>;
}

/// The production transport, backed by a [`reqwest::Client`].
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default client.
    pub fn new() -> Result<Self, HttpError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn post<'a>(&'a self, url: &'a str, api_key: &'a str, body: &'a [u8]) -> TransportFuture<'a> {
        let request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {api_key}"))
            .body(body.to_vec());

        Box::pin(async move {
            let response = request.send().await?;
            Ok(response.status().as_u16())
        })
    }
}
