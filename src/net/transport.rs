//! The transport seam.
//!
//! [`Transport`] is the one boundary between the engine and actual network
//! I/O. It takes a fully prepared request and resolves to a buffered
//! [`Response`] or a coarse [`TransportError`]. Keeping this object-safe
//! (boxed futures) lets tests substitute a stub transport and count
//! invocations.

use futures::future::BoxFuture;
use http::HeaderMap;

use crate::errors::RequestError;
use crate::request::{PreparedRequest, Verb};
use crate::status::StatusClass;

/// A fully buffered response as a transport handed it back.
///
/// Nothing here is interpreted: status and body are exactly what was
/// received, and classification into the error taxonomy is the engine's
/// job. The body is always read to completion before the response
/// surfaces; there is no streaming.
#[derive(Debug, Clone)]
pub struct Response {
    /// Url the response ultimately came from, after any redirects the
    /// transport followed.
    pub url: url::Url,

    /// Raw numeric status code.
    pub status: u16,

    /// Canonical reason phrase, `"Unknown"` for non-standard codes.
    pub status_text: String,

    pub headers: HeaderMap,

    /// Raw body bytes. The engine decodes these further only when a typed
    /// success handler asks for it.
    pub body: Vec<u8>,
}

impl Response {
    /// Semantic classification of the status code.
    pub fn status_class(&self) -> StatusClass {
        StatusClass::from_code(self.status)
    }
}

/// Transport-level fault, before any HTTP status exists.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// Could not reach the remote end at all.
    Unreachable,
    /// The remote end did not answer within the request timeout.
    TimedOut,
    /// The exchange produced something that could not be read as an HTTP
    /// response (e.g. the body stream broke mid-read).
    MalformedResponse,
    /// Anything else the transport reports.
    Other(String),
}

impl TransportError {
    pub fn into_request_error(self) -> RequestError {
        match self {
            TransportError::Unreachable => RequestError::NetworkUnavailable,
            TransportError::TimedOut => RequestError::ConnectionTimedOut,
            TransportError::MalformedResponse => RequestError::UnexpectedResponseShape,
            TransportError::Other(msg) => RequestError::TransportFailure(msg),
        }
    }
}

/// One network exchange: prepared request in, buffered response out.
pub trait Transport: Send + Sync {
    fn fetch(&self, request: PreparedRequest) -> BoxFuture<'static, Result<Response, TransportError>>;
}

/// Production transport backed by a shared [`reqwest::Client`].
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ReqwestTransport {
    fn fetch(&self, request: PreparedRequest) -> BoxFuture<'static, Result<Response, TransportError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut builder = match request.verb {
                Verb::Get => client.get(request.url.clone()),
                Verb::Post => client.post(request.url.clone()),
                Verb::Delete => client.delete(request.url.clone()),
                Verb::Put => client.put(request.url.clone()),
            };
            builder = builder.timeout(request.timeout);
            if let Some(body) = request.body {
                builder = builder
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(body);
            }

            let res = builder.send().await.map_err(classify_reqwest_error)?;

            let final_url = res.url().clone();
            let status = res.status().as_u16();
            let status_text = res
                .status()
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string();
            let headers = res.headers().clone();

            // Body is fully buffered; no streaming. A broken body stream
            // means the response as a whole is unusable.
            let body = res
                .bytes()
                .await
                .map_err(|_| TransportError::MalformedResponse)?
                .to_vec();

            Ok(Response {
                url: final_url,
                status,
                status_text,
                headers,
                body,
            })
        })
    }
}

/// Collapse a `reqwest::Error` into the coarse transport taxonomy.
fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::TimedOut
    } else if error.is_connect() {
        TransportError::Unreachable
    } else {
        TransportError::Other(error.to_string())
    }
}
