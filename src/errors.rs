//! Closed error taxonomy for the request engine.
//!
//! Every terminal failure in the pipeline is exactly one of these kinds,
//! whether it happened while building the request, during transport, or
//! while interpreting the response. Callers only need a single error
//! handling path.

/// Terminal failure of a single request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The url string could not be parsed into a network address.
    #[error("invalid url")]
    InvalidUrl,

    /// No connectivity, or the connection was lost mid-flight.
    #[error("network unavailable")]
    NetworkUnavailable,

    /// The transport gave up waiting for the remote end.
    #[error("connection timed out")]
    ConnectionTimedOut,

    #[error("bad request (400)")]
    BadRequest,

    #[error("unauthorized (401)")]
    Unauthorized,

    #[error("forbidden (403)")]
    Forbidden,

    #[error("not found (404)")]
    NotFound,

    /// Any other 4xx status.
    #[error("client error ({0})")]
    ClientError(u16),

    /// Any 5xx status.
    #[error("server error ({0})")]
    ServerError(u16),

    /// The transport produced something that is not an HTTP response.
    #[error("unexpected response shape")]
    UnexpectedResponseShape,

    /// The request parameters could not be serialized into a body.
    #[error("params failed to serialize: {0}")]
    ParamsSerialization(#[source] serde_json::Error),

    /// The response body could not be decoded into the requested type.
    #[error("body failed to decode: {0}")]
    BodyDecode(#[source] serde_json::Error),

    /// Any other transport-level fault.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// A body was required but the response carried none.
    #[error("no body available")]
    NoBodyAvailable,
}
