//! Status code classification.
//!
//! Maps a raw numeric HTTP status into a semantic class, and from there into
//! the error taxonomy. Classification is total: every `u16` lands in exactly
//! one variant, with exact values matched before their surrounding ranges.

use crate::errors::RequestError;

/// Semantic classification of a numeric HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    Created,
    NoContent,
    /// Any other 2xx.
    Success(u16),
    NotModified,
    /// Any other 3xx.
    Redirected(u16),
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    /// Any other 4xx.
    ClientError(u16),
    /// Any 5xx.
    ServerError(u16),
    /// Outside every documented range.
    Unknown(u16),
}

impl StatusClass {
    /// Classify a raw status code. Exact values win over ranges.
    pub fn from_code(code: u16) -> Self {
        match code {
            200 => StatusClass::Ok,
            201 => StatusClass::Created,
            204 => StatusClass::NoContent,
            200..=299 => StatusClass::Success(code),
            304 => StatusClass::NotModified,
            300..=399 => StatusClass::Redirected(code),
            400 => StatusClass::BadRequest,
            401 => StatusClass::Unauthorized,
            403 => StatusClass::Forbidden,
            404 => StatusClass::NotFound,
            400..=499 => StatusClass::ClientError(code),
            500..=599 => StatusClass::ServerError(code),
            _ => StatusClass::Unknown(code),
        }
    }

    /// The error this class maps to, if any. 2xx/3xx classes (and codes
    /// outside every range) map to no error.
    pub fn to_error(self) -> Option<RequestError> {
        match self {
            StatusClass::Ok
            | StatusClass::Created
            | StatusClass::NoContent
            | StatusClass::Success(_)
            | StatusClass::NotModified
            | StatusClass::Redirected(_)
            | StatusClass::Unknown(_) => None,
            StatusClass::BadRequest => Some(RequestError::BadRequest),
            StatusClass::Unauthorized => Some(RequestError::Unauthorized),
            StatusClass::Forbidden => Some(RequestError::Forbidden),
            StatusClass::NotFound => Some(RequestError::NotFound),
            StatusClass::ClientError(code) => Some(RequestError::ClientError(code)),
            StatusClass::ServerError(code) => Some(RequestError::ServerError(code)),
        }
    }

    /// True for any 2xx class.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            StatusClass::Ok | StatusClass::Created | StatusClass::NoContent | StatusClass::Success(_)
        )
    }
}
