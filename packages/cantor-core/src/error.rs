//! Centralized error types for the Cantor core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses
//!
//! Domain errors live next to the code that produces them
//! ([`ResolveError`], [`TransportError`], [`SessionError`], [`EnqueueError`])
//! and are re-exported here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub use crate::resolver::{ResolveError, ResolveResult};
pub use crate::service::EnqueueError;
pub use crate::session::SessionError;
pub use crate::transport::{TransportError, TransportResult};

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for ResolveError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => "unsupported_reference",
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_) => "http_error_status",
            Self::NoMedia(_) => "no_media",
        }
    }
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect_failed",
            Self::Play(_) => "play_failed",
            Self::Stream(_) => "stream_failed",
            Self::CompletionDropped => "completion_dropped",
        }
    }
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoActiveTrack => "no_active_track",
        }
    }
}

impl ErrorCode for EnqueueError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoChannelJoined => "no_channel_joined",
            Self::Resolution(_) => "resolution_failed",
        }
    }
}

/// Application-wide error type for the Cantor server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum CantorError {
    /// The reference could not be resolved to a playable track.
    #[error("Could not resolve media: {0}")]
    Resolution(String),

    /// The request did not name a channel to play into.
    #[error("You must be in a channel to use this command")]
    NoChannelJoined,

    /// Loop toggled with nothing playing.
    #[error("No track is currently playing")]
    NoActiveTrack,

    /// Channel has never been used.
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CantorError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Resolution(_) => "resolution_failed",
            Self::NoChannelJoined => "no_channel_joined",
            Self::NoActiveTrack => "no_active_track",
            Self::ChannelNotFound(_) => "channel_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ChannelNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) | Self::NoChannelJoined => StatusCode::BAD_REQUEST,
            Self::NoActiveTrack => StatusCode::CONFLICT,
            Self::Resolution(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type CantorResult<T> = Result<T, CantorError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for CantorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ResolveError> for CantorError {
    fn from(err: ResolveError) -> Self {
        Self::Resolution(err.to_string())
    }
}

impl From<SessionError> for CantorError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NoActiveTrack => Self::NoActiveTrack,
        }
    }
}

impl From<EnqueueError> for CantorError {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::NoChannelJoined => Self::NoChannelJoined,
            EnqueueError::Resolution(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_channel_joined_is_bad_request() {
        let err: CantorError = EnqueueError::NoChannelJoined.into();
        assert_eq!(err.code(), "no_channel_joined");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn resolution_error_keeps_message() {
        let err: CantorError = EnqueueError::Resolution(ResolveError::HttpStatus(404)).into();
        assert_eq!(err.code(), "resolution_failed");
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn no_active_track_maps_to_conflict() {
        let err: CantorError = SessionError::NoActiveTrack.into();
        assert_eq!(err.code(), "no_active_track");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn domain_error_codes_are_stable() {
        assert_eq!(TransportError::CompletionDropped.code(), "completion_dropped");
        assert_eq!(
            ResolveError::Unsupported("x".into()).code(),
            "unsupported_reference"
        );
    }
}
