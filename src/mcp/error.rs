// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Error codes and the typed failure a tool handler may raise.

use std::fmt;

use thiserror::Error;

use super::types::{INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};

/// Closed set of failure kinds a response can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The frame was not valid JSON.
    ParseError,
    /// The frame was JSON but not a valid JSON-RPC request.
    InvalidRequest,
    /// Unknown method or unknown tool.
    MethodNotFound,
    /// Arguments failed schema or domain validation.
    InvalidParams,
    /// Any other failure while handling the request.
    InternalError,
}

impl ErrorCode {
    /// The JSON-RPC wire code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => PARSE_ERROR,
            Self::InvalidRequest => INVALID_REQUEST,
            Self::MethodNotFound => METHOD_NOT_FOUND,
            Self::InvalidParams => INVALID_PARAMS,
            Self::InternalError => INTERNAL_ERROR,
        }
    }

    /// Maps a wire code back to its variant.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            PARSE_ERROR => Some(Self::ParseError),
            INVALID_REQUEST => Some(Self::InvalidRequest),
            METHOD_NOT_FOUND => Some(Self::MethodNotFound),
            INVALID_PARAMS => Some(Self::InvalidParams),
            INTERNAL_ERROR => Some(Self::InternalError),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ParseError => "PARSE_ERROR",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::MethodNotFound => "METHOD_NOT_FOUND",
            Self::InvalidParams => "INVALID_PARAMS",
            Self::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// A failure with a protocol error code attached.
///
/// Handlers return `anyhow::Error`; when the underlying error is a
/// `ToolError` the dispatcher forwards its code and message unchanged.
/// Anything else becomes [`ErrorCode::InternalError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ToolError {
    /// The error code reported to the client.
    pub code: ErrorCode,
    /// Human-readable message reported to the client.
    pub message: String,
}

impl ToolError {
    /// Creates a failure with an explicit code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for [`ErrorCode::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    /// Shorthand for [`ErrorCode::MethodNotFound`].
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MethodNotFound, message)
    }

    /// Shorthand for [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_json_rpc() {
        assert_eq!(ErrorCode::ParseError.code(), -32700);
        assert_eq!(ErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(ErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(ErrorCode::InvalidParams.code(), -32602);
        assert_eq!(ErrorCode::InternalError.code(), -32603);
    }

    #[test]
    fn test_from_code() {
        assert_eq!(ErrorCode::from_code(-32602), Some(ErrorCode::InvalidParams));
        assert_eq!(ErrorCode::from_code(42), None);
    }

    #[test]
    fn test_tool_error_survives_anyhow() {
        let err: anyhow::Error = ToolError::invalid_params("bad ticker").into();
        let typed = err.downcast_ref::<ToolError>();
        assert_eq!(
            typed.map(|e| e.code),
            Some(ErrorCode::InvalidParams),
            "typed failure should be recoverable from anyhow"
        );
        assert_eq!(err.to_string(), "bad ticker");
    }

    #[test]
    fn test_display_includes_number() {
        assert_eq!(
            ErrorCode::MethodNotFound.to_string(),
            "METHOD_NOT_FOUND (-32601)"
        );
    }
}
