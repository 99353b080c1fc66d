// ABOUTME: defines the stable error classification codes used on the wire.
// ABOUTME: also carries the request shape error raised by the payload normalizer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ExecutionTimeout,
    ExecutableNotFound,
    ExecutionFailed,
    ScratchIo,
    MalformedUpstreamResponse,
    RequestShape,
    PolicyDenied,
    AgentFailure,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ExecutionTimeout => "execution_timeout",
            ErrorCode::ExecutableNotFound => "executable_not_found",
            ErrorCode::ExecutionFailed => "execution_failed",
            ErrorCode::ScratchIo => "scratch_io",
            ErrorCode::MalformedUpstreamResponse => "malformed_upstream_response",
            ErrorCode::RequestShape => "request_shape",
            ErrorCode::PolicyDenied => "policy_denied",
            ErrorCode::AgentFailure => "agent_failure",
            ErrorCode::Internal => "internal",
        }
    }

    /// Text shown to the end user in place of the raw failure.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorCode::RequestShape => {
                "Error processing your request: the message could not be understood."
            }
            ErrorCode::AgentFailure | ErrorCode::MalformedUpstreamResponse => {
                "Error processing your request: the assistant is unavailable right now."
            }
            _ => "Error processing your request: something went wrong on our side.",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured failure attached to a single command result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RequestShapeError {
    #[error("request body is not valid json: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("request body must be a json object")]
    NotAnObject,
    #[error("`messages` must be an array")]
    MessagesNotArray,
    #[error("last message has no content")]
    MissingContent,
    #[error("invalid {variant} request: {source}")]
    Variant {
        variant: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl RequestShapeError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::RequestShape
    }
}
