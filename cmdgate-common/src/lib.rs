// ABOUTME: defines the shared command approval protocol used by cmdsh and cmdgated.
// ABOUTME: normalizes both request schemas and assembles responses in the caller's schema.

pub mod command;
pub mod error;
pub mod request;
pub mod response;

pub use command::{BrowserUrl, Command, CommandFile, ConversationTurn, Role, TurnData, UrlConfig};
pub use error::{ActionError, ErrorCode, RequestShapeError};
pub use request::{normalize, FlatRequest, NormalizedRequest, SchemaVersion, TranscriptRequest};
pub use response::{
    build, build_error, ErrorEnvelope, FlatResponse, LegacyCommand, Reply, ResponseEnvelope,
    TranscriptResponse,
};
