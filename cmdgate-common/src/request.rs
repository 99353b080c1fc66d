// ABOUTME: decodes both inbound request schemas into one canonical normalized request.
// ABOUTME: the flat variant carries content at the top level, the transcript variant in messages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::{null_as_default, Command, ConversationTurn, Role, TurnData, UrlConfig};
use crate::error::RequestShapeError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVersion {
    Flat,
    Transcript,
}

impl SchemaVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaVersion::Flat => "flat",
            SchemaVersion::Transcript => "transcript",
        }
    }
}

/// Legacy request shape: content and identifiers at the top level.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct FlatRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(rename = "pastMessages", default, deserialize_with = "null_as_default")]
    pub past_messages: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_managed_memory: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: TurnData,
}

/// Transcript request shape: the current content is the last entry of `messages`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct TranscriptRequest {
    pub messages: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: TurnData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_managed_memory: Option<bool>,
}

/// Canonical request consumed by the daemon, independent of the wire schema.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    pub schema: SchemaVersion,
    pub content: String,
    pub cmds: Vec<Command>,
    pub executed_cmds: Vec<Command>,
    pub url_configs: Vec<UrlConfig>,
    pub thread_id: Option<String>,
    pub tenant_id: Option<String>,
    pub id: Option<String>,
    /// Top-level `platform_context` exactly as received, echoed on the response.
    pub platform_context: Option<Value>,
    /// Context handed to the agent: the last user message's, else the top-level one.
    pub agent_context: Option<Value>,
    pub agent_managed_memory: Option<bool>,
    /// `pastMessages` or `messages` exactly as received.
    pub messages: Vec<Value>,
    /// Prior turns, oldest first, excluding the current content.
    pub history: Vec<ConversationTurn>,
}

fn detect_schema(raw: &Value) -> Result<SchemaVersion, RequestShapeError> {
    let obj = raw.as_object().ok_or(RequestShapeError::NotAnObject)?;
    match obj.get("messages") {
        Some(Value::Array(_)) => Ok(SchemaVersion::Transcript),
        Some(Value::Null) | None => Ok(SchemaVersion::Flat),
        Some(_) => Err(RequestShapeError::MessagesNotArray),
    }
}

pub fn normalize(raw: &Value) -> Result<NormalizedRequest, RequestShapeError> {
    match detect_schema(raw)? {
        SchemaVersion::Flat => {
            let req: FlatRequest = serde_json::from_value(raw.clone()).map_err(|source| {
                RequestShapeError::Variant {
                    variant: "flat",
                    source,
                }
            })?;
            Ok(from_flat(req))
        }
        SchemaVersion::Transcript => {
            let req: TranscriptRequest = serde_json::from_value(raw.clone()).map_err(|source| {
                RequestShapeError::Variant {
                    variant: "transcript",
                    source,
                }
            })?;
            from_transcript(req)
        }
    }
}

fn from_flat(req: FlatRequest) -> NormalizedRequest {
    let history = req.past_messages.iter().flat_map(past_message_turns).collect();
    NormalizedRequest {
        schema: SchemaVersion::Flat,
        content: req.content,
        cmds: req.data.cmds,
        executed_cmds: req.data.executed_cmds,
        url_configs: req.data.url_configs,
        thread_id: req.thread_id,
        tenant_id: req.tenant_id,
        id: req.id,
        agent_context: req.platform_context.clone(),
        platform_context: req.platform_context,
        agent_managed_memory: req.agent_managed_memory,
        messages: req.past_messages,
        history,
    }
}

fn from_transcript(req: TranscriptRequest) -> Result<NormalizedRequest, RequestShapeError> {
    let (content, history) = match req.messages.split_last() {
        None => (String::new(), Vec::new()),
        Some((last, earlier)) => {
            let content = last
                .get("content")
                .map(content_text)
                .ok_or(RequestShapeError::MissingContent)?;
            (content, earlier.iter().filter_map(transcript_turn).collect())
        }
    };

    let agent_context = last_user_platform_context(&req.messages).or_else(|| req.platform_context.clone());

    Ok(NormalizedRequest {
        schema: SchemaVersion::Transcript,
        content,
        cmds: req.data.cmds,
        executed_cmds: req.data.executed_cmds,
        url_configs: req.data.url_configs,
        thread_id: req.thread_id,
        tenant_id: req.tenant_id,
        id: req.id,
        platform_context: req.platform_context,
        agent_context,
        agent_managed_memory: req.agent_managed_memory,
        messages: req.messages,
        history,
    })
}

fn past_message_turns(entry: &Value) -> Vec<ConversationTurn> {
    if entry.get("role").is_some() {
        return transcript_turn(entry).into_iter().collect();
    }

    let mut turns = Vec::new();
    if let Some(msg) = entry.get("userMsg") {
        turns.push(ConversationTurn::user(field_text(msg, "content")));
    }
    if let Some(msg) = entry.get("agentResponse") {
        turns.push(ConversationTurn::assistant(field_text(msg, "content")));
    }
    turns
}

fn transcript_turn(entry: &Value) -> Option<ConversationTurn> {
    let role: Role = serde_json::from_value(entry.get("role")?.clone()).ok()?;
    let data = entry
        .get("data")
        .and_then(|d| serde_json::from_value::<TurnData>(d.clone()).ok())
        .unwrap_or_default();
    Some(ConversationTurn {
        role,
        content: field_text(entry, "content"),
        data,
    })
}

fn last_user_platform_context(messages: &[Value]) -> Option<Value> {
    messages
        .iter()
        .rev()
        .filter(|m| m.get("role").and_then(Value::as_str) == Some("user"))
        .find_map(|m| m.get("platform_context").cloned())
}

fn field_text(v: &Value, key: &str) -> String {
    v.get(key).map(content_text).unwrap_or_default()
}

fn content_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
