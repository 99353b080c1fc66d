// ABOUTME: assembles outbound response envelopes for both wire schemas.
// ABOUTME: echoes caller identifiers verbatim and translates command field casing at the boundary.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::{null_as_default, BrowserUrl, Command, CommandFile, UrlConfig};
use crate::error::ErrorCode;
use crate::request::{NormalizedRequest, SchemaVersion};

pub const RESPONSE_TYPE_SUCCESS: &str = "success";

/// Command as written by legacy clients: capitalized `Command` and `Output`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegacyCommand {
    #[serde(rename = "Command", default)]
    pub command: String,
    #[serde(rename = "Output", default)]
    pub output: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<CommandFile>,
    #[serde(default)]
    pub execute: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl From<Command> for LegacyCommand {
    fn from(cmd: Command) -> Self {
        Self {
            command: cmd.command,
            output: cmd.output.unwrap_or_default(),
            files: cmd.files,
            execute: cmd.execute,
            exit_code: cmd.exit_code,
            success: cmd.success,
        }
    }
}

impl From<LegacyCommand> for Command {
    fn from(cmd: LegacyCommand) -> Self {
        Self {
            command: cmd.command,
            execute: cmd.execute,
            files: cmd.files,
            output: Some(cmd.output).filter(|o| !o.is_empty()),
            exit_code: cmd.exit_code,
            success: cmd.success,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlatResponseData {
    pub response_type: String,
    pub processed_at: String,
    #[serde(rename = "Cmds", default)]
    pub cmds: Vec<LegacyCommand>,
    #[serde(rename = "executedCmds", default)]
    pub executed_cmds: Vec<LegacyCommand>,
    #[serde(default)]
    pub url_configs: Vec<UrlConfig>,
    #[serde(default)]
    pub browser_urls: Vec<BrowserUrl>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlatResponse {
    #[serde(rename = "pastMessages", default)]
    pub past_messages: Vec<Value>,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "terminalCommands", default)]
    pub terminal_commands: Vec<Value>,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default = "default_agent_managed_memory")]
    pub agent_managed_memory: bool,
    #[serde(default)]
    pub platform_context: Value,
    pub data: FlatResponseData,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TranscriptResponseData {
    pub response_type: String,
    pub processed_at: String,
    #[serde(default)]
    pub cmds: Vec<Command>,
    #[serde(default)]
    pub executed_cmds: Vec<Command>,
    #[serde(default)]
    pub url_configs: Vec<UrlConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub browser_urls: Vec<BrowserUrl>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptResponse {
    pub role: String,
    pub content: String,
    pub data: TranscriptResponseData,
    #[serde(default)]
    pub messages: Vec<Value>,
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

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Flat(FlatResponse),
    Transcript(TranscriptResponse),
}

impl ResponseEnvelope {
    pub fn schema(&self) -> SchemaVersion {
        match self {
            ResponseEnvelope::Flat(_) => SchemaVersion::Flat,
            ResponseEnvelope::Transcript(_) => SchemaVersion::Transcript,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ResponseEnvelope::Flat(r) => &r.content,
            ResponseEnvelope::Transcript(r) => &r.content,
        }
    }

    /// Proposed and executed commands in their canonical form.
    pub fn commands(&self) -> (Vec<Command>, Vec<Command>) {
        match self {
            ResponseEnvelope::Flat(r) => (
                r.data.cmds.iter().cloned().map(Command::from).collect(),
                r.data.executed_cmds.iter().cloned().map(Command::from).collect(),
            ),
            ResponseEnvelope::Transcript(r) => {
                (r.data.cmds.clone(), r.data.executed_cmds.clone())
            }
        }
    }
}

/// What the daemon wants to say back, before it is shaped for a wire schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub content: String,
    pub cmds: Vec<Command>,
    pub executed_cmds: Vec<Command>,
    pub url_configs: Vec<UrlConfig>,
    pub browser_urls: Vec<BrowserUrl>,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Builds the success envelope in the schema the request arrived in.
pub fn build(reply: &Reply, request: &NormalizedRequest, at: DateTime<Utc>) -> ResponseEnvelope {
    let processed_at = timestamp(at);
    match request.schema {
        SchemaVersion::Flat => ResponseEnvelope::Flat(FlatResponse {
            past_messages: request.messages.clone(),
            content: reply.content.clone(),
            terminal_commands: Vec::new(),
            thread_id: request.thread_id.clone().unwrap_or_default(),
            tenant_id: request.tenant_id.clone().unwrap_or_default(),
            agent_managed_memory: request
                .agent_managed_memory
                .unwrap_or_else(default_agent_managed_memory),
            platform_context: request
                .platform_context
                .clone()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            data: FlatResponseData {
                response_type: RESPONSE_TYPE_SUCCESS.to_string(),
                processed_at,
                cmds: reply.cmds.iter().cloned().map(LegacyCommand::from).collect(),
                executed_cmds: reply
                    .executed_cmds
                    .iter()
                    .cloned()
                    .map(LegacyCommand::from)
                    .collect(),
                url_configs: reply.url_configs.clone(),
                browser_urls: reply.browser_urls.clone(),
            },
            id: request.id.clone().unwrap_or_default(),
        }),
        SchemaVersion::Transcript => ResponseEnvelope::Transcript(TranscriptResponse {
            role: "assistant".to_string(),
            content: reply.content.clone(),
            data: TranscriptResponseData {
                response_type: RESPONSE_TYPE_SUCCESS.to_string(),
                processed_at,
                cmds: reply.cmds.clone(),
                executed_cmds: reply.executed_cmds.clone(),
                url_configs: reply.url_configs.clone(),
                browser_urls: reply.browser_urls.clone(),
            },
            messages: request.messages.clone(),
            thread_id: request.thread_id.clone(),
            tenant_id: request.tenant_id.clone(),
            id: request.id.clone(),
            platform_context: request.platform_context.clone(),
            agent_managed_memory: request.agent_managed_memory,
        }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorData {
    pub cmds: Vec<Command>,
    pub executed_cmds: Vec<Command>,
    pub url_configs: Vec<UrlConfig>,
    pub response_type: ErrorCode,
    pub error_type: ErrorCode,
    pub error: String,
    pub processed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEnvelope {
    pub role: String,
    pub content: String,
    pub data: ErrorData,
    /// The request as received, echoed back for client-side debugging.
    #[serde(default)]
    pub payload: Option<Value>,
}

pub fn build_error(
    code: ErrorCode,
    message: &str,
    payload: Option<&Value>,
    at: DateTime<Utc>,
) -> ErrorEnvelope {
    ErrorEnvelope {
        role: "assistant".to_string(),
        content: code.user_message().to_string(),
        data: ErrorData {
            cmds: Vec::new(),
            executed_cmds: Vec::new(),
            url_configs: Vec::new(),
            response_type: code,
            error_type: code,
            error: message.to_string(),
            processed_at: timestamp(at),
        },
        payload: payload.cloned(),
    }
}

fn default_agent_managed_memory() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::normalize;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn flat_round_trip_preserves_identifiers() {
        let raw = json!({
            "content": "hello",
            "thread_id": "thread-9",
            "tenant_id": "tenant-3",
            "id": "msg-1",
            "platform_context": {"app": "desk"},
            "pastMessages": [{"userMsg": {"content": "x"}}, {"unknown": true}],
        });
        let req = normalize(&raw).unwrap();

        let out = build(&Reply::text("hi"), &req, fixed_time());
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["thread_id"], raw["thread_id"]);
        assert_eq!(v["tenant_id"], raw["tenant_id"]);
        assert_eq!(v["id"], raw["id"]);
        assert_eq!(v["platform_context"], raw["platform_context"]);
        assert_eq!(v["pastMessages"], raw["pastMessages"]);
        assert_eq!(v["Content"], "hi");
        assert_eq!(v["agent_managed_memory"], true);
        assert_eq!(v["data"]["response_type"], "success");
        assert_eq!(v["data"]["processed_at"], "2024-05-01T12:30:00.000000Z");
    }

    #[test]
    fn flat_response_uses_capitalized_command_fields() {
        let req = normalize(&json!({})).unwrap();
        let mut executed = Command::approved("echo hi", vec![]);
        executed.output = Some("hi\n".to_string());
        let reply = Reply {
            content: "done".to_string(),
            cmds: vec![Command::proposed("ls", vec![])],
            executed_cmds: vec![executed.clone()],
            ..Reply::default()
        };

        let v = serde_json::to_value(build(&reply, &req, fixed_time())).unwrap();
        assert_eq!(v["data"]["Cmds"][0]["Command"], "ls");
        assert_eq!(v["data"]["Cmds"][0]["Output"], "");
        assert_eq!(v["data"]["executedCmds"][0]["Output"], "hi\n");
        assert_eq!(v["thread_id"], "");

        let back: ResponseEnvelope = serde_json::from_value(v).unwrap();
        let (proposed, done) = back.commands();
        assert_eq!(proposed, reply.cmds);
        assert_eq!(done, vec![executed]);
    }

    #[test]
    fn transcript_response_is_an_assistant_turn() {
        let raw = json!({
            "messages": [{"role": "user", "content": "hey"}],
            "thread_id": "t-2"
        });
        let req = normalize(&raw).unwrap();
        let reply = Reply {
            content: "ok".to_string(),
            cmds: vec![Command::proposed("pwd", vec![])],
            ..Reply::default()
        };

        let out = build(&reply, &req, fixed_time());
        assert_eq!(out.schema(), SchemaVersion::Transcript);
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["content"], "ok");
        assert_eq!(v["data"]["cmds"][0]["command"], "pwd");
        assert_eq!(v["messages"], raw["messages"]);
        assert_eq!(v["thread_id"], "t-2");
        assert!(v.get("tenant_id").is_none());
        assert!(v["data"].get("browser_urls").is_none());
    }

    #[test]
    fn transcript_response_echoes_the_top_level_platform_context() {
        let raw = json!({
            "platform_context": {"tenant": "top"},
            "messages": [{"role": "user", "content": "hey", "platform_context": {"page": "x"}}]
        });
        let req = normalize(&raw).unwrap();

        let v = serde_json::to_value(build(&Reply::text("ok"), &req, fixed_time())).unwrap();
        assert_eq!(v["platform_context"], json!({"tenant": "top"}));
        assert_eq!(v["messages"], raw["messages"]);
    }

    #[test]
    fn build_does_not_touch_inputs() {
        let req = normalize(&json!({"content": "x"})).unwrap();
        let reply = Reply::text("y");
        let (req_before, reply_before) = (req.clone(), reply.clone());
        let _ = build(&reply, &req, fixed_time());
        assert_eq!(req, req_before);
        assert_eq!(reply, reply_before);
    }

    #[test]
    fn error_envelope_hides_raw_message_from_content() {
        let payload = json!({"content": "x"});
        let err = build_error(
            ErrorCode::AgentFailure,
            "upstream returned 502",
            Some(&payload),
            fixed_time(),
        );
        let v = serde_json::to_value(&err).unwrap();
        assert!(!v["content"].as_str().unwrap().contains("502"));
        assert_eq!(v["data"]["error_type"], "agent_failure");
        assert_eq!(v["data"]["error"], "upstream returned 502");
        assert_eq!(v["payload"], payload);
    }
}
