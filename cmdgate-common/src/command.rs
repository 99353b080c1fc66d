// ABOUTME: defines the command approval protocol types shared by cmdsh and cmdgated.
// ABOUTME: covers commands, staged files, url configs, and conversation turns.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// A shell command proposed by the agent or approved by the caller.
///
/// `execute=false` means the command is only proposed. `execute=true` means the caller
/// approved it and the daemon must run it in this round, unless it already carries results
/// (`output`, `exit_code` or `success`) from an earlier round.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct Command {
    #[serde(default, alias = "Command")]
    pub command: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub execute: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<CommandFile>,
    #[serde(
        default,
        alias = "Output",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl Command {
    pub fn proposed(text: impl Into<String>, files: Vec<CommandFile>) -> Self {
        Self {
            command: text.into(),
            execute: false,
            files,
            ..Self::default()
        }
    }

    pub fn approved(text: impl Into<String>, files: Vec<CommandFile>) -> Self {
        Self {
            execute: true,
            ..Self::proposed(text, files)
        }
    }

    /// A command that already went through an execution round.
    ///
    /// Silent commands come back with an empty `Output`, so the result fields count too.
    pub fn has_run(&self) -> bool {
        self.output.is_some() || self.success.is_some() || self.exit_code.is_some()
    }

    /// Strips approval and results so the command can only be proposed.
    pub fn into_proposal(self) -> Self {
        Self {
            execute: false,
            output: None,
            exit_code: None,
            success: None,
            ..self
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct CommandFile {
    #[serde(default)]
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
}

impl CommandFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_path: path.into(),
            file_content: Some(content.into()),
        }
    }
}

/// A URL the client should offer to open, with any extra client fields kept verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct UrlConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UrlConfig {
    pub fn new(url: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            description: description.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A browser action directive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct BrowserUrl {
    #[serde(default)]
    pub url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct TurnData {
    #[serde(default, alias = "Cmds", deserialize_with = "null_as_default")]
    pub cmds: Vec<Command>,
    #[serde(default, alias = "executedCmds", deserialize_with = "null_as_default")]
    pub executed_cmds: Vec<Command>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url_configs: Vec<UrlConfig>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub browser_urls: Vec<BrowserUrl>,
}

impl TurnData {
    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
            && self.executed_cmds.is_empty()
            && self.url_configs.is_empty()
            && self.browser_urls.is_empty()
    }
}

/// One exchange of the caller-held transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "TurnData::is_empty")]
    pub data: TurnData,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            data: TurnData::default(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            data: TurnData::default(),
        }
    }
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// legacy clients send `Output: ""` on commands that never ran
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}
