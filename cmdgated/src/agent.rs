// ABOUTME: defines the seam to the language model agent and interprets what it answers.
// ABOUTME: agent text is either plain prose or a json proposal carrying commands and urls.

use async_trait::async_trait;
use cmdgate_common::{BrowserUrl, Command, CommandFile, ConversationTurn, Reply, UrlConfig};
use serde::Deserialize;
use serde_json::Value;

pub const LIST_FILES_PROMPT: &str = "Would like to list the files in the current directory?";
pub const SAMPLE_FILE: &str = "sample.txt";
pub const SAMPLE_CONTENT: &str = "Amazon rocks!";

/// The model behind the chat. Conversation history goes in, assistant text comes out.
///
/// `context` is the caller's platform context for this turn, if any.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn respond(
        &self,
        history: &[ConversationTurn],
        content: &str,
        context: Option<&Value>,
    ) -> anyhow::Result<String>;
}

/// Deterministic stand-in for a model, answering in the structured proposal format.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent;

#[async_trait]
impl Agent for ScriptedAgent {
    async fn respond(
        &self,
        _history: &[ConversationTurn],
        content: &str,
        _context: Option<&Value>,
    ) -> anyhow::Result<String> {
        let proposal = match content.trim() {
            "" => serde_json::json!({
                "content": LIST_FILES_PROMPT,
                "cmds": [Command::proposed(
                    format!("cat {SAMPLE_FILE}"),
                    vec![CommandFile::new(SAMPLE_FILE, SAMPLE_CONTENT)],
                )],
            }),
            "url" => serde_json::json!({
                "content": "Here is a page you can open in the browser.",
                "url_configs": [UrlConfig::new(
                    "https://aws.amazon.com/",
                    "Amazon Web Services home page",
                )],
            }),
            _ => return Ok(format!("You said: {content}")),
        };
        Ok(serde_json::to_string(&proposal)?)
    }
}

const PROPOSAL_KEYS: &[&str] = &[
    "content",
    "message",
    "response",
    "cmds",
    "commands",
    "url_configs",
    "browser_urls",
];

#[derive(Debug, Clone, Default, Deserialize)]
struct Proposal {
    #[serde(default, alias = "message", alias = "response")]
    content: String,
    #[serde(default, alias = "commands")]
    cmds: Vec<Command>,
    #[serde(default)]
    url_configs: Vec<UrlConfig>,
    #[serde(default)]
    browser_urls: Vec<BrowserUrl>,
}

#[derive(Debug, thiserror::Error)]
#[error("agent output looks like json but is not a valid proposal: {0}")]
pub struct MalformedUpstreamResponse(#[source] pub serde_json::Error);

/// Turns raw agent text into a reply.
///
/// Commands coming from the agent are always proposals; only the caller can approve.
pub fn interpret(text: &str) -> Result<Reply, MalformedUpstreamResponse> {
    let body = strip_code_fence(text.trim());
    let object = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ if body.starts_with('{') => body,
        _ => return Ok(Reply::text(text)),
    };

    let value: Value = match serde_json::from_str(object) {
        Ok(value) => value,
        Err(err) if body.starts_with('{') => return Err(MalformedUpstreamResponse(err)),
        Err(_) => return Ok(Reply::text(text)),
    };
    // an object that names none of the proposal fields is part of the prose
    let is_proposal = value
        .as_object()
        .is_some_and(|obj| PROPOSAL_KEYS.iter().any(|key| obj.contains_key(*key)));
    if !is_proposal {
        return Ok(Reply::text(text));
    }

    match serde_json::from_value::<Proposal>(value) {
        Ok(p) => Ok(Reply {
            content: p.content,
            cmds: p.cmds.into_iter().map(Command::into_proposal).collect(),
            executed_cmds: Vec::new(),
            url_configs: p.url_configs,
            browser_urls: p.browser_urls,
        }),
        Err(err) if body.starts_with('{') => Err(MalformedUpstreamResponse(err)),
        Err(_) => Ok(Reply::text(text)),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string, e.g. ```json
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
