// ABOUTME: drives one chat round from normalized request to assembled response.
// ABOUTME: approved commands run through the batch processor, everything else goes to the agent.

use std::sync::Arc;

use chrono::Utc;
use cmdgate_common::{build, normalize, ErrorCode, NormalizedRequest, Reply, RequestShapeError, ResponseEnvelope};
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::{interpret, Agent};
use crate::batch::BatchProcessor;

pub const COMMAND_RESULTS_PROMPT: &str = "Here are the results of the commands.";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    RequestShape(#[from] RequestShapeError),
    #[error("agent invocation failed: {0:#}")]
    Agent(anyhow::Error),
}

impl ChatError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ChatError::RequestShape(err) => err.code(),
            ChatError::Agent(_) => ErrorCode::AgentFailure,
        }
    }
}

#[derive(Debug)]
pub struct ChatOutcome {
    pub request: NormalizedRequest,
    pub reply: Reply,
    pub response: ResponseEnvelope,
}

#[derive(Clone)]
pub struct Gateway {
    batch: BatchProcessor,
    agent: Arc<dyn Agent>,
}

impl Gateway {
    pub fn new(batch: BatchProcessor, agent: Arc<dyn Agent>) -> Self {
        Self { batch, agent }
    }

    pub async fn handle(&self, raw: &Value) -> Result<ChatOutcome, ChatError> {
        let request = normalize(raw)?;
        debug!(
            schema = request.schema.as_str(),
            content = %request.content,
            cmds = request.cmds.len(),
            history = request.history.len(),
            "normalized chat request"
        );

        let reply = self.reply_to(&request).await?;
        let response = build(&reply, &request, Utc::now());
        Ok(ChatOutcome {
            request,
            reply,
            response,
        })
    }

    async fn reply_to(&self, request: &NormalizedRequest) -> Result<Reply, ChatError> {
        if !request.cmds.is_empty() {
            let batch = self.batch.process(request.cmds.clone()).await;
            let content = if batch.ran_anything() {
                COMMAND_RESULTS_PROMPT.to_string()
            } else {
                String::new()
            };
            return Ok(Reply {
                content,
                cmds: batch.proposed,
                executed_cmds: batch.executed,
                ..Reply::default()
            });
        }

        let text = self
            .agent
            .respond(&request.history, &request.content, request.agent_context.as_ref())
            .await
            .map_err(ChatError::Agent)?;

        match interpret(&text) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                warn!(error = %err, "falling back to plain text agent reply");
                Ok(Reply::text(text))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::exec::Executor;
    use crate::actions::scratch::ScratchManager;
    use crate::agent::{ScriptedAgent, LIST_FILES_PROMPT};
    use crate::config::ExecConfig;
    use async_trait::async_trait;
    use cmdgate_common::ConversationTurn;
    use serde_json::json;

    struct FixedAgent(&'static str);

    #[async_trait]
    impl Agent for FixedAgent {
        async fn respond(
            &self,
            _history: &[ConversationTurn],
            _content: &str,
            _context: Option<&Value>,
        ) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingAgent;

    #[async_trait]
    impl Agent for FailingAgent {
        async fn respond(
            &self,
            _history: &[ConversationTurn],
            _content: &str,
            _context: Option<&Value>,
        ) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("model endpoint returned 503"))
        }
    }

    struct HistoryAgent;

    #[async_trait]
    impl Agent for HistoryAgent {
        async fn respond(
            &self,
            history: &[ConversationTurn],
            content: &str,
            context: Option<&Value>,
        ) -> anyhow::Result<String> {
            let page = context.and_then(|c| c.get("page")).and_then(Value::as_str).unwrap_or("-");
            Ok(format!("{} turns before {content} on {page}", history.len()))
        }
    }

    fn gateway(agent: Arc<dyn Agent>) -> Gateway {
        let batch = BatchProcessor::new(Executor::new(ExecConfig::default()), ScratchManager::default());
        Gateway::new(batch, agent)
    }

    #[tokio::test]
    async fn empty_request_proposes_the_sample_command() {
        let out = gateway(Arc::new(ScriptedAgent))
            .handle(&json!({"content": "", "data": {"cmds": []}}))
            .await
            .unwrap();

        assert_eq!(out.reply.content, LIST_FILES_PROMPT);
        assert_eq!(out.reply.cmds.len(), 1);
        assert_eq!(out.reply.cmds[0].command, "cat sample.txt");
        assert!(!out.reply.cmds[0].execute);
        assert_eq!(out.reply.cmds[0].files.len(), 1);
        assert_eq!(out.reply.cmds[0].files[0].file_path, "sample.txt");
        assert!(out.reply.executed_cmds.is_empty());
    }

    #[tokio::test]
    async fn approved_command_is_executed_instead_of_calling_the_agent() {
        let raw = json!({
            "content": "",
            "data": {"cmds": [{"command": "echo hi", "execute": true, "files": []}]}
        });
        let out = gateway(Arc::new(FailingAgent)).handle(&raw).await.unwrap();

        assert_eq!(out.reply.content, COMMAND_RESULTS_PROMPT);
        assert_eq!(out.reply.executed_cmds.len(), 1);
        assert!(out.reply.executed_cmds[0].output.as_deref().unwrap().contains("hi\n"));
        assert_eq!(out.reply.executed_cmds[0].success, Some(true));
    }

    #[tokio::test]
    async fn proposals_only_round_has_empty_content() {
        let raw = json!({"data": {"cmds": [{"command": "ls", "execute": false}]}});
        let out = gateway(Arc::new(FailingAgent)).handle(&raw).await.unwrap();
        assert_eq!(out.reply.content, "");
        assert_eq!(out.reply.cmds.len(), 1);
    }

    #[tokio::test]
    async fn url_request_returns_a_url_config() {
        let out = gateway(Arc::new(ScriptedAgent))
            .handle(&json!({"content": "url"}))
            .await
            .unwrap();
        assert!(out.reply.cmds.is_empty());
        assert_eq!(out.reply.url_configs.len(), 1);
    }

    #[tokio::test]
    async fn malformed_agent_json_degrades_to_text() {
        let out = gateway(Arc::new(FixedAgent("{\"content\": ")))
            .handle(&json!({"content": "hi"}))
            .await
            .unwrap();
        assert_eq!(out.reply, Reply::text("{\"content\": "));
    }

    #[tokio::test]
    async fn history_and_context_are_passed_to_the_agent() {
        let raw = json!({
            "platform_context": {"tenant": "top"},
            "messages": [
                {"role": "user", "content": "a"},
                {"role": "assistant", "content": "b"},
                {"role": "user", "content": "c", "platform_context": {"page": "billing"}}
            ]
        });
        let out = gateway(Arc::new(HistoryAgent)).handle(&raw).await.unwrap();
        assert_eq!(out.reply.content, "2 turns before c on billing");
        let v = serde_json::to_value(&out.response).unwrap();
        assert_eq!(v["platform_context"], json!({"tenant": "top"}));
    }

    #[tokio::test]
    async fn agent_failure_is_classified() {
        let err = gateway(Arc::new(FailingAgent))
            .handle(&json!({"content": "hi"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AgentFailure);
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn bad_shape_is_classified() {
        let err = gateway(Arc::new(ScriptedAgent))
            .handle(&json!("just a string"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RequestShape);
    }
}
