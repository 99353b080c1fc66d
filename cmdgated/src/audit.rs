// ABOUTME: writes append-only audit records for each chat request and the commands it ran.
// ABOUTME: logs structured json lines and never records file contents or command outputs.

use std::path::Path;

use anyhow::Context;
use cmdgate_common::{ActionError, NormalizedRequest, Reply};
use serde_json::Value;

#[derive(Debug, serde::Serialize)]
#[serde(deny_unknown_fields)]
struct ExecutedEntry<'a> {
    command: &'a str,
    success: Option<bool>,
    exit_code: Option<i32>,
}

#[derive(Debug, serde::Serialize)]
#[serde(deny_unknown_fields)]
struct AuditRecord<'a> {
    ts_unix_ms: u64,
    thread_id: Option<&'a str>,
    tenant_id: Option<&'a str>,
    schema: Option<&'static str>,
    proposed: Vec<&'a str>,
    executed: Vec<ExecutedEntry<'a>>,
    error: Option<&'a ActionError>,
}

/// What a finished chat request looked like, for the audit log.
pub enum Entry<'a> {
    Replied {
        request: &'a NormalizedRequest,
        reply: &'a Reply,
    },
    Failed {
        payload: &'a Value,
        error: &'a ActionError,
    },
}

pub async fn append_record(audit_path: &Path, ts_unix_ms: u64, entry: Entry<'_>) -> anyhow::Result<()> {
    let record = match entry {
        Entry::Replied { request, reply } => AuditRecord {
            ts_unix_ms,
            thread_id: request.thread_id.as_deref(),
            tenant_id: request.tenant_id.as_deref(),
            schema: Some(request.schema.as_str()),
            proposed: reply.cmds.iter().map(|c| c.command.as_str()).collect(),
            executed: reply
                .executed_cmds
                .iter()
                .map(|c| ExecutedEntry {
                    command: c.command.as_str(),
                    success: c.success,
                    exit_code: c.exit_code,
                })
                .collect(),
            error: None,
        },
        Entry::Failed { payload, error } => AuditRecord {
            ts_unix_ms,
            thread_id: payload.get("thread_id").and_then(Value::as_str),
            tenant_id: payload.get("tenant_id").and_then(Value::as_str),
            schema: None,
            proposed: Vec::new(),
            executed: Vec::new(),
            error: Some(error),
        },
    };

    let mut line = serde_json::to_vec(&record)?;
    line.push(b'\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(audit_path)
        .await
        .with_context(|| format!("open audit log at {}", audit_path.display()))?;

    use tokio::io::AsyncWriteExt;
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}
