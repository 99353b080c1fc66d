// ABOUTME: provides cmdsh helpers for validating chat requests and approving proposed commands.
// ABOUTME: turns a response envelope into the follow-up request that runs the approved commands.

use cmdgate_common::{
    normalize, Command, ErrorCode, FlatRequest, ResponseEnvelope, SchemaVersion, TranscriptRequest,
    TurnData,
};
use serde_json::Value;

#[derive(Debug, serde::Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ValidateVerdict {
    pub ok: bool,
    pub schema: Option<SchemaVersion>,
    pub content: Option<String>,
    pub cmds: usize,
    pub approved: usize,
    pub error: Option<VerdictError>,
}

#[derive(Debug, serde::Serialize, PartialEq, Eq)]
pub struct VerdictError {
    pub code: ErrorCode,
    pub message: String,
}

pub fn validate_verdict(input: &str) -> ValidateVerdict {
    let parsed = serde_json::from_str::<Value>(input)
        .map_err(cmdgate_common::RequestShapeError::InvalidJson)
        .and_then(|raw| normalize(&raw));

    match parsed {
        Ok(req) => ValidateVerdict {
            ok: true,
            schema: Some(req.schema),
            approved: req.cmds.iter().filter(|c| c.execute && !c.has_run()).count(),
            cmds: req.cmds.len(),
            content: Some(req.content),
            error: None,
        },
        Err(err) => ValidateVerdict {
            ok: false,
            schema: None,
            content: None,
            cmds: 0,
            approved: 0,
            error: Some(VerdictError {
                code: err.code(),
                message: err.to_string(),
            }),
        },
    }
}

pub fn apply_overrides(mut request: Value, thread_id: Option<&str>, tenant_id: Option<&str>) -> anyhow::Result<Value> {
    let obj = request
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("request must be a json object"))?;

    for (key, value) in [("thread_id", thread_id), ("tenant_id", tenant_id)] {
        if let Some(value) = value {
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("{key} override must be non-empty"));
            }
            obj.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    Ok(request)
}

/// Builds the next request from a response, approving the selected proposals.
///
/// `only` picks proposals by index; `None` approves all of them. Proposals that are not
/// approved are sent back unchanged so they stay pending.
pub fn approve(response: &ResponseEnvelope, only: Option<&[usize]>) -> anyhow::Result<Value> {
    let (proposed, _) = response.commands();
    if proposed.is_empty() {
        return Err(anyhow::anyhow!("response has no proposed commands"));
    }
    if let Some(indices) = only {
        if let Some(bad) = indices.iter().find(|&&i| i >= proposed.len()) {
            return Err(anyhow::anyhow!(
                "no proposed command at index {bad}, response has {}",
                proposed.len()
            ));
        }
    }

    let cmds: Vec<Command> = proposed
        .into_iter()
        .enumerate()
        .map(|(i, cmd)| Command {
            execute: only.map_or(true, |idx| idx.contains(&i)),
            ..cmd
        })
        .collect();

    let data = TurnData {
        cmds,
        ..TurnData::default()
    };

    let request = match response {
        ResponseEnvelope::Flat(r) => serde_json::to_value(FlatRequest {
            content: String::new(),
            past_messages: r.past_messages.clone(),
            thread_id: Some(r.thread_id.clone()).filter(|s| !s.is_empty()),
            tenant_id: Some(r.tenant_id.clone()).filter(|s| !s.is_empty()),
            id: Some(r.id.clone()).filter(|s| !s.is_empty()),
            platform_context: Some(r.platform_context.clone()).filter(|v| !v.is_null()),
            agent_managed_memory: Some(r.agent_managed_memory),
            data,
        })?,
        ResponseEnvelope::Transcript(r) => {
            let mut messages = r.messages.clone();
            messages.push(serde_json::json!({"role": "assistant", "content": r.content}));
            serde_json::to_value(TranscriptRequest {
                messages,
                data,
                thread_id: r.thread_id.clone(),
                tenant_id: r.tenant_id.clone(),
                id: r.id.clone(),
                platform_context: r.platform_context.clone(),
                agent_managed_memory: r.agent_managed_memory,
            })?
        }
    };

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flat_response() -> ResponseEnvelope {
        serde_json::from_value(json!({
            "pastMessages": [{"userMsg": {"content": ""}}],
            "Content": "Would like to list the files in the current directory?",
            "terminalCommands": [],
            "thread_id": "th-1",
            "tenant_id": "",
            "agent_managed_memory": true,
            "platform_context": {},
            "data": {
                "response_type": "success",
                "processed_at": "2024-05-01T12:30:00.000000Z",
                "Cmds": [
                    {"Command": "cat sample.txt", "Output": "", "execute": false,
                     "files": [{"file_path": "sample.txt", "file_content": "Amazon rocks!"}]},
                    {"Command": "ls", "Output": "", "execute": false, "files": []}
                ],
                "executedCmds": [],
                "url_configs": [],
                "browser_urls": []
            },
            "id": ""
        }))
        .unwrap()
    }

    #[test]
    fn verdict_reports_schema_and_approvals() {
        let v = validate_verdict(r#"{"data":{"cmds":[{"command":"ls","execute":true},{"command":"pwd"}]}}"#);
        assert!(v.ok);
        assert_eq!(v.schema, Some(SchemaVersion::Flat));
        assert_eq!(v.cmds, 2);
        assert_eq!(v.approved, 1);
    }

    #[test]
    fn verdict_reports_request_shape_errors() {
        let v = validate_verdict(r#"{"messages": 3}"#);
        assert!(!v.ok);
        assert_eq!(v.error.as_ref().unwrap().code, ErrorCode::RequestShape);

        let v = validate_verdict("not json");
        assert_eq!(v.error.as_ref().unwrap().code, ErrorCode::RequestShape);
    }

    #[test]
    fn overrides_set_identifiers() {
        let req = apply_overrides(json!({"content": "x"}), Some("th-2"), None).unwrap();
        assert_eq!(req["thread_id"], "th-2");
        assert!(req.get("tenant_id").is_none());
        assert!(apply_overrides(json!({}), None, Some("  ")).is_err());
        assert!(apply_overrides(json!([]), None, None).is_err());
    }

    #[test]
    fn approve_marks_all_proposals_for_execution() {
        let next = approve(&flat_response(), None).unwrap();
        assert_eq!(next["thread_id"], "th-1");
        assert!(next.get("tenant_id").is_none());

        let req = normalize(&next).unwrap();
        assert_eq!(req.schema, SchemaVersion::Flat);
        assert_eq!(req.cmds.len(), 2);
        assert!(req.cmds.iter().all(|c| c.execute));
        assert_eq!(req.cmds[0].files[0].file_content.as_deref(), Some("Amazon rocks!"));
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn approve_selected_keeps_the_rest_pending() {
        let next = approve(&flat_response(), Some(&[1][..])).unwrap();
        let req = normalize(&next).unwrap();
        assert!(!req.cmds[0].execute);
        assert!(req.cmds[1].execute);

        assert!(approve(&flat_response(), Some(&[5][..])).is_err());
    }

    #[test]
    fn approve_transcript_appends_the_assistant_turn() {
        let response: ResponseEnvelope = serde_json::from_value(json!({
            "role": "assistant",
            "content": "run this?",
            "data": {
                "response_type": "success",
                "processed_at": "2024-05-01T12:30:00.000000Z",
                "cmds": [{"command": "uname -a", "execute": false, "files": []}],
                "executed_cmds": [],
                "url_configs": []
            },
            "messages": [{"role": "user", "content": "what os?"}],
            "thread_id": "th-3"
        }))
        .unwrap();

        let next = approve(&response, None).unwrap();
        let req = normalize(&next).unwrap();
        assert_eq!(req.schema, SchemaVersion::Transcript);
        assert_eq!(req.content, "run this?");
        assert_eq!(req.history.len(), 1);
        assert!(req.cmds[0].execute);
        assert_eq!(req.thread_id.as_deref(), Some("th-3"));
    }

    #[test]
    fn approve_requires_proposals() {
        let mut response = flat_response();
        if let ResponseEnvelope::Flat(r) = &mut response {
            r.data.cmds.clear();
        }
        assert!(approve(&response, None).is_err());
    }
}
