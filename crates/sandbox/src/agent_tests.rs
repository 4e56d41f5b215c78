// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn request_serializes_with_camel_case_run_id() {
    let run_id = RunId::new();
    let request = AgentRequest { text: "create hello.txt".into(), run_id };
    let json: serde_json::Value = serde_json::to_value(&request).unwrap();
    assert_eq!(json["text"], "create hello.txt");
    assert_eq!(json["runId"], run_id.to_string());
}

#[test]
fn reply_parses_minimal_body() {
    let body = r#"{"finalText":"done","threadId":"th-1"}"#;
    let reply: AgentReply = serde_json::from_str(body).unwrap();
    assert_eq!(reply.final_text, "done");
    assert_eq!(reply.thread_id, "th-1");
    assert!(reply.diff.is_empty());
    assert!(reply.git_commit.is_none());
    assert!(reply.commands.is_empty());
}

#[test]
fn reply_parses_full_body_with_commands() {
    let body = r#"{
        "finalText": "created hello.txt",
        "diff": "diff --git a/hello.txt b/hello.txt",
        "threadId": "th-2",
        "gitCommit": "abc123",
        "commands": [
            {"command": "touch hello.txt", "cwd": "/workspace/repo", "exitCode": 0}
        ]
    }"#;
    let reply: AgentReply = serde_json::from_str(body).unwrap();
    assert_eq!(reply.git_commit.as_deref(), Some("abc123"));
    assert_eq!(reply.commands.len(), 1);
    assert_eq!(reply.commands[0].command, "touch hello.txt");
    assert_eq!(reply.commands[0].exit_code, 0);
    assert!(reply.commands[0].stdout.is_empty());
}
