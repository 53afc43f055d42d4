// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The stdio serve loop: newline-delimited JSON-RPC in on stdin,
//! responses out on stdout. Logging goes to stderr; stdout carries only
//! protocol traffic.

use anyhow::Result;
use log::{debug, info};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::rpc::{self, Request};
use crate::tools::{self, ServerState};

pub async fn serve(state: ServerState) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    info!("netdbg-mcp listening on stdio");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(response) = handle_line(&state, line).await else {
            continue;
        };

        let mut bytes = serde_json::to_vec(&response)?;
        bytes.push(b'\n');
        stdout.write_all(&bytes).await?;
        stdout.flush().await?;
    }

    info!("stdin closed; shutting down");
    Ok(())
}

/// Process one request line; `None` for notifications (no response).
pub async fn handle_line(state: &ServerState, line: &str) -> Option<Value> {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            return Some(rpc::error(
                &Value::Null,
                rpc::PARSE_ERROR,
                &format!("bad request: {err}"),
            ));
        }
    };

    debug!("request: {}", request.method);

    if request.is_notification() {
        return None;
    }

    let id = request.id.clone().unwrap_or(Value::Null);

    let response = match request.method.as_str() {
        "initialize" => rpc::success(
            &id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "netdbg-mcp",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),

        "tools/list" => rpc::success(&id, json!({ "tools": tools::tool_definitions() })),

        "tools/call" => {
            let name = request.params["name"].as_str().unwrap_or_default();
            if name.is_empty() {
                return Some(rpc::error(&id, rpc::INVALID_PARAMS, "missing tool name"));
            }

            let default_args = json!({});
            let arguments = request
                .params
                .get("arguments")
                .unwrap_or(&default_args);

            let payload = tools::call_tool(state, name, arguments).await;
            let is_error = payload.get("success") == Some(&Value::Bool(false));

            rpc::success(
                &id,
                json!({
                    "content": [{
                        "type": "text",
                        "text": payload.to_string(),
                    }],
                    "isError": is_error,
                }),
            )
        }

        "ping" => rpc::success(&id, json!({})),

        other => rpc::error(
            &id,
            rpc::METHOD_NOT_FOUND,
            &format!("unknown method '{other}'"),
        ),
    };

    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ServerOptions;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn test_state() -> ServerState {
        ServerState::new(ServerOptions {
            dbgshim_path: None,
            stop_timeout: Duration::from_secs(30),
        })
    }

    #[tokio::test]
    async fn initialize_reports_tool_capability() {
        let state = test_state();
        let response = handle_line(
            &state,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )
        .await
        .unwrap();

        assert_eq!(response["result"]["serverInfo"]["name"], json!("netdbg-mcp"));
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let state = test_state();
        let response = handle_line(
            &state,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .await;

        assert!(response.is_none());
    }

    #[tokio::test]
    async fn tools_list_round_trips() {
        let state = test_state();
        let response = handle_line(&state, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .unwrap();

        let tools = response["result"]["tools"].as_array().unwrap();
        assert!(tools.iter().any(|t| t["name"] == "debug_set_breakpoint"));
    }

    #[tokio::test]
    async fn tool_call_payload_is_text_content() {
        let state = test_state();
        let response = handle_line(
            &state,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"debug_status","arguments":{}}}"#,
        )
        .await
        .unwrap();

        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["state"], json!("idle"));
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let state = test_state();
        let response = handle_line(&state, "{not json").await.unwrap();
        assert_eq!(response["error"]["code"], json!(rpc::PARSE_ERROR));
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let state = test_state();
        let response = handle_line(&state, r#"{"jsonrpc":"2.0","id":9,"method":"bogus"}"#)
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], json!(rpc::METHOD_NOT_FOUND));
    }
}
