// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! JSON-RPC 2.0 message shapes for the MCP stdio transport: one JSON
//! object per line, requests in, responses out. Notifications (no id)
//! get no response.

use serde::Deserialize;
use serde_json::{json, Value};

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
pub struct Request {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

pub fn success(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

pub fn error(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_parses_with_and_without_params() {
        let request: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).unwrap();
        assert_eq!(request.method, "tools/list");
        assert!(!request.is_notification());
        assert_eq!(request.params, Value::Null);

        let notification: Request = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized","params":{}}"#,
        )
        .unwrap();
        assert!(notification.is_notification());
    }

    #[test]
    fn response_shapes() {
        let ok = success(&json!(7), json!({"x": 1}));
        assert_eq!(ok["id"], json!(7));
        assert_eq!(ok["result"]["x"], json!(1));

        let err = error(&json!(7), METHOD_NOT_FOUND, "no such method");
        assert_eq!(err["error"]["code"], json!(METHOD_NOT_FOUND));
    }
}
