// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The MCP tool surface: thin JSON adaptors over the engine API.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;
use netdbg::{DebugEngine, DebugEvent, EngineOptions, SessionState};
use serde::Deserialize;
use serde_json::{json, Value};

pub struct ServerOptions {
    pub dbgshim_path: Option<PathBuf>,
    pub stop_timeout: Duration,
}

pub struct ServerState {
    options: ServerOptions,
    engine: Mutex<Option<Arc<DebugEngine>>>,
}

impl ServerState {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            engine: Mutex::new(None),
        }
    }

    /// The engine, constructed on first use so `debug_status` works even
    /// when the helper library is absent.
    fn engine(&self) -> anyhow::Result<Arc<DebugEngine>> {
        let mut slot = self.engine.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(engine) = slot.as_ref() {
            return Ok(engine.clone());
        }

        let engine = DebugEngine::new(EngineOptions {
            dbgshim_path: self.options.dbgshim_path.clone(),
        })?;
        *slot = Some(engine.clone());
        Ok(engine)
    }

    fn state_string(&self) -> String {
        let state = self
            .engine
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|e| e.state())
            .unwrap_or(SessionState::Idle);

        state_string(state)
    }
}

fn state_string(state: SessionState) -> String {
    serde_json::to_value(state)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "idle".to_string())
}

/// Tool catalogue for `tools/list`.
pub fn tool_definitions() -> Value {
    let string = |description: &str| json!({"type": "string", "description": description});
    let integer = |description: &str| json!({"type": "integer", "description": description});

    json!([
        {
            "name": "debug_launch",
            "description": "Build a .NET project and launch its dll under the debugger; returns stopped at process creation so breakpoints can be set.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "project_path": string("Path to the project directory or .csproj"),
                    "app_dll_path": string("Path to the built application dll"),
                    "first_chance_exceptions": {"type": "boolean", "description": "Also stop on first-chance exceptions"},
                },
                "required": ["project_path", "app_dll_path"],
            },
        },
        {
            "name": "debug_launch_test",
            "description": "Build a test project and run it under the debugger via the test runner.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "project_path": string("Path to the test project"),
                },
                "required": ["project_path"],
            },
        },
        {
            "name": "debug_attach",
            "description": "Attach to a running .NET process by pid.",
            "inputSchema": {
                "type": "object",
                "properties": { "pid": integer("Target process id") },
                "required": ["pid"],
            },
        },
        {
            "name": "debug_disconnect",
            "description": "Terminate the debuggee and tear down the session.",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "debug_status",
            "description": "Session state and server version.",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "debug_set_breakpoint",
            "description": "Set a source-line breakpoint in a dll; pends until the module loads.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "dll_path": string("Path to the dll that contains the code"),
                    "source_file": string("Source file name or suffix path"),
                    "line": integer("1-based source line"),
                },
                "required": ["dll_path", "source_file", "line"],
            },
        },
        {
            "name": "debug_remove_breakpoint",
            "description": "Remove a breakpoint by id.",
            "inputSchema": {
                "type": "object",
                "properties": { "id": integer("Breakpoint id") },
                "required": ["id"],
            },
        },
        {
            "name": "debug_list_breakpoints",
            "description": "List all breakpoints with their bind state.",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "debug_continue",
            "description": "Resume execution and wait for the next stop.",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "debug_step_over",
            "description": "Step over the current source line.",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "debug_step_into",
            "description": "Step into calls on the current source line.",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "debug_step_out",
            "description": "Step out of the current method.",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "debug_pause",
            "description": "Suspend all managed threads.",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "debug_variables",
            "description": "Locals and arguments of the stopped thread's top frame.",
            "inputSchema": {
                "type": "object",
                "properties": { "thread_id": integer("Thread id; defaults to the stopped thread") },
            },
        },
        {
            "name": "debug_stacktrace",
            "description": "Stack frames for one thread, or all threads when no id is given.",
            "inputSchema": {
                "type": "object",
                "properties": { "thread_id": integer("Thread id; all known threads when absent") },
            },
        },
        {
            "name": "debug_evaluate",
            "description": "Evaluate a simple variable or dotted field chain in the current frame.",
            "inputSchema": {
                "type": "object",
                "properties": { "expression": string("Identifier or dotted member chain") },
                "required": ["expression"],
            },
        },
    ])
}

#[derive(Deserialize)]
struct LaunchArgs {
    project_path: PathBuf,
    app_dll_path: PathBuf,
    #[serde(default)]
    first_chance_exceptions: bool,
}

#[derive(Deserialize)]
struct LaunchTestArgs {
    project_path: PathBuf,
}

#[derive(Deserialize)]
struct AttachArgs {
    pid: u32,
}

#[derive(Deserialize)]
struct SetBreakpointArgs {
    dll_path: PathBuf,
    source_file: String,
    line: u32,
}

#[derive(Deserialize)]
struct RemoveBreakpointArgs {
    id: u32,
}

#[derive(Deserialize, Default)]
struct ThreadArgs {
    thread_id: Option<u32>,
}

#[derive(Deserialize)]
struct EvaluateArgs {
    expression: String,
}

fn failure(message: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": message.to_string() })
}

fn parse<T: serde::de::DeserializeOwned>(arguments: &Value) -> Result<T, Value> {
    serde_json::from_value(arguments.clone())
        .map_err(|err| failure(format!("invalid arguments: {err}")))
}

/// Run one tool call to a JSON payload. Engine failures become
/// `{success: false, error}` payloads rather than protocol errors.
pub async fn call_tool(state: &ServerState, name: &str, arguments: &Value) -> Value {
    match name {
        "debug_status" => json!({
            "state": state.state_string(),
            "version": env!("CARGO_PKG_VERSION"),
        }),

        "debug_launch" => {
            let args: LaunchArgs = match parse(arguments) {
                Ok(args) => args,
                Err(err) => return err,
            };
            let engine = match state.engine() {
                Ok(engine) => engine,
                Err(err) => return failure(err),
            };

            match engine
                .launch(
                    &args.project_path,
                    &args.app_dll_path,
                    args.first_chance_exceptions,
                )
                .await
            {
                Ok(event) => json!({
                    "success": true,
                    "state": state_string(engine.state()),
                    "event": event,
                }),
                Err(err) => failure(err),
            }
        }

        "debug_launch_test" => {
            let args: LaunchTestArgs = match parse(arguments) {
                Ok(args) => args,
                Err(err) => return err,
            };
            let engine = match state.engine() {
                Ok(engine) => engine,
                Err(err) => return failure(err),
            };

            match engine.launch_test(&args.project_path, false).await {
                Ok(event) => json!({
                    "success": true,
                    "state": state_string(engine.state()),
                    "event": event,
                }),
                Err(err) => failure(err),
            }
        }

        "debug_attach" => {
            let args: AttachArgs = match parse(arguments) {
                Ok(args) => args,
                Err(err) => return err,
            };
            let engine = match state.engine() {
                Ok(engine) => engine,
                Err(err) => return failure(err),
            };

            match tokio::time::timeout(state.options.stop_timeout, engine.attach(args.pid)).await
            {
                Ok(Ok((pid, process_name))) => json!({
                    "success": true,
                    "state": "attached",
                    "pid": pid,
                    "process_name": process_name,
                }),
                Ok(Err(err)) => failure(err),
                Err(_) => failure("timed out waiting for the runtime to start in the target"),
            }
        }

        "debug_disconnect" => {
            let engine = match state.engine() {
                Ok(engine) => engine,
                Err(err) => return failure(err),
            };

            match engine.disconnect().await {
                Ok(()) => json!({ "success": true, "state": "idle" }),
                Err(err) => failure(err),
            }
        }

        "debug_set_breakpoint" => {
            let args: SetBreakpointArgs = match parse(arguments) {
                Ok(args) => args,
                Err(err) => return err,
            };
            let engine = match state.engine() {
                Ok(engine) => engine,
                Err(err) => return failure(err),
            };

            match engine
                .set_breakpoint(&args.dll_path, &args.source_file, args.line)
                .await
            {
                Ok(id) => json!({
                    "success": true,
                    "id": id,
                    "file": args.source_file,
                    "line": args.line,
                }),
                Err(err) => failure(err),
            }
        }

        "debug_remove_breakpoint" => {
            let args: RemoveBreakpointArgs = match parse(arguments) {
                Ok(args) => args,
                Err(err) => return err,
            };
            let engine = match state.engine() {
                Ok(engine) => engine,
                Err(err) => return failure(err),
            };

            match engine.remove_breakpoint(args.id).await {
                Ok(()) => json!({ "success": true, "id": args.id }),
                Err(err) => failure(err),
            }
        }

        "debug_list_breakpoints" => {
            let engine = match state.engine() {
                Ok(engine) => engine,
                Err(err) => return failure(err),
            };

            match engine.list_breakpoints().await {
                Ok(breakpoints) => json!({ "breakpoints": breakpoints }),
                Err(err) => failure(err),
            }
        }

        "debug_continue" | "debug_step_over" | "debug_step_into" | "debug_step_out"
        | "debug_pause" => {
            let engine = match state.engine() {
                Ok(engine) => engine,
                Err(err) => return failure(err),
            };

            let action = async {
                match name {
                    "debug_continue" => engine.continue_execution().await,
                    "debug_step_over" => engine.step_over().await,
                    "debug_step_into" => engine.step_into().await,
                    "debug_step_out" => engine.step_out().await,
                    _ => engine.pause().await,
                }
            };

            match tokio::time::timeout(state.options.stop_timeout, action).await {
                Ok(Ok(event)) => stop_payload(&engine, event),
                Ok(Err(err)) => failure(err),
                Err(_) => failure("timed out waiting for the debuggee to stop"),
            }
        }

        "debug_variables" => {
            let args: ThreadArgs = match parse(arguments) {
                Ok(args) => args,
                Err(err) => return err,
            };
            let engine = match state.engine() {
                Ok(engine) => engine,
                Err(err) => return failure(err),
            };

            match engine.get_locals(args.thread_id).await {
                Ok(variables) => json!({ "success": true, "variables": variables }),
                Err(err) => failure(err),
            }
        }

        "debug_stacktrace" => {
            let args: ThreadArgs = match parse(arguments) {
                Ok(args) => args,
                Err(err) => return err,
            };
            let engine = match state.engine() {
                Ok(engine) => engine,
                Err(err) => return failure(err),
            };

            match engine.get_stack_trace(args.thread_id).await {
                Ok(threads) => json!({ "success": true, "threads": threads }),
                Err(err) => failure(err),
            }
        }

        "debug_evaluate" => {
            let args: EvaluateArgs = match parse(arguments) {
                Ok(args) => args,
                Err(err) => return err,
            };
            let engine = match state.engine() {
                Ok(engine) => engine,
                Err(err) => return failure(err),
            };

            match engine.evaluate(&args.expression).await {
                Ok(result) => serde_json::to_value(result)
                    .unwrap_or_else(|err| failure(err)),
                Err(err) => failure(err),
            }
        }

        other => {
            warn!("unknown tool: {other}");
            failure(format!("unknown tool '{other}'"))
        }
    }
}

fn stop_payload(engine: &DebugEngine, event: DebugEvent) -> Value {
    json!({
        "success": true,
        "state": state_string(engine.state()),
        "event": event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_spec_tool_is_listed() {
        let definitions = tool_definitions();
        let names: Vec<&str> = definitions
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();

        for expected in [
            "debug_launch",
            "debug_launch_test",
            "debug_attach",
            "debug_disconnect",
            "debug_status",
            "debug_set_breakpoint",
            "debug_remove_breakpoint",
            "debug_continue",
            "debug_step_over",
            "debug_step_into",
            "debug_step_out",
            "debug_pause",
            "debug_variables",
            "debug_stacktrace",
            "debug_evaluate",
            "debug_list_breakpoints",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }

    #[test]
    fn tool_schemas_declare_required_arguments() {
        let definitions = tool_definitions();
        let set_breakpoint = definitions
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["name"] == "debug_set_breakpoint")
            .unwrap();

        assert_eq!(
            set_breakpoint["inputSchema"]["required"],
            serde_json::json!(["dll_path", "source_file", "line"])
        );
    }

    #[tokio::test]
    async fn unknown_tool_reports_failure() {
        let state = ServerState::new(ServerOptions {
            dbgshim_path: None,
            stop_timeout: Duration::from_secs(30),
        });

        let result = call_tool(&state, "debug_frobnicate", &serde_json::json!({})).await;
        assert_eq!(result["success"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn status_works_without_an_engine() {
        let state = ServerState::new(ServerOptions {
            dbgshim_path: None,
            stop_timeout: Duration::from_secs(30),
        });

        let result = call_tool(&state, "debug_status", &serde_json::json!({})).await;
        assert_eq!(result["state"], serde_json::json!("idle"));
        assert!(result["version"].as_str().is_some());
    }
}
