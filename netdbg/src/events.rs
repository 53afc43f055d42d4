// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Serializable shapes shared with the tool surface: session states,
//! debug events, stack frames, variable trees, eval results.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the debug session.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
    Exited,
}

/// One stack frame, built fresh per stack-trace request.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StackFrame {
    pub index: u32,
    pub method_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_line: Option<u32>,
    pub il_offset: u32,
}

/// All frames of one thread.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ThreadStack {
    pub thread_id: u32,
    pub frames: Vec<StackFrame>,
}

/// A rendered value tree node. `value` is always a display string
/// (`"42"`, `"\"hello\""`, `"null"`, `"DayOfWeek.Monday"`, `"{fields: 3}"`,
/// `"[7 elements]"`, `"<circular>"`, `"<max depth>"`).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct VariableNode {
    pub name: String,
    pub type_name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<VariableNode>,
}

impl VariableNode {
    pub fn leaf(
        name: impl Into<String>,
        type_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: value.into(),
            children: Vec::new(),
        }
    }
}

/// Result of a restricted `evaluate` call.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct EvalResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvalResult {
    pub fn found(value: impl Into<String>) -> Self {
        Self {
            success: true,
            value: Some(value.into()),
            error: None,
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(format!("Variable '{name}' not found in current scope")),
        }
    }
}

/// A stopping (or informational) event observed on the event channel.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DebugEvent {
    /// The debuggee stopped. `reason` is one of `entry`,
    /// `process_created`, `breakpoint`, `step`, `pause`.
    Stopped {
        reason: String,
        thread_id: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        top_frame: Option<StackFrame>,
    },
    BreakpointHit {
        breakpoint_id: u32,
        thread_id: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        top_frame: Option<StackFrame>,
    },
    Exception {
        type_name: String,
        message: String,
        thread_id: u32,
        is_unhandled: bool,
    },
    Exited {
        exit_code: i32,
    },
    Output {
        category: String,
        text: String,
    },
}

impl DebugEvent {
    /// The session state this event leaves the debuggee in, if it changes
    /// one.
    pub fn state_after(&self) -> Option<SessionState> {
        match self {
            DebugEvent::Stopped { .. }
            | DebugEvent::BreakpointHit { .. }
            | DebugEvent::Exception { .. } => Some(SessionState::Stopped),
            DebugEvent::Exited { .. } => Some(SessionState::Exited),
            DebugEvent::Output { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn events_carry_a_type_discriminator() {
        let event = DebugEvent::BreakpointHit {
            breakpoint_id: 3,
            thread_id: 12,
            top_frame: None,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "BreakpointHit", "breakpoint_id": 3, "thread_id": 12})
        );
    }

    #[test]
    fn exited_event_transitions_to_exited() {
        assert_eq!(
            DebugEvent::Exited { exit_code: 0 }.state_after(),
            Some(SessionState::Exited)
        );
        assert_eq!(
            DebugEvent::Output {
                category: "console".into(),
                text: "hi".into()
            }
            .state_after(),
            None
        );
    }

    #[test]
    fn variable_node_hides_empty_children() {
        let node = VariableNode::leaf("counter", "int", "0");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            value,
            json!({"name": "counter", "type_name": "int", "value": "0"})
        );
    }

    #[test]
    fn session_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(SessionState::Stopped).unwrap(),
            json!("stopped")
        );
    }
}
