// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Interactive debugger engine for managed .NET processes on Linux.
//!
//! One engine per process drives one live debuggee: build-and-launch or
//! attach, source-level breakpoints, resume/step, stack and locals
//! inspection, disconnect. The engine owns the native CoreCLR debugging
//! interface directly (via `cordebug` over the `dbgshim` helper library)
//! and translates its single-threaded callback model into an async event
//! stream.
//!
//! Threading model: a dedicated dispatch thread performs every call into
//! the runtime capability surface; public `async` methods enqueue closures
//! onto a command channel and await their completion. The runtime invokes
//! the callback sink on its own internal thread; stopping events are
//! published on an event channel that resume-style commands await.

mod breakpoints;
mod callback;
mod engine;
mod error;
mod eval;
mod events;
mod launcher;
mod session;
mod stack;
mod values;

pub use breakpoints::BreakpointInfo;
pub use engine::{DebugEngine, EngineOptions};
pub use error::EngineError;
pub use events::{
    DebugEvent, EvalResult, SessionState, StackFrame, ThreadStack, VariableNode,
};
pub use launcher::BuildOutput;

pub type Result<T> = std::result::Result<T, EngineError>;
