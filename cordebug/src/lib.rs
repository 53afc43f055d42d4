// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed view of the CoreCLR debugging capability surface (`ICorDebug` and
//! friends) as exported by the runtime's debugger interface library.
//!
//! The interfaces are COM-style vtables. Only the slots the debug engine
//! actually calls carry typed signatures; every other slot is kept as an
//! opaque pointer so the vtable offsets stay correct. Safe wrapper types
//! own exactly one interface pointer each and `Release` it on drop.
//!
//! Threading: the runtime requires that every call made from the debugger
//! side originate on a single thread. The wrappers are `Send` so the engine
//! can park them in registries, but the engine's dispatch thread is the only
//! place they may be *used*. Enforcing that is the engine's job, not ours.

pub mod guids;
mod hresult;
pub mod raw;
mod types;
mod wrap;

pub use guids::Guid;
pub use hresult::{check_hresult, CorError, Hresult, CORDBG_E_IL_VAR_NOT_AVAILABLE, S_FALSE, S_OK};
pub use types::{
    CorElementType, ExceptionCallbackType, COR_DEBUG_INTERCEPT_NONE, COR_DEBUG_STOP_NONE,
    METHOD_DEF_TOKEN_BASE,
};
pub use wrap::{
    AppDomain, ArrayValue, Breakpoint, Chain, Class, Code, Controller, CorDebug, Frame, Function,
    FunctionBreakpoint, GenericValue, IlFrame, Module, ObjectValue, Process, ReferenceValue,
    StepRange, Stepper, StringValue, Thread, Value,
};
