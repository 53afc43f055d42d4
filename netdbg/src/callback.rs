// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The managed-callback sink: one COM object the runtime invokes for every
//! debug event, on its own internal thread.
//!
//! Contract per method: the debuggee is stopped on entry. Stopping events
//! publish on the event channel and return WITHOUT continuing, leaving the
//! process paused for inspection. Informational events must call
//! `Continue` exactly once before returning, or the debuggee freezes.
//!
//! The object answers `QueryInterface` for both `ICorDebugManagedCallback`
//! and `ICorDebugManagedCallback2` from a single allocation carrying two
//! vtable pointers.

use std::ffi::c_void;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cordebug::guids::{
    Guid, IID_ICOR_DEBUG_MANAGED_CALLBACK, IID_ICOR_DEBUG_MANAGED_CALLBACK2, IID_IUNKNOWN,
};
use cordebug::raw::{
    self, ICorDebugManagedCallback2Vtbl, ICorDebugManagedCallbackVtbl, IUnknownVtbl, RawPtr,
};
use cordebug::{
    Breakpoint, CorError, ExceptionCallbackType, Hresult, Module, Thread, S_OK,
};
use log::{debug, trace, warn};

use crate::events::DebugEvent;
use crate::session::EngineShared;
use crate::stack::{read_exception_info, top_frame};

const E_NOINTERFACE: Hresult = 0x8000_4002_u32 as i32;
const E_INVALIDARG: Hresult = 0x8007_0057_u32 as i32;

#[repr(C)]
pub(crate) struct ManagedCallback {
    vtbl1: *const ICorDebugManagedCallbackVtbl,
    vtbl2: *const ICorDebugManagedCallback2Vtbl,
    refcount: AtomicU32,
    state: Arc<EngineShared>,
}

impl ManagedCallback {
    /// Allocate the sink with one reference, owned by the caller; hand the
    /// pointer to `ICorDebug::SetManagedHandler` and release.
    pub fn create(state: Arc<EngineShared>) -> RawPtr {
        let object = Box::new(ManagedCallback {
            vtbl1: &CALLBACK_VTBL,
            vtbl2: &CALLBACK2_VTBL,
            refcount: AtomicU32::new(1),
            state,
        });

        Box::into_raw(object) as RawPtr
    }

    pub unsafe fn release(ptr: RawPtr) {
        release(ptr);
    }
}

unsafe fn object(this: RawPtr) -> &'static ManagedCallback {
    &*(this as *const ManagedCallback)
}

/// Rebase a callback2 `this` (second vtable slot) to the object base.
unsafe fn rebase2(this: RawPtr) -> RawPtr {
    (this as *mut u8).sub(std::mem::size_of::<*const c_void>()) as RawPtr
}

// ---------------------------------------------------------------------------
// IUnknown
// ---------------------------------------------------------------------------

unsafe extern "system" fn query_interface(
    this: RawPtr,
    iid: *const Guid,
    out: *mut RawPtr,
) -> Hresult {
    if iid.is_null() || out.is_null() {
        return E_INVALIDARG;
    }

    let iid = &*iid;

    if *iid == IID_IUNKNOWN || *iid == IID_ICOR_DEBUG_MANAGED_CALLBACK {
        *out = this;
        add_ref(this);
        return S_OK;
    }

    if *iid == IID_ICOR_DEBUG_MANAGED_CALLBACK2 {
        *out = (this as *mut u8).add(std::mem::size_of::<*const c_void>()) as RawPtr;
        add_ref(this);
        return S_OK;
    }

    *out = std::ptr::null_mut();
    E_NOINTERFACE
}

unsafe extern "system" fn add_ref(this: RawPtr) -> u32 {
    object(this).refcount.fetch_add(1, Ordering::AcqRel) + 1
}

unsafe extern "system" fn release(this: RawPtr) -> u32 {
    let remaining = object(this).refcount.fetch_sub(1, Ordering::AcqRel) - 1;
    if remaining == 0 {
        drop(Box::from_raw(this as *mut ManagedCallback));
    }
    remaining
}

unsafe extern "system" fn query_interface2(
    this: RawPtr,
    iid: *const Guid,
    out: *mut RawPtr,
) -> Hresult {
    query_interface(rebase2(this), iid, out)
}

unsafe extern "system" fn add_ref2(this: RawPtr) -> u32 {
    add_ref(rebase2(this))
}

unsafe extern "system" fn release2(this: RawPtr) -> u32 {
    release(rebase2(this))
}

// ---------------------------------------------------------------------------
// Shared handler plumbing
// ---------------------------------------------------------------------------

/// Borrow an `[in]` interface pointer as an owned wrapper: the caller
/// retains its reference, so take one of our own first.
unsafe fn borrow<T>(
    ptr: RawPtr,
    wrap: impl FnOnce(RawPtr) -> Result<T, CorError>,
) -> Option<T> {
    if ptr.is_null() {
        return None;
    }

    raw::unknown_add_ref(ptr);
    wrap(ptr).ok()
}

/// Resume an informational event via whichever controller the runtime
/// supplied (process or appdomain).
unsafe fn continue_controller(controller: RawPtr, event: &'static str) {
    if controller.is_null() {
        warn!("{event}: no controller to continue");
        return;
    }

    let hr = raw::controller_continue(controller, false);
    if hr < 0 {
        warn!("{event}: Continue failed with HRESULT {hr:#010x}");
    }
}

/// Record the stopping thread and fetch its id and top frame.
unsafe fn stopping_thread(
    shared: &EngineShared,
    thread_ptr: RawPtr,
) -> (u32, Option<crate::events::StackFrame>) {
    let Some(thread) = borrow(thread_ptr, |p| Thread::from_raw(p)) else {
        return (0, None);
    };

    let tid = thread.get_id().unwrap_or(0);
    shared.current_stopped_thread.store(tid, Ordering::SeqCst);

    let frame = top_frame(shared, &thread);
    (tid, frame)
}

unsafe fn wide_to_string(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }

    let mut len = 0usize;
    while *ptr.add(len) != 0 {
        len += 1;
    }

    String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
}

// ---------------------------------------------------------------------------
// ICorDebugManagedCallback
// ---------------------------------------------------------------------------

unsafe extern "system" fn on_breakpoint(
    this: RawPtr,
    _appdomain: RawPtr,
    thread: RawPtr,
    breakpoint: RawPtr,
) -> Hresult {
    let shared = &object(this).state;
    let (thread_id, top_frame) = stopping_thread(shared, thread);

    // Wrapper identity is not stable across callbacks; key the lookup by
    // the stable (method token, IL offset) pair instead.
    let breakpoint_id = borrow(breakpoint, |p| Breakpoint::from_raw(p)).and_then(|bp| {
        let function_bp = bp.to_function_breakpoint().ok()?;
        let token = function_bp.get_function().ok()?.get_token().ok()?;
        let offset = function_bp.get_offset().ok()?;

        shared
            .breakpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .id_for(token, offset)
    });

    match breakpoint_id {
        Some(id) => shared.publish(DebugEvent::BreakpointHit {
            breakpoint_id: id,
            thread_id,
            top_frame,
        }),
        None => shared.publish(DebugEvent::Stopped {
            reason: "breakpoint".to_string(),
            thread_id,
            top_frame,
        }),
    }

    S_OK
}

unsafe extern "system" fn on_step_complete(
    this: RawPtr,
    _appdomain: RawPtr,
    thread: RawPtr,
    _stepper: RawPtr,
    _reason: u32,
) -> Hresult {
    let shared = &object(this).state;
    let (thread_id, top_frame) = stopping_thread(shared, thread);

    shared.publish(DebugEvent::Stopped {
        reason: "step".to_string(),
        thread_id,
        top_frame,
    });

    S_OK
}

unsafe extern "system" fn on_break(this: RawPtr, _appdomain: RawPtr, thread: RawPtr) -> Hresult {
    let shared = &object(this).state;
    let (thread_id, top_frame) = stopping_thread(shared, thread);

    shared.publish(DebugEvent::Stopped {
        reason: "pause".to_string(),
        thread_id,
        top_frame,
    });

    S_OK
}

unsafe extern "system" fn on_exception(
    this: RawPtr,
    appdomain: RawPtr,
    thread: RawPtr,
    unhandled: i32,
) -> Hresult {
    let shared = &object(this).state;
    let unhandled = unhandled != 0;

    let first_chance_wanted = shared.notify_first_chance.load(Ordering::SeqCst);
    if !unhandled && !first_chance_wanted {
        continue_controller(appdomain, "Exception");
        return S_OK;
    }

    // Read before any continue: the current-exception context dies with
    // the active exception.
    let (thread_id, info) = match borrow(thread, |p| Thread::from_raw(p)) {
        Some(thread_handle) => {
            let tid = thread_handle.get_id().unwrap_or(0);
            shared.current_stopped_thread.store(tid, Ordering::SeqCst);
            (tid, read_exception_info(shared, &thread_handle))
        }
        None => (
            0,
            (
                "<unknown>".to_string(),
                "Exception info unavailable".to_string(),
            ),
        ),
    };

    if unhandled {
        // Suppress the duplicate report from the v2 UNHANDLED callback.
        shared.exception_stop_pending.store(true, Ordering::SeqCst);
    }

    shared.publish(DebugEvent::Exception {
        type_name: info.0,
        message: info.1,
        thread_id,
        is_unhandled: unhandled,
    });

    S_OK
}

unsafe extern "system" fn on_eval_complete(
    this: RawPtr,
    appdomain: RawPtr,
    _thread: RawPtr,
    _eval: RawPtr,
) -> Hresult {
    let _ = this;
    continue_controller(appdomain, "EvalComplete");
    S_OK
}

unsafe extern "system" fn on_eval_exception(
    this: RawPtr,
    appdomain: RawPtr,
    _thread: RawPtr,
    _eval: RawPtr,
) -> Hresult {
    let _ = this;
    continue_controller(appdomain, "EvalException");
    S_OK
}

unsafe extern "system" fn on_create_process(this: RawPtr, process: RawPtr) -> Hresult {
    let shared = &object(this).state;

    // Capture the owning session id; ExitProcess compares it against the
    // then-current id to reject stale sessions.
    let current = shared.session_id.load(Ordering::SeqCst);
    shared.create_process_session.store(current, Ordering::SeqCst);

    if let Some(notify) = shared
        .attach_notify
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
    {
        let _ = notify.send(());
    }

    if shared.stop_at_create_process.load(Ordering::SeqCst) {
        // The "launch returns with the process suspended" primitive: the
        // caller sets breakpoints before the first continue.
        shared.publish(DebugEvent::Stopped {
            reason: "process_created".to_string(),
            thread_id: 0,
            top_frame: None,
        });
        return S_OK;
    }

    continue_controller(process, "CreateProcess");
    S_OK
}

unsafe extern "system" fn on_exit_process(this: RawPtr, _process: RawPtr) -> Hresult {
    let shared = &object(this).state;

    let captured = shared.create_process_session.load(Ordering::SeqCst);
    let current = shared.session_id.load(Ordering::SeqCst);

    // Relaunch hygiene: a prior debuggee may die after a new session has
    // begun. Both guards are needed.
    if captured != current {
        debug!("ExitProcess from stale session {captured} (current {current}); ignored");
        return S_OK;
    }
    if shared.suppress_exit_process.load(Ordering::SeqCst) {
        debug!("ExitProcess suppressed during disconnect");
        return S_OK;
    }

    shared.publish(DebugEvent::Exited { exit_code: 0 });
    shared.close_event_channel();

    // The process is gone; there is nothing to continue.
    S_OK
}

unsafe extern "system" fn on_create_thread(
    this: RawPtr,
    appdomain: RawPtr,
    thread: RawPtr,
) -> Hresult {
    let shared = &object(this).state;

    if let Some(thread) = borrow(thread, |p| Thread::from_raw(p)) {
        if let Ok(tid) = thread.get_id() {
            shared
                .known_threads
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(tid);
        }
    }

    continue_controller(appdomain, "CreateThread");
    S_OK
}

unsafe extern "system" fn on_exit_thread(
    this: RawPtr,
    appdomain: RawPtr,
    thread: RawPtr,
) -> Hresult {
    let shared = &object(this).state;

    if let Some(thread) = borrow(thread, |p| Thread::from_raw(p)) {
        if let Ok(tid) = thread.get_id() {
            shared
                .known_threads
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&tid);
        }
    }

    continue_controller(appdomain, "ExitThread");
    S_OK
}

unsafe extern "system" fn on_load_module(
    this: RawPtr,
    appdomain: RawPtr,
    module: RawPtr,
) -> Hresult {
    let shared = &object(this).state;

    if let Some(module) = borrow(module, |p| Module::from_raw(p)) {
        match module.get_name() {
            Ok(path) => {
                trace!("module loaded: {path}");
                resolve_pending_breakpoints(shared, &path, &module);
                shared
                    .modules
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(path, module);
            }
            Err(err) => debug!("LoadModule: GetName failed: {err}"),
        }
    }

    continue_controller(appdomain, "LoadModule");
    S_OK
}

/// Drain the pending queue for a freshly loaded module: create the
/// per-offset native breakpoint and index the composite key.
fn resolve_pending_breakpoints(shared: &EngineShared, module_path: &str, module: &Module) {
    let pending = shared
        .breakpoints
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .pending_for_module(module_path);

    for (id, method_token, il_offset) in pending {
        let resolved = module
            .get_function_from_token(method_token)
            .and_then(|function| function.get_il_code())
            .and_then(|code| code.create_breakpoint(il_offset))
            .and_then(|native| {
                native.activate(true)?;
                Ok(native)
            });

        match resolved {
            Ok(native) => {
                debug!("breakpoint {id} resolved in {module_path} at IL {il_offset:#x}");
                shared
                    .breakpoints
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .mark_active(id, native);
            }
            Err(err) => warn!("breakpoint {id} failed to bind in {module_path}: {err}"),
        }
    }
}

unsafe extern "system" fn on_unload_module(
    this: RawPtr,
    appdomain: RawPtr,
    _module: RawPtr,
) -> Hresult {
    let _ = this;
    continue_controller(appdomain, "UnloadModule");
    S_OK
}

unsafe extern "system" fn on_load_class(
    this: RawPtr,
    appdomain: RawPtr,
    _class: RawPtr,
) -> Hresult {
    let _ = this;
    continue_controller(appdomain, "LoadClass");
    S_OK
}

unsafe extern "system" fn on_unload_class(
    this: RawPtr,
    appdomain: RawPtr,
    _class: RawPtr,
) -> Hresult {
    let _ = this;
    continue_controller(appdomain, "UnloadClass");
    S_OK
}

unsafe extern "system" fn on_debugger_error(
    this: RawPtr,
    process: RawPtr,
    hr: Hresult,
    error_code: u32,
) -> Hresult {
    let _ = this;
    warn!("DebuggerError: hr={hr:#010x} code={error_code}");
    continue_controller(process, "DebuggerError");
    S_OK
}

unsafe extern "system" fn on_log_message(
    this: RawPtr,
    appdomain: RawPtr,
    _thread: RawPtr,
    _level: i32,
    _log_switch_name: *const u16,
    message: *const u16,
) -> Hresult {
    let shared = &object(this).state;

    let text = wide_to_string(message);
    if !text.is_empty() {
        shared.publish(DebugEvent::Output {
            category: "console".to_string(),
            text,
        });
    }

    continue_controller(appdomain, "LogMessage");
    S_OK
}

unsafe extern "system" fn on_log_switch(
    this: RawPtr,
    appdomain: RawPtr,
    _thread: RawPtr,
    _level: i32,
    _reason: u32,
    _name: *const u16,
    _parent: *const u16,
) -> Hresult {
    let _ = this;
    continue_controller(appdomain, "LogSwitch");
    S_OK
}

unsafe extern "system" fn on_create_app_domain(
    this: RawPtr,
    process: RawPtr,
    _appdomain: RawPtr,
) -> Hresult {
    let _ = this;
    continue_controller(process, "CreateAppDomain");
    S_OK
}

unsafe extern "system" fn on_exit_app_domain(
    this: RawPtr,
    process: RawPtr,
    _appdomain: RawPtr,
) -> Hresult {
    let _ = this;
    continue_controller(process, "ExitAppDomain");
    S_OK
}

unsafe extern "system" fn on_load_assembly(
    this: RawPtr,
    appdomain: RawPtr,
    _assembly: RawPtr,
) -> Hresult {
    let _ = this;
    continue_controller(appdomain, "LoadAssembly");
    S_OK
}

unsafe extern "system" fn on_unload_assembly(
    this: RawPtr,
    appdomain: RawPtr,
    _assembly: RawPtr,
) -> Hresult {
    let _ = this;
    continue_controller(appdomain, "UnloadAssembly");
    S_OK
}

unsafe extern "system" fn on_control_c_trap(this: RawPtr, process: RawPtr) -> Hresult {
    let _ = this;
    continue_controller(process, "ControlCTrap");
    S_OK
}

unsafe extern "system" fn on_name_change(
    this: RawPtr,
    appdomain: RawPtr,
    _thread: RawPtr,
) -> Hresult {
    let _ = this;
    continue_controller(appdomain, "NameChange");
    S_OK
}

unsafe extern "system" fn on_update_module_symbols(
    this: RawPtr,
    appdomain: RawPtr,
    _module: RawPtr,
    _symbol_stream: RawPtr,
) -> Hresult {
    let _ = this;
    continue_controller(appdomain, "UpdateModuleSymbols");
    S_OK
}

unsafe extern "system" fn on_edit_and_continue_remap(
    this: RawPtr,
    appdomain: RawPtr,
    _thread: RawPtr,
    _function: RawPtr,
    _accurate: i32,
) -> Hresult {
    let _ = this;
    continue_controller(appdomain, "EditAndContinueRemap");
    S_OK
}

unsafe extern "system" fn on_breakpoint_set_error(
    this: RawPtr,
    appdomain: RawPtr,
    _thread: RawPtr,
    _breakpoint: RawPtr,
    error: u32,
) -> Hresult {
    let _ = this;
    warn!("BreakpointSetError: {error:#x}");
    continue_controller(appdomain, "BreakpointSetError");
    S_OK
}

// ---------------------------------------------------------------------------
// ICorDebugManagedCallback2
// ---------------------------------------------------------------------------

unsafe extern "system" fn on_function_remap_opportunity(
    this: RawPtr,
    appdomain: RawPtr,
    _thread: RawPtr,
    _old_function: RawPtr,
    _new_function: RawPtr,
    _old_il_offset: u32,
) -> Hresult {
    let _ = rebase2(this);
    continue_controller(appdomain, "FunctionRemapOpportunity");
    S_OK
}

unsafe extern "system" fn on_create_connection(
    this: RawPtr,
    process: RawPtr,
    _connection_id: u32,
    _name: *const u16,
) -> Hresult {
    let _ = rebase2(this);
    continue_controller(process, "CreateConnection");
    S_OK
}

unsafe extern "system" fn on_change_connection(
    this: RawPtr,
    process: RawPtr,
    _connection_id: u32,
) -> Hresult {
    let _ = rebase2(this);
    continue_controller(process, "ChangeConnection");
    S_OK
}

unsafe extern "system" fn on_destroy_connection(
    this: RawPtr,
    process: RawPtr,
    _connection_id: u32,
) -> Hresult {
    let _ = rebase2(this);
    continue_controller(process, "DestroyConnection");
    S_OK
}

unsafe extern "system" fn on_exception2(
    this: RawPtr,
    appdomain: RawPtr,
    thread: RawPtr,
    _frame: RawPtr,
    _offset: u32,
    event_type: u32,
    _flags: u32,
) -> Hresult {
    let shared = &object(rebase2(this)).state;

    if ExceptionCallbackType::from_raw(event_type) != ExceptionCallbackType::Unhandled {
        continue_controller(appdomain, "Exception2");
        return S_OK;
    }

    // The v1 callback normally reported this already; a set pending flag
    // means suppress the duplicate and keep going.
    if shared.exception_stop_pending.swap(false, Ordering::SeqCst) {
        continue_controller(appdomain, "Exception2(unhandled, deduped)");
        return S_OK;
    }

    let (thread_id, info) = match borrow(thread, |p| Thread::from_raw(p)) {
        Some(thread_handle) => {
            let tid = thread_handle.get_id().unwrap_or(0);
            shared.current_stopped_thread.store(tid, Ordering::SeqCst);
            (tid, read_exception_info(shared, &thread_handle))
        }
        None => (
            0,
            (
                "<unknown>".to_string(),
                "Exception info unavailable".to_string(),
            ),
        ),
    };

    shared.publish(DebugEvent::Exception {
        type_name: info.0,
        message: info.1,
        thread_id,
        is_unhandled: true,
    });

    S_OK
}

unsafe extern "system" fn on_exception_unwind(
    this: RawPtr,
    appdomain: RawPtr,
    _thread: RawPtr,
    _event_type: u32,
    _flags: u32,
) -> Hresult {
    let _ = rebase2(this);
    continue_controller(appdomain, "ExceptionUnwind");
    S_OK
}

unsafe extern "system" fn on_function_remap_complete(
    this: RawPtr,
    appdomain: RawPtr,
    _thread: RawPtr,
    _function: RawPtr,
) -> Hresult {
    let _ = rebase2(this);
    continue_controller(appdomain, "FunctionRemapComplete");
    S_OK
}

unsafe extern "system" fn on_mda_notification(
    this: RawPtr,
    controller: RawPtr,
    _thread: RawPtr,
    _mda: RawPtr,
) -> Hresult {
    let _ = rebase2(this);
    continue_controller(controller, "MDANotification");
    S_OK
}

// ---------------------------------------------------------------------------
// Vtables
// ---------------------------------------------------------------------------

static CALLBACK_VTBL: ICorDebugManagedCallbackVtbl = ICorDebugManagedCallbackVtbl {
    unknown: IUnknownVtbl {
        query_interface,
        add_ref,
        release,
    },
    breakpoint: on_breakpoint,
    step_complete: on_step_complete,
    break_: on_break,
    exception: on_exception,
    eval_complete: on_eval_complete,
    eval_exception: on_eval_exception,
    create_process: on_create_process,
    exit_process: on_exit_process,
    create_thread: on_create_thread,
    exit_thread: on_exit_thread,
    load_module: on_load_module,
    unload_module: on_unload_module,
    load_class: on_load_class,
    unload_class: on_unload_class,
    debugger_error: on_debugger_error,
    log_message: on_log_message,
    log_switch: on_log_switch,
    create_app_domain: on_create_app_domain,
    exit_app_domain: on_exit_app_domain,
    load_assembly: on_load_assembly,
    unload_assembly: on_unload_assembly,
    control_c_trap: on_control_c_trap,
    name_change: on_name_change,
    update_module_symbols: on_update_module_symbols,
    edit_and_continue_remap: on_edit_and_continue_remap,
    breakpoint_set_error: on_breakpoint_set_error,
};

static CALLBACK2_VTBL: ICorDebugManagedCallback2Vtbl = ICorDebugManagedCallback2Vtbl {
    unknown: IUnknownVtbl {
        query_interface: query_interface2,
        add_ref: add_ref2,
        release: release2,
    },
    function_remap_opportunity: on_function_remap_opportunity,
    create_connection: on_create_connection,
    change_connection: on_change_connection,
    destroy_connection: on_destroy_connection,
    exception: on_exception2,
    exception_unwind: on_exception_unwind,
    function_remap_complete: on_function_remap_complete,
    mda_notification: on_mda_notification,
};
