// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Raw vtable layouts for the ICorDebug interface family.
//!
//! Slot order is load-bearing: it must match the interface definition
//! exactly. Slots the engine never calls are declared as opaque pointers.

#![allow(clippy::missing_safety_doc)]

use std::ffi::c_void;

use crate::guids::Guid;
use crate::hresult::{CorError, Hresult};

pub type RawPtr = *mut c_void;

/// Opaque placeholder for a vtable slot the engine never invokes.
pub type UnusedSlot = *const c_void;

#[repr(C)]
pub struct IUnknownVtbl {
    pub query_interface:
        unsafe extern "system" fn(this: RawPtr, iid: *const Guid, out: *mut RawPtr) -> Hresult,
    pub add_ref: unsafe extern "system" fn(this: RawPtr) -> u32,
    pub release: unsafe extern "system" fn(this: RawPtr) -> u32,
}

/// Any COM object viewed through its IUnknown prefix.
#[repr(C)]
struct AnyObject {
    vtbl: *const IUnknownVtbl,
}

pub unsafe fn unknown_add_ref(ptr: RawPtr) -> u32 {
    let object = ptr as *mut AnyObject;
    ((*(*object).vtbl).add_ref)(ptr)
}

pub unsafe fn unknown_release(ptr: RawPtr) -> u32 {
    let object = ptr as *mut AnyObject;
    ((*(*object).vtbl).release)(ptr)
}

/// `ICorDebugController::Continue` on any controller-derived interface
/// pointer (process or appdomain); the controller vtable is their shared
/// prefix. Used by callback handlers that resume informational events.
pub unsafe fn controller_continue(ptr: RawPtr, out_of_band: bool) -> Hresult {
    let vtbl = &**(ptr as *mut *const ICorDebugControllerVtbl);
    (vtbl.continue_)(ptr, i32::from(out_of_band))
}

pub unsafe fn unknown_query_interface(ptr: RawPtr, iid: &Guid) -> Result<RawPtr, CorError> {
    let object = ptr as *mut AnyObject;
    let mut out: RawPtr = std::ptr::null_mut();

    let hr = ((*(*object).vtbl).query_interface)(ptr, iid, &mut out);
    crate::hresult::check_hresult("QueryInterface", hr)?;

    if out.is_null() {
        return Err(CorError::NullInterface("QueryInterface result"));
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Debug root, controller, process, appdomain
// ---------------------------------------------------------------------------

#[repr(C)]
pub struct ICorDebugVtbl {
    pub unknown: IUnknownVtbl,
    pub initialize: unsafe extern "system" fn(this: RawPtr) -> Hresult,
    pub terminate: unsafe extern "system" fn(this: RawPtr) -> Hresult,
    pub set_managed_handler:
        unsafe extern "system" fn(this: RawPtr, callback: RawPtr) -> Hresult,
    pub set_unmanaged_handler: UnusedSlot,
    pub create_process: UnusedSlot,
    pub debug_active_process: unsafe extern "system" fn(
        this: RawPtr,
        pid: u32,
        win32_attach: i32,
        process: *mut RawPtr,
    ) -> Hresult,
    pub enumerate_processes: UnusedSlot,
    pub get_process:
        unsafe extern "system" fn(this: RawPtr, pid: u32, process: *mut RawPtr) -> Hresult,
    pub can_launch_or_attach: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugControllerVtbl {
    pub unknown: IUnknownVtbl,
    pub stop: unsafe extern "system" fn(this: RawPtr, timeout_ms: u32) -> Hresult,
    pub continue_: unsafe extern "system" fn(this: RawPtr, out_of_band: i32) -> Hresult,
    pub is_running: UnusedSlot,
    pub has_queued_callbacks: UnusedSlot,
    pub enumerate_threads:
        unsafe extern "system" fn(this: RawPtr, threads: *mut RawPtr) -> Hresult,
    pub set_all_threads_debug_state:
        unsafe extern "system" fn(this: RawPtr, state: u32, except: RawPtr) -> Hresult,
    pub detach: unsafe extern "system" fn(this: RawPtr) -> Hresult,
    pub terminate: unsafe extern "system" fn(this: RawPtr, exit_code: u32) -> Hresult,
    pub can_commit_changes: UnusedSlot,
    pub commit_changes: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugProcessVtbl {
    pub controller: ICorDebugControllerVtbl,
    pub get_id: unsafe extern "system" fn(this: RawPtr, pid: *mut u32) -> Hresult,
    pub get_handle: UnusedSlot,
    pub get_thread:
        unsafe extern "system" fn(this: RawPtr, tid: u32, thread: *mut RawPtr) -> Hresult,
    pub enumerate_objects: UnusedSlot,
    pub is_transition_stub: UnusedSlot,
    pub is_os_suspended: UnusedSlot,
    pub get_thread_context: UnusedSlot,
    pub set_thread_context: UnusedSlot,
    pub read_memory: unsafe extern "system" fn(
        this: RawPtr,
        address: u64,
        size: u32,
        buffer: *mut u8,
        read: *mut usize,
    ) -> Hresult,
    pub write_memory: unsafe extern "system" fn(
        this: RawPtr,
        address: u64,
        size: u32,
        buffer: *const u8,
        written: *mut usize,
    ) -> Hresult,
    pub clear_current_exception: UnusedSlot,
    pub enable_log_messages: unsafe extern "system" fn(this: RawPtr, on: i32) -> Hresult,
    pub modify_log_switch: UnusedSlot,
    pub enumerate_app_domains: UnusedSlot,
    pub get_object: UnusedSlot,
    pub thread_for_fiber_cookie: UnusedSlot,
    pub get_helper_thread_id: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugAppDomainVtbl {
    pub controller: ICorDebugControllerVtbl,
    pub get_process: UnusedSlot,
    pub enumerate_assemblies: UnusedSlot,
    pub get_module_from_metadata_interface: UnusedSlot,
    pub enumerate_breakpoints: UnusedSlot,
    pub enumerate_steppers: UnusedSlot,
    pub is_attached: UnusedSlot,
    pub get_name: UnusedSlot,
    pub get_object: UnusedSlot,
    pub attach: UnusedSlot,
    pub get_id: UnusedSlot,
}

// ---------------------------------------------------------------------------
// Threads, chains, frames
// ---------------------------------------------------------------------------

#[repr(C)]
pub struct ICorDebugThreadVtbl {
    pub unknown: IUnknownVtbl,
    pub get_process: UnusedSlot,
    pub get_id: unsafe extern "system" fn(this: RawPtr, tid: *mut u32) -> Hresult,
    pub get_handle: UnusedSlot,
    pub get_app_domain: UnusedSlot,
    pub set_debug_state: UnusedSlot,
    pub get_debug_state: UnusedSlot,
    pub get_user_state: UnusedSlot,
    pub get_current_exception:
        unsafe extern "system" fn(this: RawPtr, value: *mut RawPtr) -> Hresult,
    pub clear_current_exception: UnusedSlot,
    pub create_stepper:
        unsafe extern "system" fn(this: RawPtr, stepper: *mut RawPtr) -> Hresult,
    pub enumerate_chains:
        unsafe extern "system" fn(this: RawPtr, chains: *mut RawPtr) -> Hresult,
    pub get_active_chain: UnusedSlot,
    pub get_active_frame:
        unsafe extern "system" fn(this: RawPtr, frame: *mut RawPtr) -> Hresult,
    pub get_register_set: UnusedSlot,
    pub create_eval: UnusedSlot,
    pub get_object: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugChainVtbl {
    pub unknown: IUnknownVtbl,
    pub get_thread: UnusedSlot,
    pub get_stack_range:
        unsafe extern "system" fn(this: RawPtr, start: *mut u64, end: *mut u64) -> Hresult,
    pub get_context: UnusedSlot,
    pub get_caller: UnusedSlot,
    pub get_callee: UnusedSlot,
    pub get_previous: UnusedSlot,
    pub get_next: UnusedSlot,
    pub is_managed: unsafe extern "system" fn(this: RawPtr, managed: *mut i32) -> Hresult,
    pub enumerate_frames:
        unsafe extern "system" fn(this: RawPtr, frames: *mut RawPtr) -> Hresult,
    pub get_active_frame: UnusedSlot,
    pub get_register_set: UnusedSlot,
    pub get_reason: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugFrameVtbl {
    pub unknown: IUnknownVtbl,
    pub get_chain: UnusedSlot,
    pub get_code: UnusedSlot,
    pub get_function:
        unsafe extern "system" fn(this: RawPtr, function: *mut RawPtr) -> Hresult,
    pub get_function_token:
        unsafe extern "system" fn(this: RawPtr, token: *mut u32) -> Hresult,
    pub get_stack_range:
        unsafe extern "system" fn(this: RawPtr, start: *mut u64, end: *mut u64) -> Hresult,
    pub get_caller: UnusedSlot,
    pub get_callee: UnusedSlot,
    pub create_stepper: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugILFrameVtbl {
    pub frame: ICorDebugFrameVtbl,
    pub get_ip:
        unsafe extern "system" fn(this: RawPtr, offset: *mut u32, mapping: *mut u32) -> Hresult,
    pub set_ip: UnusedSlot,
    pub enumerate_local_variables: UnusedSlot,
    pub get_local_variable:
        unsafe extern "system" fn(this: RawPtr, slot: u32, value: *mut RawPtr) -> Hresult,
    pub enumerate_arguments: UnusedSlot,
    pub get_argument:
        unsafe extern "system" fn(this: RawPtr, slot: u32, value: *mut RawPtr) -> Hresult,
    pub get_stack_depth: UnusedSlot,
    pub get_stack_value: UnusedSlot,
    pub can_set_ip: UnusedSlot,
}

// ---------------------------------------------------------------------------
// Functions, code, modules, classes
// ---------------------------------------------------------------------------

#[repr(C)]
pub struct ICorDebugFunctionVtbl {
    pub unknown: IUnknownVtbl,
    pub get_module: unsafe extern "system" fn(this: RawPtr, module: *mut RawPtr) -> Hresult,
    pub get_class: unsafe extern "system" fn(this: RawPtr, class: *mut RawPtr) -> Hresult,
    pub get_token: unsafe extern "system" fn(this: RawPtr, token: *mut u32) -> Hresult,
    pub get_il_code: unsafe extern "system" fn(this: RawPtr, code: *mut RawPtr) -> Hresult,
    pub get_native_code: UnusedSlot,
    pub create_breakpoint: UnusedSlot,
    pub get_local_var_sig_token: UnusedSlot,
    pub get_current_version_number: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugCodeVtbl {
    pub unknown: IUnknownVtbl,
    pub is_il: unsafe extern "system" fn(this: RawPtr, is_il: *mut i32) -> Hresult,
    pub get_function: UnusedSlot,
    pub get_address: UnusedSlot,
    pub get_size: unsafe extern "system" fn(this: RawPtr, size: *mut u32) -> Hresult,
    pub create_breakpoint: unsafe extern "system" fn(
        this: RawPtr,
        il_offset: u32,
        breakpoint: *mut RawPtr,
    ) -> Hresult,
    pub get_code: UnusedSlot,
    pub get_version_number: UnusedSlot,
    pub get_il_to_native_mapping: UnusedSlot,
    pub get_enc_remap_sequence_points: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugModuleVtbl {
    pub unknown: IUnknownVtbl,
    pub get_process: UnusedSlot,
    pub get_base_address: UnusedSlot,
    pub get_assembly: UnusedSlot,
    pub get_name: unsafe extern "system" fn(
        this: RawPtr,
        cch: u32,
        written: *mut u32,
        name: *mut u16,
    ) -> Hresult,
    pub enable_jit_debugging: UnusedSlot,
    pub enable_class_load_callbacks: UnusedSlot,
    pub get_function_from_token:
        unsafe extern "system" fn(this: RawPtr, token: u32, function: *mut RawPtr) -> Hresult,
    pub get_function_from_rva: UnusedSlot,
    pub get_class_from_token:
        unsafe extern "system" fn(this: RawPtr, token: u32, class: *mut RawPtr) -> Hresult,
    pub create_breakpoint: UnusedSlot,
    pub get_edit_and_continue_snapshot: UnusedSlot,
    pub get_metadata_interface: unsafe extern "system" fn(
        this: RawPtr,
        iid: *const Guid,
        out: *mut RawPtr,
    ) -> Hresult,
    pub get_token: UnusedSlot,
    pub is_dynamic: UnusedSlot,
    pub get_global_variable_value: UnusedSlot,
    pub get_size: UnusedSlot,
    pub is_in_memory: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugClassVtbl {
    pub unknown: IUnknownVtbl,
    pub get_module: unsafe extern "system" fn(this: RawPtr, module: *mut RawPtr) -> Hresult,
    pub get_token: unsafe extern "system" fn(this: RawPtr, token: *mut u32) -> Hresult,
    pub get_static_field_value: unsafe extern "system" fn(
        this: RawPtr,
        field_token: u32,
        frame: RawPtr,
        value: *mut RawPtr,
    ) -> Hresult,
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[repr(C)]
pub struct ICorDebugValueVtbl {
    pub unknown: IUnknownVtbl,
    pub get_type: unsafe extern "system" fn(this: RawPtr, element_type: *mut u32) -> Hresult,
    pub get_size: unsafe extern "system" fn(this: RawPtr, size: *mut u32) -> Hresult,
    pub get_address: unsafe extern "system" fn(this: RawPtr, address: *mut u64) -> Hresult,
    pub create_breakpoint: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugGenericValueVtbl {
    pub value: ICorDebugValueVtbl,
    pub get_value: unsafe extern "system" fn(this: RawPtr, dest: *mut c_void) -> Hresult,
    pub set_value: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugReferenceValueVtbl {
    pub value: ICorDebugValueVtbl,
    pub is_null: unsafe extern "system" fn(this: RawPtr, is_null: *mut i32) -> Hresult,
    pub get_value: unsafe extern "system" fn(this: RawPtr, address: *mut u64) -> Hresult,
    pub set_value: UnusedSlot,
    pub dereference: unsafe extern "system" fn(this: RawPtr, value: *mut RawPtr) -> Hresult,
    pub dereference_strong: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugHeapValueVtbl {
    pub value: ICorDebugValueVtbl,
    pub is_valid: UnusedSlot,
    pub create_reloc_breakpoint: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugObjectValueVtbl {
    pub value: ICorDebugValueVtbl,
    pub get_class: unsafe extern "system" fn(this: RawPtr, class: *mut RawPtr) -> Hresult,
    pub get_field_value: unsafe extern "system" fn(
        this: RawPtr,
        class: RawPtr,
        field_token: u32,
        value: *mut RawPtr,
    ) -> Hresult,
    pub get_virtual_method: UnusedSlot,
    pub get_context: UnusedSlot,
    pub is_value_class:
        unsafe extern "system" fn(this: RawPtr, is_value_class: *mut i32) -> Hresult,
    pub get_managed_copy: UnusedSlot,
    pub set_from_managed_copy: UnusedSlot,
}

#[repr(C)]
pub struct ICorDebugStringValueVtbl {
    pub heap: ICorDebugHeapValueVtbl,
    pub get_length: unsafe extern "system" fn(this: RawPtr, length: *mut u32) -> Hresult,
    pub get_string: unsafe extern "system" fn(
        this: RawPtr,
        cch: u32,
        written: *mut u32,
        buffer: *mut u16,
    ) -> Hresult,
}

#[repr(C)]
pub struct ICorDebugArrayValueVtbl {
    pub heap: ICorDebugHeapValueVtbl,
    pub get_element_type:
        unsafe extern "system" fn(this: RawPtr, element_type: *mut u32) -> Hresult,
    pub get_rank: unsafe extern "system" fn(this: RawPtr, rank: *mut u32) -> Hresult,
    pub get_count: unsafe extern "system" fn(this: RawPtr, count: *mut u32) -> Hresult,
    pub get_dimensions: UnusedSlot,
    pub has_base_indicies: UnusedSlot,
    pub get_base_indicies: UnusedSlot,
    pub get_element: UnusedSlot,
    pub get_element_at_position:
        unsafe extern "system" fn(this: RawPtr, position: u32, value: *mut RawPtr) -> Hresult,
}

// ---------------------------------------------------------------------------
// Breakpoints and steppers
// ---------------------------------------------------------------------------

#[repr(C)]
pub struct ICorDebugBreakpointVtbl {
    pub unknown: IUnknownVtbl,
    pub activate: unsafe extern "system" fn(this: RawPtr, active: i32) -> Hresult,
    pub is_active: unsafe extern "system" fn(this: RawPtr, active: *mut i32) -> Hresult,
}

#[repr(C)]
pub struct ICorDebugFunctionBreakpointVtbl {
    pub breakpoint: ICorDebugBreakpointVtbl,
    pub get_function:
        unsafe extern "system" fn(this: RawPtr, function: *mut RawPtr) -> Hresult,
    pub get_offset: unsafe extern "system" fn(this: RawPtr, offset: *mut u32) -> Hresult,
}

/// IL-offset range handed to `ICorDebugStepper::StepRange`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorDebugStepRange {
    pub start_offset: u32,
    pub end_offset: u32,
}

#[repr(C)]
pub struct ICorDebugStepperVtbl {
    pub unknown: IUnknownVtbl,
    pub is_active: UnusedSlot,
    pub deactivate: unsafe extern "system" fn(this: RawPtr) -> Hresult,
    pub set_intercept_mask: unsafe extern "system" fn(this: RawPtr, mask: u32) -> Hresult,
    pub set_unmapped_stop_mask: unsafe extern "system" fn(this: RawPtr, mask: u32) -> Hresult,
    pub step: unsafe extern "system" fn(this: RawPtr, step_in: i32) -> Hresult,
    pub step_range: unsafe extern "system" fn(
        this: RawPtr,
        step_in: i32,
        ranges: *const CorDebugStepRange,
        count: u32,
    ) -> Hresult,
    pub step_out: unsafe extern "system" fn(this: RawPtr) -> Hresult,
    pub set_range_il: UnusedSlot,
}

// ---------------------------------------------------------------------------
// Enumerators
// ---------------------------------------------------------------------------

/// Shared prefix of every `ICorDebug*Enum`; the typed `Next` follows it.
#[repr(C)]
pub struct ICorDebugEnumVtbl {
    pub unknown: IUnknownVtbl,
    pub skip: UnusedSlot,
    pub reset: UnusedSlot,
    pub clone: UnusedSlot,
    pub get_count: unsafe extern "system" fn(this: RawPtr, count: *mut u32) -> Hresult,
}

/// Thread/chain/frame enumerators all share this shape: `Next` fetches
/// interface pointers one batch at a time.
#[repr(C)]
pub struct ICorDebugObjectEnumVtbl {
    pub base: ICorDebugEnumVtbl,
    pub next: unsafe extern "system" fn(
        this: RawPtr,
        celt: u32,
        values: *mut RawPtr,
        fetched: *mut u32,
    ) -> Hresult,
}

// ---------------------------------------------------------------------------
// Managed callbacks (implemented by the engine's sink)
// ---------------------------------------------------------------------------

#[repr(C)]
pub struct ICorDebugManagedCallbackVtbl {
    pub unknown: IUnknownVtbl,
    pub breakpoint: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        breakpoint: RawPtr,
    ) -> Hresult,
    pub step_complete: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        stepper: RawPtr,
        reason: u32,
    ) -> Hresult,
    pub break_: unsafe extern "system" fn(this: RawPtr, appdomain: RawPtr, thread: RawPtr) -> Hresult,
    pub exception: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        unhandled: i32,
    ) -> Hresult,
    pub eval_complete: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        eval: RawPtr,
    ) -> Hresult,
    pub eval_exception: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        eval: RawPtr,
    ) -> Hresult,
    pub create_process: unsafe extern "system" fn(this: RawPtr, process: RawPtr) -> Hresult,
    pub exit_process: unsafe extern "system" fn(this: RawPtr, process: RawPtr) -> Hresult,
    pub create_thread:
        unsafe extern "system" fn(this: RawPtr, appdomain: RawPtr, thread: RawPtr) -> Hresult,
    pub exit_thread:
        unsafe extern "system" fn(this: RawPtr, appdomain: RawPtr, thread: RawPtr) -> Hresult,
    pub load_module:
        unsafe extern "system" fn(this: RawPtr, appdomain: RawPtr, module: RawPtr) -> Hresult,
    pub unload_module:
        unsafe extern "system" fn(this: RawPtr, appdomain: RawPtr, module: RawPtr) -> Hresult,
    pub load_class:
        unsafe extern "system" fn(this: RawPtr, appdomain: RawPtr, class: RawPtr) -> Hresult,
    pub unload_class:
        unsafe extern "system" fn(this: RawPtr, appdomain: RawPtr, class: RawPtr) -> Hresult,
    pub debugger_error: unsafe extern "system" fn(
        this: RawPtr,
        process: RawPtr,
        hr: Hresult,
        error_code: u32,
    ) -> Hresult,
    pub log_message: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        level: i32,
        log_switch_name: *const u16,
        message: *const u16,
    ) -> Hresult,
    pub log_switch: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        level: i32,
        reason: u32,
        log_switch_name: *const u16,
        parent_name: *const u16,
    ) -> Hresult,
    pub create_app_domain:
        unsafe extern "system" fn(this: RawPtr, process: RawPtr, appdomain: RawPtr) -> Hresult,
    pub exit_app_domain:
        unsafe extern "system" fn(this: RawPtr, process: RawPtr, appdomain: RawPtr) -> Hresult,
    pub load_assembly:
        unsafe extern "system" fn(this: RawPtr, appdomain: RawPtr, assembly: RawPtr) -> Hresult,
    pub unload_assembly:
        unsafe extern "system" fn(this: RawPtr, appdomain: RawPtr, assembly: RawPtr) -> Hresult,
    pub control_c_trap: unsafe extern "system" fn(this: RawPtr, process: RawPtr) -> Hresult,
    pub name_change:
        unsafe extern "system" fn(this: RawPtr, appdomain: RawPtr, thread: RawPtr) -> Hresult,
    pub update_module_symbols: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        module: RawPtr,
        symbol_stream: RawPtr,
    ) -> Hresult,
    pub edit_and_continue_remap: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        function: RawPtr,
        accurate: i32,
    ) -> Hresult,
    pub breakpoint_set_error: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        breakpoint: RawPtr,
        error: u32,
    ) -> Hresult,
}

#[repr(C)]
pub struct ICorDebugManagedCallback2Vtbl {
    pub unknown: IUnknownVtbl,
    pub function_remap_opportunity: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        old_function: RawPtr,
        new_function: RawPtr,
        old_il_offset: u32,
    ) -> Hresult,
    pub create_connection: unsafe extern "system" fn(
        this: RawPtr,
        process: RawPtr,
        connection_id: u32,
        connection_name: *const u16,
    ) -> Hresult,
    pub change_connection:
        unsafe extern "system" fn(this: RawPtr, process: RawPtr, connection_id: u32) -> Hresult,
    pub destroy_connection:
        unsafe extern "system" fn(this: RawPtr, process: RawPtr, connection_id: u32) -> Hresult,
    pub exception: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        frame: RawPtr,
        offset: u32,
        event_type: u32,
        flags: u32,
    ) -> Hresult,
    pub exception_unwind: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        event_type: u32,
        flags: u32,
    ) -> Hresult,
    pub function_remap_complete: unsafe extern "system" fn(
        this: RawPtr,
        appdomain: RawPtr,
        thread: RawPtr,
        function: RawPtr,
    ) -> Hresult,
    pub mda_notification: unsafe extern "system" fn(
        this: RawPtr,
        controller: RawPtr,
        thread: RawPtr,
        mda: RawPtr,
    ) -> Hresult,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Layout sanity: flattened base structs must put derived slots after
    // every base slot, and slot counts must match the interface shape.

    #[test]
    fn vtable_slot_counts() {
        let ptr = std::mem::size_of::<usize>();
        assert_eq!(std::mem::size_of::<IUnknownVtbl>(), 3 * ptr);
        assert_eq!(std::mem::size_of::<ICorDebugVtbl>(), 12 * ptr);
        assert_eq!(std::mem::size_of::<ICorDebugControllerVtbl>(), 13 * ptr);
        assert_eq!(std::mem::size_of::<ICorDebugProcessVtbl>(), 30 * ptr);
        assert_eq!(std::mem::size_of::<ICorDebugThreadVtbl>(), 19 * ptr);
        assert_eq!(std::mem::size_of::<ICorDebugFrameVtbl>(), 11 * ptr);
        assert_eq!(std::mem::size_of::<ICorDebugILFrameVtbl>(), 20 * ptr);
        assert_eq!(std::mem::size_of::<ICorDebugManagedCallbackVtbl>(), 29 * ptr);
        assert_eq!(std::mem::size_of::<ICorDebugManagedCallback2Vtbl>(), 11 * ptr);
    }

    #[test]
    fn step_range_is_two_dwords() {
        assert_eq!(std::mem::size_of::<CorDebugStepRange>(), 8);
    }
}
