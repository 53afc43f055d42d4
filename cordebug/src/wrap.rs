// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Owning wrappers over the raw interface pointers.
//!
//! Every wrapper holds exactly one COM reference and releases it on drop;
//! `clone` takes an extra reference. Handles may be moved across threads
//! (the engine parks breakpoint and module handles in registries) but must
//! only be *called* from the dispatch thread or a runtime callback.

use std::ffi::c_void;

use crate::guids::{
    IID_ICOR_DEBUG_ARRAY_VALUE, IID_ICOR_DEBUG_FUNCTION_BREAKPOINT, IID_ICOR_DEBUG_GENERIC_VALUE,
    IID_ICOR_DEBUG_IL_FRAME, IID_ICOR_DEBUG_OBJECT_VALUE, IID_ICOR_DEBUG_REFERENCE_VALUE,
    IID_ICOR_DEBUG_STRING_VALUE,
};
use crate::hresult::{check_hresult, CorError, S_FALSE};
use crate::raw::{self, RawPtr};
use crate::types::CorElementType;

pub use crate::raw::CorDebugStepRange as StepRange;

macro_rules! com_type {
    ($(#[$meta:meta])* $name:ident, $vtbl:ty) => {
        $(#[$meta])*
        pub struct $name {
            ptr: RawPtr,
        }

        impl $name {
            /// Take ownership of one reference on a raw interface pointer.
            pub unsafe fn from_raw(ptr: RawPtr) -> Result<Self, CorError> {
                if ptr.is_null() {
                    return Err(CorError::NullInterface(stringify!($name)));
                }
                Ok(Self { ptr })
            }

            pub fn as_raw(&self) -> RawPtr {
                self.ptr
            }

            fn vtbl(&self) -> &$vtbl {
                unsafe { &**(self.ptr as *mut *const $vtbl) }
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                unsafe {
                    raw::unknown_release(self.ptr);
                }
            }
        }

        impl Clone for $name {
            fn clone(&self) -> Self {
                unsafe {
                    raw::unknown_add_ref(self.ptr);
                }
                Self { ptr: self.ptr }
            }
        }

        // Confinement to the dispatch thread is the engine's invariant.
        unsafe impl Send for $name {}
    };
}

/// Drain an `ICorDebug*Enum` one element at a time. Bulk `Next` calls are
/// unreliable on this platform, so `celt` is always 1.
unsafe fn drain_object_enum(enum_ptr: RawPtr) -> Result<Vec<RawPtr>, CorError> {
    let vtbl = &**(enum_ptr as *mut *const raw::ICorDebugObjectEnumVtbl);
    let mut items = Vec::new();

    loop {
        let mut item: RawPtr = std::ptr::null_mut();
        let mut fetched = 0u32;

        let hr = (vtbl.next)(enum_ptr, 1, &mut item, &mut fetched);
        let hr = match check_hresult("ICorDebugEnum::Next", hr) {
            Ok(hr) => hr,
            Err(err) => {
                raw::unknown_release(enum_ptr);
                return Err(err);
            }
        };

        if fetched == 0 || item.is_null() {
            break;
        }

        items.push(item);

        if hr == S_FALSE {
            break;
        }
    }

    raw::unknown_release(enum_ptr);
    Ok(items)
}

/// Read a counted UTF-16 string through a two-call size/fill pattern.
unsafe fn read_wide_string(
    call: &'static str,
    read: impl Fn(u32, *mut u32, *mut u16) -> crate::Hresult,
) -> Result<String, CorError> {
    let mut needed = 0u32;
    check_hresult(call, read(0, &mut needed, std::ptr::null_mut()))?;

    if needed == 0 {
        return Ok(String::new());
    }

    let mut buffer = vec![0u16; needed as usize];
    let mut written = 0u32;
    check_hresult(call, read(needed, &mut written, buffer.as_mut_ptr()))?;

    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    Ok(String::from_utf16_lossy(&buffer[..len]))
}

// ---------------------------------------------------------------------------
// Debug root
// ---------------------------------------------------------------------------

com_type!(
    /// The root `ICorDebug` capability handed back by the helper library.
    CorDebug,
    raw::ICorDebugVtbl
);

impl CorDebug {
    pub fn initialize(&self) -> Result<(), CorError> {
        check_hresult("ICorDebug::Initialize", unsafe {
            (self.vtbl().initialize)(self.ptr)
        })?;
        Ok(())
    }

    pub fn terminate(&self) -> Result<(), CorError> {
        check_hresult("ICorDebug::Terminate", unsafe {
            (self.vtbl().terminate)(self.ptr)
        })?;
        Ok(())
    }

    /// Install the managed-callback sink. `callback` must point at an
    /// object answering `QueryInterface` for both callback interfaces.
    pub fn set_managed_callback(&self, callback: RawPtr) -> Result<(), CorError> {
        check_hresult("ICorDebug::SetManagedHandler", unsafe {
            (self.vtbl().set_managed_handler)(self.ptr, callback)
        })?;
        Ok(())
    }

    pub fn debug_active_process(&self, pid: u32) -> Result<Process, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebug::DebugActiveProcess", unsafe {
            (self.vtbl().debug_active_process)(self.ptr, pid, 0, &mut out)
        })?;
        unsafe { Process::from_raw(out) }
    }

    pub fn get_process(&self, pid: u32) -> Result<Process, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebug::GetProcess", unsafe {
            (self.vtbl().get_process)(self.ptr, pid, &mut out)
        })?;
        unsafe { Process::from_raw(out) }
    }
}

// ---------------------------------------------------------------------------
// Controller operations shared by Process and AppDomain
// ---------------------------------------------------------------------------

/// Operations on `ICorDebugController`, the shared base of process and
/// appdomain.
pub trait Controller {
    fn controller_vtbl(&self) -> &raw::ICorDebugControllerVtbl;
    fn controller_ptr(&self) -> RawPtr;

    /// Suspend all managed threads. A timeout of 0 means "synchronous".
    fn stop(&self, timeout_ms: u32) -> Result<(), CorError> {
        check_hresult("ICorDebugController::Stop", unsafe {
            (self.controller_vtbl().stop)(self.controller_ptr(), timeout_ms)
        })?;
        Ok(())
    }

    fn continue_(&self, out_of_band: bool) -> Result<(), CorError> {
        check_hresult("ICorDebugController::Continue", unsafe {
            (self.controller_vtbl().continue_)(self.controller_ptr(), i32::from(out_of_band))
        })?;
        Ok(())
    }

    fn enumerate_threads(&self) -> Result<Vec<Thread>, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugController::EnumerateThreads", unsafe {
            (self.controller_vtbl().enumerate_threads)(self.controller_ptr(), &mut out)
        })?;

        let raw_threads = unsafe { drain_object_enum(out) }?;
        raw_threads
            .into_iter()
            .map(|ptr| unsafe { Thread::from_raw(ptr) })
            .collect()
    }

    fn set_all_threads_debug_state(&self, state: u32) -> Result<(), CorError> {
        check_hresult("ICorDebugController::SetAllThreadsDebugState", unsafe {
            (self.controller_vtbl().set_all_threads_debug_state)(
                self.controller_ptr(),
                state,
                std::ptr::null_mut(),
            )
        })?;
        Ok(())
    }

    fn detach(&self) -> Result<(), CorError> {
        check_hresult("ICorDebugController::Detach", unsafe {
            (self.controller_vtbl().detach)(self.controller_ptr())
        })?;
        Ok(())
    }

    fn terminate(&self, exit_code: u32) -> Result<(), CorError> {
        check_hresult("ICorDebugController::Terminate", unsafe {
            (self.controller_vtbl().terminate)(self.controller_ptr(), exit_code)
        })?;
        Ok(())
    }
}

com_type!(
    /// `ICorDebugProcess`.
    Process,
    raw::ICorDebugProcessVtbl
);

impl Controller for Process {
    fn controller_vtbl(&self) -> &raw::ICorDebugControllerVtbl {
        &self.vtbl().controller
    }

    fn controller_ptr(&self) -> RawPtr {
        self.ptr
    }
}

impl Process {
    pub fn get_id(&self) -> Result<u32, CorError> {
        let mut pid = 0u32;
        check_hresult("ICorDebugProcess::GetID", unsafe {
            (self.vtbl().get_id)(self.ptr, &mut pid)
        })?;
        Ok(pid)
    }

    pub fn get_thread(&self, tid: u32) -> Result<Thread, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugProcess::GetThread", unsafe {
            (self.vtbl().get_thread)(self.ptr, tid, &mut out)
        })?;
        unsafe { Thread::from_raw(out) }
    }

    pub fn read_memory(&self, address: u64, buffer: &mut [u8]) -> Result<usize, CorError> {
        let mut read = 0usize;
        check_hresult("ICorDebugProcess::ReadMemory", unsafe {
            (self.vtbl().read_memory)(
                self.ptr,
                address,
                buffer.len() as u32,
                buffer.as_mut_ptr(),
                &mut read,
            )
        })?;
        Ok(read)
    }

    pub fn write_memory(&self, address: u64, buffer: &[u8]) -> Result<usize, CorError> {
        let mut written = 0usize;
        check_hresult("ICorDebugProcess::WriteMemory", unsafe {
            (self.vtbl().write_memory)(
                self.ptr,
                address,
                buffer.len() as u32,
                buffer.as_ptr(),
                &mut written,
            )
        })?;
        Ok(written)
    }

    pub fn enable_log_messages(&self, on: bool) -> Result<(), CorError> {
        check_hresult("ICorDebugProcess::EnableLogMessages", unsafe {
            (self.vtbl().enable_log_messages)(self.ptr, i32::from(on))
        })?;
        Ok(())
    }
}

com_type!(
    /// `ICorDebugAppDomain`; the sink continues execution through it.
    AppDomain,
    raw::ICorDebugAppDomainVtbl
);

impl Controller for AppDomain {
    fn controller_vtbl(&self) -> &raw::ICorDebugControllerVtbl {
        &self.vtbl().controller
    }

    fn controller_ptr(&self) -> RawPtr {
        self.ptr
    }
}

// ---------------------------------------------------------------------------
// Threads, chains, frames
// ---------------------------------------------------------------------------

com_type!(
    /// `ICorDebugThread`.
    Thread,
    raw::ICorDebugThreadVtbl
);

impl Thread {
    pub fn get_id(&self) -> Result<u32, CorError> {
        let mut tid = 0u32;
        check_hresult("ICorDebugThread::GetID", unsafe {
            (self.vtbl().get_id)(self.ptr, &mut tid)
        })?;
        Ok(tid)
    }

    /// The active (innermost) frame, or `None` for a thread with no
    /// managed frames.
    pub fn get_active_frame(&self) -> Result<Option<Frame>, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        let hr = check_hresult("ICorDebugThread::GetActiveFrame", unsafe {
            (self.vtbl().get_active_frame)(self.ptr, &mut out)
        })?;

        if hr == S_FALSE || out.is_null() {
            return Ok(None);
        }

        Ok(Some(unsafe { Frame::from_raw(out) }?))
    }

    pub fn enumerate_chains(&self) -> Result<Vec<Chain>, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugThread::EnumerateChains", unsafe {
            (self.vtbl().enumerate_chains)(self.ptr, &mut out)
        })?;

        let raw_chains = unsafe { drain_object_enum(out) }?;
        raw_chains
            .into_iter()
            .map(|ptr| unsafe { Chain::from_raw(ptr) })
            .collect()
    }

    pub fn create_stepper(&self) -> Result<Stepper, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugThread::CreateStepper", unsafe {
            (self.vtbl().create_stepper)(self.ptr, &mut out)
        })?;
        unsafe { Stepper::from_raw(out) }
    }

    /// The exception object currently being processed on this thread.
    pub fn get_current_exception(&self) -> Result<Option<Value>, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        let hr = check_hresult("ICorDebugThread::GetCurrentException", unsafe {
            (self.vtbl().get_current_exception)(self.ptr, &mut out)
        })?;

        if hr == S_FALSE || out.is_null() {
            return Ok(None);
        }

        Ok(Some(unsafe { Value::from_raw(out) }?))
    }
}

com_type!(
    /// `ICorDebugChain` — a contiguous run of frames.
    Chain,
    raw::ICorDebugChainVtbl
);

impl Chain {
    pub fn is_managed(&self) -> Result<bool, CorError> {
        let mut managed = 0i32;
        check_hresult("ICorDebugChain::IsManaged", unsafe {
            (self.vtbl().is_managed)(self.ptr, &mut managed)
        })?;
        Ok(managed != 0)
    }

    pub fn enumerate_frames(&self) -> Result<Vec<Frame>, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugChain::EnumerateFrames", unsafe {
            (self.vtbl().enumerate_frames)(self.ptr, &mut out)
        })?;

        let raw_frames = unsafe { drain_object_enum(out) }?;
        raw_frames
            .into_iter()
            .map(|ptr| unsafe { Frame::from_raw(ptr) })
            .collect()
    }
}

com_type!(
    /// `ICorDebugFrame`.
    Frame,
    raw::ICorDebugFrameVtbl
);

impl Frame {
    pub fn get_function(&self) -> Result<Function, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugFrame::GetFunction", unsafe {
            (self.vtbl().get_function)(self.ptr, &mut out)
        })?;
        unsafe { Function::from_raw(out) }
    }

    pub fn get_function_token(&self) -> Result<u32, CorError> {
        let mut token = 0u32;
        check_hresult("ICorDebugFrame::GetFunctionToken", unsafe {
            (self.vtbl().get_function_token)(self.ptr, &mut token)
        })?;
        Ok(token)
    }

    pub fn get_stack_range(&self) -> Result<(u64, u64), CorError> {
        let mut start = 0u64;
        let mut end = 0u64;
        check_hresult("ICorDebugFrame::GetStackRange", unsafe {
            (self.vtbl().get_stack_range)(self.ptr, &mut start, &mut end)
        })?;
        Ok((start, end))
    }

    /// Cast to an IL frame. Fails for native and internal frames.
    pub fn to_il_frame(&self) -> Result<IlFrame, CorError> {
        let out = unsafe { raw::unknown_query_interface(self.ptr, &IID_ICOR_DEBUG_IL_FRAME) }?;
        unsafe { IlFrame::from_raw(out) }
    }
}

com_type!(
    /// `ICorDebugILFrame`.
    IlFrame,
    raw::ICorDebugILFrameVtbl
);

impl IlFrame {
    pub fn get_function(&self) -> Result<Function, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugILFrame::GetFunction", unsafe {
            (self.vtbl().frame.get_function)(self.ptr, &mut out)
        })?;
        unsafe { Function::from_raw(out) }
    }

    pub fn get_function_token(&self) -> Result<u32, CorError> {
        let mut token = 0u32;
        check_hresult("ICorDebugILFrame::GetFunctionToken", unsafe {
            (self.vtbl().frame.get_function_token)(self.ptr, &mut token)
        })?;
        Ok(token)
    }

    /// Current IL offset plus the runtime's mapping confidence.
    pub fn get_ip(&self) -> Result<(u32, u32), CorError> {
        let mut offset = 0u32;
        let mut mapping = 0u32;
        check_hresult("ICorDebugILFrame::GetIP", unsafe {
            (self.vtbl().get_ip)(self.ptr, &mut offset, &mut mapping)
        })?;
        Ok((offset, mapping))
    }

    pub fn get_local_variable(&self, slot: u32) -> Result<Value, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugILFrame::GetLocalVariable", unsafe {
            (self.vtbl().get_local_variable)(self.ptr, slot, &mut out)
        })?;
        unsafe { Value::from_raw(out) }
    }

    pub fn get_argument(&self, slot: u32) -> Result<Value, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugILFrame::GetArgument", unsafe {
            (self.vtbl().get_argument)(self.ptr, slot, &mut out)
        })?;
        unsafe { Value::from_raw(out) }
    }
}

// ---------------------------------------------------------------------------
// Functions, code, modules, classes
// ---------------------------------------------------------------------------

com_type!(
    /// `ICorDebugFunction`.
    Function,
    raw::ICorDebugFunctionVtbl
);

impl Function {
    pub fn get_module(&self) -> Result<Module, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugFunction::GetModule", unsafe {
            (self.vtbl().get_module)(self.ptr, &mut out)
        })?;
        unsafe { Module::from_raw(out) }
    }

    pub fn get_class(&self) -> Result<Class, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugFunction::GetClass", unsafe {
            (self.vtbl().get_class)(self.ptr, &mut out)
        })?;
        unsafe { Class::from_raw(out) }
    }

    pub fn get_token(&self) -> Result<u32, CorError> {
        let mut token = 0u32;
        check_hresult("ICorDebugFunction::GetToken", unsafe {
            (self.vtbl().get_token)(self.ptr, &mut token)
        })?;
        Ok(token)
    }

    /// The method's IL code object. Breakpoints are created through this
    /// (per IL offset); the offset-less function breakpoint binds at
    /// offset 0 under modern JITs and is deliberately not exposed.
    pub fn get_il_code(&self) -> Result<Code, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugFunction::GetILCode", unsafe {
            (self.vtbl().get_il_code)(self.ptr, &mut out)
        })?;
        unsafe { Code::from_raw(out) }
    }
}

com_type!(
    /// `ICorDebugCode`.
    Code,
    raw::ICorDebugCodeVtbl
);

impl Code {
    pub fn is_il(&self) -> Result<bool, CorError> {
        let mut is_il = 0i32;
        check_hresult("ICorDebugCode::IsIL", unsafe {
            (self.vtbl().is_il)(self.ptr, &mut is_il)
        })?;
        Ok(is_il != 0)
    }

    pub fn get_size(&self) -> Result<u32, CorError> {
        let mut size = 0u32;
        check_hresult("ICorDebugCode::GetSize", unsafe {
            (self.vtbl().get_size)(self.ptr, &mut size)
        })?;
        Ok(size)
    }

    pub fn create_breakpoint(&self, il_offset: u32) -> Result<FunctionBreakpoint, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugCode::CreateBreakpoint", unsafe {
            (self.vtbl().create_breakpoint)(self.ptr, il_offset, &mut out)
        })?;
        unsafe { FunctionBreakpoint::from_raw(out) }
    }
}

com_type!(
    /// `ICorDebugModule`.
    Module,
    raw::ICorDebugModuleVtbl
);

impl Module {
    pub fn get_name(&self) -> Result<String, CorError> {
        let vtbl = self.vtbl();
        unsafe {
            read_wide_string("ICorDebugModule::GetName", |cch, written, buffer| {
                (vtbl.get_name)(self.ptr, cch, written, buffer)
            })
        }
    }

    pub fn get_function_from_token(&self, token: u32) -> Result<Function, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugModule::GetFunctionFromToken", unsafe {
            (self.vtbl().get_function_from_token)(self.ptr, token, &mut out)
        })?;
        unsafe { Function::from_raw(out) }
    }

    pub fn get_class_from_token(&self, token: u32) -> Result<Class, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugModule::GetClassFromToken", unsafe {
            (self.vtbl().get_class_from_token)(self.ptr, token, &mut out)
        })?;
        unsafe { Class::from_raw(out) }
    }

    /// In-process metadata interface. Unavailable on this platform; kept
    /// for contract completeness, callers must expect failure.
    pub fn get_metadata_interface(&self, iid: &crate::Guid) -> Result<RawPtr, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugModule::GetMetaDataInterface", unsafe {
            (self.vtbl().get_metadata_interface)(self.ptr, iid, &mut out)
        })?;
        Ok(out)
    }
}

com_type!(
    /// `ICorDebugClass`.
    Class,
    raw::ICorDebugClassVtbl
);

impl Class {
    pub fn get_module(&self) -> Result<Module, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugClass::GetModule", unsafe {
            (self.vtbl().get_module)(self.ptr, &mut out)
        })?;
        unsafe { Module::from_raw(out) }
    }

    pub fn get_token(&self) -> Result<u32, CorError> {
        let mut token = 0u32;
        check_hresult("ICorDebugClass::GetToken", unsafe {
            (self.vtbl().get_token)(self.ptr, &mut token)
        })?;
        Ok(token)
    }

    /// Read a static field. Fields initialized by a static constructor
    /// need `frame` as evaluation context.
    pub fn get_static_field_value(
        &self,
        field_token: u32,
        frame: Option<&IlFrame>,
    ) -> Result<Value, CorError> {
        let frame_ptr = frame.map_or(std::ptr::null_mut(), |f| f.as_raw());

        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugClass::GetStaticFieldValue", unsafe {
            (self.vtbl().get_static_field_value)(self.ptr, field_token, frame_ptr, &mut out)
        })?;
        unsafe { Value::from_raw(out) }
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

com_type!(
    /// `ICorDebugValue` — the base view of any runtime value.
    Value,
    raw::ICorDebugValueVtbl
);

impl Value {
    pub fn get_type(&self) -> Result<CorElementType, CorError> {
        let mut element_type = 0u32;
        check_hresult("ICorDebugValue::GetType", unsafe {
            (self.vtbl().get_type)(self.ptr, &mut element_type)
        })?;
        Ok(CorElementType::from_raw(element_type))
    }

    pub fn get_size(&self) -> Result<u32, CorError> {
        let mut size = 0u32;
        check_hresult("ICorDebugValue::GetSize", unsafe {
            (self.vtbl().get_size)(self.ptr, &mut size)
        })?;
        Ok(size)
    }

    pub fn get_address(&self) -> Result<u64, CorError> {
        let mut address = 0u64;
        check_hresult("ICorDebugValue::GetAddress", unsafe {
            (self.vtbl().get_address)(self.ptr, &mut address)
        })?;
        Ok(address)
    }

    pub fn to_generic(&self) -> Result<GenericValue, CorError> {
        let out =
            unsafe { raw::unknown_query_interface(self.ptr, &IID_ICOR_DEBUG_GENERIC_VALUE) }?;
        unsafe { GenericValue::from_raw(out) }
    }

    pub fn to_reference(&self) -> Result<ReferenceValue, CorError> {
        let out =
            unsafe { raw::unknown_query_interface(self.ptr, &IID_ICOR_DEBUG_REFERENCE_VALUE) }?;
        unsafe { ReferenceValue::from_raw(out) }
    }

    pub fn to_object(&self) -> Result<ObjectValue, CorError> {
        let out = unsafe { raw::unknown_query_interface(self.ptr, &IID_ICOR_DEBUG_OBJECT_VALUE) }?;
        unsafe { ObjectValue::from_raw(out) }
    }

    pub fn to_string_value(&self) -> Result<StringValue, CorError> {
        let out = unsafe { raw::unknown_query_interface(self.ptr, &IID_ICOR_DEBUG_STRING_VALUE) }?;
        unsafe { StringValue::from_raw(out) }
    }

    pub fn to_array(&self) -> Result<ArrayValue, CorError> {
        let out = unsafe { raw::unknown_query_interface(self.ptr, &IID_ICOR_DEBUG_ARRAY_VALUE) }?;
        unsafe { ArrayValue::from_raw(out) }
    }
}

com_type!(
    /// `ICorDebugGenericValue` — raw-bytes view of a primitive.
    GenericValue,
    raw::ICorDebugGenericValueVtbl
);

impl GenericValue {
    pub fn get_size(&self) -> Result<u32, CorError> {
        let mut size = 0u32;
        check_hresult("ICorDebugGenericValue::GetSize", unsafe {
            (self.vtbl().value.get_size)(self.ptr, &mut size)
        })?;
        Ok(size)
    }

    /// Copy the value's raw bytes out of the debuggee.
    pub fn read_bytes(&self) -> Result<Vec<u8>, CorError> {
        let size = self.get_size()? as usize;
        let mut buffer = vec![0u8; size];

        check_hresult("ICorDebugGenericValue::GetValue", unsafe {
            (self.vtbl().get_value)(self.ptr, buffer.as_mut_ptr() as *mut c_void)
        })?;

        Ok(buffer)
    }
}

com_type!(
    /// `ICorDebugReferenceValue`.
    ReferenceValue,
    raw::ICorDebugReferenceValueVtbl
);

impl ReferenceValue {
    pub fn is_null(&self) -> Result<bool, CorError> {
        let mut null = 0i32;
        check_hresult("ICorDebugReferenceValue::IsNull", unsafe {
            (self.vtbl().is_null)(self.ptr, &mut null)
        })?;
        Ok(null != 0)
    }

    /// The referenced address; used as identity for cycle defense.
    pub fn get_value(&self) -> Result<u64, CorError> {
        let mut address = 0u64;
        check_hresult("ICorDebugReferenceValue::GetValue", unsafe {
            (self.vtbl().get_value)(self.ptr, &mut address)
        })?;
        Ok(address)
    }

    pub fn dereference(&self) -> Result<Value, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugReferenceValue::Dereference", unsafe {
            (self.vtbl().dereference)(self.ptr, &mut out)
        })?;
        unsafe { Value::from_raw(out) }
    }
}

com_type!(
    /// `ICorDebugObjectValue`.
    ObjectValue,
    raw::ICorDebugObjectValueVtbl
);

impl ObjectValue {
    pub fn get_class(&self) -> Result<Class, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugObjectValue::GetClass", unsafe {
            (self.vtbl().get_class)(self.ptr, &mut out)
        })?;
        unsafe { Class::from_raw(out) }
    }

    /// Read an instance field. `class` must be the *declaring* class of
    /// the field, not the runtime class of the object.
    pub fn get_field_value(&self, class: &Class, field_token: u32) -> Result<Value, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugObjectValue::GetFieldValue", unsafe {
            (self.vtbl().get_field_value)(self.ptr, class.as_raw(), field_token, &mut out)
        })?;
        unsafe { Value::from_raw(out) }
    }

    pub fn is_value_class(&self) -> Result<bool, CorError> {
        let mut is_value_class = 0i32;
        check_hresult("ICorDebugObjectValue::IsValueClass", unsafe {
            (self.vtbl().is_value_class)(self.ptr, &mut is_value_class)
        })?;
        Ok(is_value_class != 0)
    }
}

com_type!(
    /// `ICorDebugStringValue`.
    StringValue,
    raw::ICorDebugStringValueVtbl
);

impl StringValue {
    pub fn get_string(&self) -> Result<String, CorError> {
        let mut length = 0u32;
        check_hresult("ICorDebugStringValue::GetLength", unsafe {
            (self.vtbl().get_length)(self.ptr, &mut length)
        })?;

        let mut buffer = vec![0u16; length as usize + 1];
        let mut written = 0u32;
        check_hresult("ICorDebugStringValue::GetString", unsafe {
            (self.vtbl().get_string)(
                self.ptr,
                buffer.len() as u32,
                &mut written,
                buffer.as_mut_ptr(),
            )
        })?;

        let len = (written as usize).min(length as usize);
        Ok(String::from_utf16_lossy(&buffer[..len]))
    }
}

com_type!(
    /// `ICorDebugArrayValue`.
    ArrayValue,
    raw::ICorDebugArrayValueVtbl
);

impl ArrayValue {
    pub fn get_element_type(&self) -> Result<CorElementType, CorError> {
        let mut element_type = 0u32;
        check_hresult("ICorDebugArrayValue::GetElementType", unsafe {
            (self.vtbl().get_element_type)(self.ptr, &mut element_type)
        })?;
        Ok(CorElementType::from_raw(element_type))
    }

    pub fn get_count(&self) -> Result<u32, CorError> {
        let mut count = 0u32;
        check_hresult("ICorDebugArrayValue::GetCount", unsafe {
            (self.vtbl().get_count)(self.ptr, &mut count)
        })?;
        Ok(count)
    }

    pub fn get_element_at_position(&self, position: u32) -> Result<Value, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugArrayValue::GetElementAtPosition", unsafe {
            (self.vtbl().get_element_at_position)(self.ptr, position, &mut out)
        })?;
        unsafe { Value::from_raw(out) }
    }
}

// ---------------------------------------------------------------------------
// Breakpoints, steppers
// ---------------------------------------------------------------------------

com_type!(
    /// `ICorDebugBreakpoint` as delivered by the breakpoint callback.
    Breakpoint,
    raw::ICorDebugBreakpointVtbl
);

impl Breakpoint {
    pub fn to_function_breakpoint(&self) -> Result<FunctionBreakpoint, CorError> {
        let out = unsafe {
            raw::unknown_query_interface(self.ptr, &IID_ICOR_DEBUG_FUNCTION_BREAKPOINT)
        }?;
        unsafe { FunctionBreakpoint::from_raw(out) }
    }
}

com_type!(
    /// `ICorDebugFunctionBreakpoint`.
    FunctionBreakpoint,
    raw::ICorDebugFunctionBreakpointVtbl
);

impl FunctionBreakpoint {
    pub fn activate(&self, active: bool) -> Result<(), CorError> {
        check_hresult("ICorDebugBreakpoint::Activate", unsafe {
            (self.vtbl().breakpoint.activate)(self.ptr, i32::from(active))
        })?;
        Ok(())
    }

    pub fn is_active(&self) -> Result<bool, CorError> {
        let mut active = 0i32;
        check_hresult("ICorDebugBreakpoint::IsActive", unsafe {
            (self.vtbl().breakpoint.is_active)(self.ptr, &mut active)
        })?;
        Ok(active != 0)
    }

    pub fn get_function(&self) -> Result<Function, CorError> {
        let mut out: RawPtr = std::ptr::null_mut();
        check_hresult("ICorDebugFunctionBreakpoint::GetFunction", unsafe {
            (self.vtbl().get_function)(self.ptr, &mut out)
        })?;
        unsafe { Function::from_raw(out) }
    }

    pub fn get_offset(&self) -> Result<u32, CorError> {
        let mut offset = 0u32;
        check_hresult("ICorDebugFunctionBreakpoint::GetOffset", unsafe {
            (self.vtbl().get_offset)(self.ptr, &mut offset)
        })?;
        Ok(offset)
    }
}

com_type!(
    /// `ICorDebugStepper`. Only the range and step-out forms are exposed;
    /// the argument-less `Step` degenerates to instruction stepping on
    /// this platform.
    Stepper,
    raw::ICorDebugStepperVtbl
);

impl Stepper {
    pub fn deactivate(&self) -> Result<(), CorError> {
        check_hresult("ICorDebugStepper::Deactivate", unsafe {
            (self.vtbl().deactivate)(self.ptr)
        })?;
        Ok(())
    }

    pub fn set_intercept_mask(&self, mask: u32) -> Result<(), CorError> {
        check_hresult("ICorDebugStepper::SetInterceptMask", unsafe {
            (self.vtbl().set_intercept_mask)(self.ptr, mask)
        })?;
        Ok(())
    }

    pub fn set_unmapped_stop_mask(&self, mask: u32) -> Result<(), CorError> {
        check_hresult("ICorDebugStepper::SetUnmappedStopMask", unsafe {
            (self.vtbl().set_unmapped_stop_mask)(self.ptr, mask)
        })?;
        Ok(())
    }

    pub fn step_range(&self, step_in: bool, ranges: &[StepRange]) -> Result<(), CorError> {
        check_hresult("ICorDebugStepper::StepRange", unsafe {
            (self.vtbl().step_range)(
                self.ptr,
                i32::from(step_in),
                ranges.as_ptr(),
                ranges.len() as u32,
            )
        })?;
        Ok(())
    }

    pub fn step_out(&self) -> Result<(), CorError> {
        check_hresult("ICorDebugStepper::StepOut", unsafe {
            (self.vtbl().step_out)(self.ptr)
        })?;
        Ok(())
    }
}
