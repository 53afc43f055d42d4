// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use libloading::Library;
use log::{debug, warn};
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::locate::candidate_paths;
use crate::{from_wide, to_wide};

pub type Hresult = i32;
pub const S_OK: Hresult = 0;

/// `CorDebugVersion_4_0`: the interface version requested from
/// `CreateDebuggingInterfaceFromVersionEx`.
pub const COR_DEBUG_VERSION_4_0: i32 = 4;

type Handle = *mut c_void;

/// Raw startup-notification callback signature. The helper library stores
/// this pointer and invokes it later from a runtime-internal thread.
type RawStartupCallback =
    unsafe extern "system" fn(cordb: *mut c_void, parameter: *mut c_void, hr: Hresult);

/// Closure invoked when the runtime reports startup in the target process.
/// Receives the raw `ICorDebug` pointer and the helper's HRESULT.
pub type StartupClosure = Box<dyn FnOnce(*mut c_void, Hresult) + Send + 'static>;

type CreateProcessForLaunchFn = unsafe extern "system" fn(
    command_line: *const u16,
    suspend_process: i32,
    environment: *mut c_void,
    current_directory: *const u16,
    process_id: *mut u32,
    resume_handle: *mut Handle,
) -> Hresult;
type ResumeProcessFn = unsafe extern "system" fn(resume_handle: Handle) -> Hresult;
type CloseResumeHandleFn = unsafe extern "system" fn(resume_handle: Handle) -> Hresult;
type RegisterForRuntimeStartupFn = unsafe extern "system" fn(
    process_id: u32,
    callback: RawStartupCallback,
    parameter: *mut c_void,
    unregister_token: *mut *mut c_void,
) -> Hresult;
type RegisterForRuntimeStartup3Fn = unsafe extern "system" fn(
    process_id: u32,
    application_group_id: *const u16,
    flags: u32,
    callback: RawStartupCallback,
    parameter: *mut c_void,
    unregister_token: *mut *mut c_void,
) -> Hresult;
type UnregisterForRuntimeStartupFn =
    unsafe extern "system" fn(unregister_token: *mut c_void) -> Hresult;
type EnumerateClrsFn = unsafe extern "system" fn(
    process_id: u32,
    handle_array: *mut *mut Handle,
    string_array: *mut *mut *const u16,
    array_length: *mut u32,
) -> Hresult;
type CloseClrEnumerationFn = unsafe extern "system" fn(
    handle_array: *mut Handle,
    string_array: *mut *const u16,
    array_length: u32,
) -> Hresult;
type CreateVersionStringFromModuleFn = unsafe extern "system" fn(
    process_id: u32,
    module_path: *const u16,
    buffer: *mut u16,
    buffer_len: u32,
    written: *mut u32,
) -> Hresult;
type CreateDebuggingInterfaceFromVersionExFn = unsafe extern "system" fn(
    debugger_version: i32,
    debuggee_version: *const u16,
    cordb: *mut *mut c_void,
) -> Hresult;

#[derive(Debug, Error)]
pub enum ShimError {
    #[error("helper library not found; attempted paths: {attempted:?}")]
    NotFound { attempted: Vec<PathBuf> },

    #[error("helper library {path} is missing export {symbol}")]
    MissingSymbol { path: PathBuf, symbol: &'static str },

    #[error("{call} failed with HRESULT {hr:#010x}")]
    Hresult { call: &'static str, hr: Hresult },
}

fn check(call: &'static str, hr: Hresult) -> Result<(), ShimError> {
    if hr < 0 {
        Err(ShimError::Hresult { call, hr })
    } else {
        Ok(())
    }
}

/// Suspended-process handle returned by `CreateProcessForLaunch`.
pub struct ResumeHandle(Handle);

// The handle is an opaque token owned by the helper library; the engine
// moves it between threads but never uses it concurrently.
unsafe impl Send for ResumeHandle {}

/// Live registration of a runtime-startup callback. The closure's storage
/// stays in a process-global slot until the callback fires or the
/// registration is explicitly cancelled (see `DbgShim::unregister`).
pub struct StartupRegistration {
    cookie: u64,
    token: *mut c_void,
}

unsafe impl Send for StartupRegistration {}

/// Process-global root for in-flight startup closures. Native code holds
/// only the cookie, so the closure cannot be collected or moved while the
/// helper library still intends to invoke it.
static REGISTRATIONS: Lazy<Mutex<HashMap<u64, StartupClosure>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_COOKIE: AtomicU64 = AtomicU64::new(1);

unsafe extern "system" fn startup_trampoline(
    cordb: *mut c_void,
    parameter: *mut c_void,
    hr: Hresult,
) {
    let cookie = parameter as u64;

    let closure = match REGISTRATIONS.lock() {
        Ok(mut slots) => slots.remove(&cookie),
        Err(_) => None,
    };

    match closure {
        Some(closure) => closure(cordb, hr),
        None => warn!("runtime startup callback fired for unknown cookie {cookie}"),
    }
}

/// The loaded helper library and its bound exports.
pub struct DbgShim {
    path: PathBuf,
    // The function pointers stay valid only while `_lib` is loaded; both
    // live and die together here.
    create_process_for_launch: CreateProcessForLaunchFn,
    resume_process: ResumeProcessFn,
    close_resume_handle: CloseResumeHandleFn,
    register_for_runtime_startup: RegisterForRuntimeStartupFn,
    register_for_runtime_startup_3: Option<RegisterForRuntimeStartup3Fn>,
    unregister_for_runtime_startup: UnregisterForRuntimeStartupFn,
    enumerate_clrs: EnumerateClrsFn,
    close_clr_enumeration: CloseClrEnumerationFn,
    create_version_string_from_module: CreateVersionStringFromModuleFn,
    create_debugging_interface_from_version_ex: CreateDebuggingInterfaceFromVersionExFn,
    _lib: Library,
}

// Bound function pointers are valid for the lifetime of `_lib` and the
// helper library is itself thread-safe for these entry points.
unsafe impl Send for DbgShim {}
unsafe impl Sync for DbgShim {}

macro_rules! bind {
    ($lib:expr, $path:expr, $name:literal) => {
        unsafe {
            *$lib
                .get($name.as_bytes())
                .map_err(|_| ShimError::MissingSymbol {
                    path: $path.clone(),
                    symbol: $name,
                })?
        }
    };
}

impl DbgShim {
    /// Locate and load the helper library, trying each candidate path in
    /// order and keeping the first that loads.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ShimError> {
        let attempted = candidate_paths(explicit);

        for path in &attempted {
            match unsafe { Library::new(path) } {
                Ok(lib) => {
                    debug!("loaded dbgshim from {}", path.display());
                    return Self::bind(lib, path.clone());
                }
                Err(err) => {
                    debug!("dbgshim candidate {} rejected: {err}", path.display());
                }
            }
        }

        Err(ShimError::NotFound { attempted })
    }

    fn bind(lib: Library, path: PathBuf) -> Result<Self, ShimError> {
        let register_for_runtime_startup_3 = unsafe {
            lib.get(b"RegisterForRuntimeStartup3")
                .ok()
                .map(|sym: libloading::Symbol<RegisterForRuntimeStartup3Fn>| *sym)
        };

        Ok(Self {
            create_process_for_launch: bind!(lib, path, "CreateProcessForLaunch"),
            resume_process: bind!(lib, path, "ResumeProcess"),
            close_resume_handle: bind!(lib, path, "CloseResumeHandle"),
            register_for_runtime_startup: bind!(lib, path, "RegisterForRuntimeStartup"),
            register_for_runtime_startup_3,
            unregister_for_runtime_startup: bind!(lib, path, "UnregisterForRuntimeStartup"),
            enumerate_clrs: bind!(lib, path, "EnumerateCLRs"),
            close_clr_enumeration: bind!(lib, path, "CloseCLREnumeration"),
            create_version_string_from_module: bind!(lib, path, "CreateVersionStringFromModule"),
            create_debugging_interface_from_version_ex: bind!(
                lib,
                path,
                "CreateDebuggingInterfaceFromVersionEx"
            ),
            path,
            _lib: lib,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn supports_startup_3(&self) -> bool {
        self.register_for_runtime_startup_3.is_some()
    }

    /// Spawn the debuggee suspended. Returns its pid and the resume handle.
    pub fn create_process_for_launch(
        &self,
        command_line: &str,
        current_dir: Option<&Path>,
    ) -> Result<(u32, ResumeHandle), ShimError> {
        let wide_cmd = to_wide(command_line);
        let wide_dir = current_dir.map(|d| to_wide(&d.to_string_lossy()));

        let mut pid = 0u32;
        let mut resume: Handle = std::ptr::null_mut();

        let hr = unsafe {
            (self.create_process_for_launch)(
                wide_cmd.as_ptr(),
                1,
                std::ptr::null_mut(),
                wide_dir.as_ref().map_or(std::ptr::null(), |d| d.as_ptr()),
                &mut pid,
                &mut resume,
            )
        };
        check("CreateProcessForLaunch", hr)?;

        Ok((pid, ResumeHandle(resume)))
    }

    pub fn resume_process(&self, handle: &ResumeHandle) -> Result<(), ShimError> {
        check("ResumeProcess", unsafe { (self.resume_process)(handle.0) })
    }

    pub fn close_resume_handle(&self, handle: ResumeHandle) -> Result<(), ShimError> {
        check("CloseResumeHandle", unsafe {
            (self.close_resume_handle)(handle.0)
        })
    }

    /// Register for runtime-startup notification in `pid`.
    ///
    /// The closure is parked in a process-global slot before the native
    /// registration is made, so it is guaranteed alive whenever the helper
    /// library decides to invoke it. Prefers `RegisterForRuntimeStartup3`
    /// (which understands an already-suspended target) when exported.
    pub fn register_for_runtime_startup(
        &self,
        pid: u32,
        suspended: bool,
        closure: StartupClosure,
    ) -> Result<StartupRegistration, ShimError> {
        let cookie = NEXT_COOKIE.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut slots) = REGISTRATIONS.lock() {
            slots.insert(cookie, closure);
        }

        let mut token: *mut c_void = std::ptr::null_mut();
        let parameter = cookie as *mut c_void;

        let hr = match self.register_for_runtime_startup_3 {
            Some(register_3) => unsafe {
                register_3(
                    pid,
                    std::ptr::null(),
                    u32::from(suspended),
                    startup_trampoline,
                    parameter,
                    &mut token,
                )
            },
            None => unsafe {
                (self.register_for_runtime_startup)(pid, startup_trampoline, parameter, &mut token)
            },
        };

        if let Err(err) = check("RegisterForRuntimeStartup", hr) {
            if let Ok(mut slots) = REGISTRATIONS.lock() {
                slots.remove(&cookie);
            }
            return Err(err);
        }

        Ok(StartupRegistration { cookie, token })
    }

    /// Cancel a startup registration. After the native call returns the
    /// callback can no longer fire, so the parked closure is reclaimed.
    pub fn unregister(&self, registration: StartupRegistration) -> Result<(), ShimError> {
        let result = check("UnregisterForRuntimeStartup", unsafe {
            (self.unregister_for_runtime_startup)(registration.token)
        });

        if let Ok(mut slots) = REGISTRATIONS.lock() {
            slots.remove(&registration.cookie);
        }

        result
    }

    /// Enumerate CLR instances loaded in `pid`, returning the runtime
    /// module paths. The native enumeration is closed before returning.
    pub fn enumerate_clrs(&self, pid: u32) -> Result<Vec<String>, ShimError> {
        let mut handles: *mut Handle = std::ptr::null_mut();
        let mut strings: *mut *const u16 = std::ptr::null_mut();
        let mut count = 0u32;

        let hr = unsafe { (self.enumerate_clrs)(pid, &mut handles, &mut strings, &mut count) };
        check("EnumerateCLRs", hr)?;

        let mut paths = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let wide = unsafe { *strings.add(i) };
            if wide.is_null() {
                continue;
            }

            let mut len = 0usize;
            while unsafe { *wide.add(len) } != 0 {
                len += 1;
            }
            let slice = unsafe { std::slice::from_raw_parts(wide, len) };
            paths.push(from_wide(slice));
        }

        let hr = unsafe { (self.close_clr_enumeration)(handles, strings, count) };
        check("CloseCLREnumeration", hr)?;

        Ok(paths)
    }

    /// Build the version string for a runtime module in `pid`, as consumed
    /// by `create_debugging_interface`.
    pub fn create_version_string_from_module(
        &self,
        pid: u32,
        module_path: &str,
    ) -> Result<String, ShimError> {
        let wide_module = to_wide(module_path);
        let mut needed = 0u32;

        // First call sizes the buffer; E_INSUFFICIENT_BUFFER-style failures
        // still report the needed length.
        let hr = unsafe {
            (self.create_version_string_from_module)(
                pid,
                wide_module.as_ptr(),
                std::ptr::null_mut(),
                0,
                &mut needed,
            )
        };
        if hr < 0 && needed == 0 {
            return Err(ShimError::Hresult {
                call: "CreateVersionStringFromModule",
                hr,
            });
        }

        let mut buffer = vec![0u16; needed as usize];
        let hr = unsafe {
            (self.create_version_string_from_module)(
                pid,
                wide_module.as_ptr(),
                buffer.as_mut_ptr(),
                needed,
                &mut needed,
            )
        };
        check("CreateVersionStringFromModule", hr)?;

        Ok(from_wide(&buffer))
    }

    /// Manufacture the raw `ICorDebug` pointer for a runtime version.
    pub fn create_debugging_interface(&self, version: &str) -> Result<*mut c_void, ShimError> {
        let wide_version = to_wide(version);
        let mut cordb: *mut c_void = std::ptr::null_mut();

        let hr = unsafe {
            (self.create_debugging_interface_from_version_ex)(
                COR_DEBUG_VERSION_4_0,
                wide_version.as_ptr(),
                &mut cordb,
            )
        };
        check("CreateDebuggingInterfaceFromVersionEx", hr)?;

        Ok(cordb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_failure_reports_every_candidate() {
        let bogus = PathBuf::from("/nonexistent/libdbgshim.so");

        // On machines with a real .NET install a later candidate may load;
        // the assertion that matters is the attempted-path reporting.
        match DbgShim::load(Some(&bogus)) {
            Err(ShimError::NotFound { attempted }) => {
                assert_eq!(attempted[0], bogus);
            }
            Err(_) | Ok(_) => {}
        }
    }

    #[test]
    fn trampoline_consumes_registered_closure() {
        let cookie = NEXT_COOKIE.fetch_add(1, Ordering::Relaxed);
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_in_closure = fired.clone();

        REGISTRATIONS.lock().unwrap().insert(
            cookie,
            Box::new(move |cordb, hr| {
                assert!(cordb.is_null());
                assert_eq!(hr, S_OK);
                fired_in_closure.store(true, Ordering::SeqCst);
            }),
        );

        unsafe { startup_trampoline(std::ptr::null_mut(), cookie as *mut c_void, S_OK) };

        assert!(fired.load(Ordering::SeqCst));
        assert!(!REGISTRATIONS.lock().unwrap().contains_key(&cookie));
    }

    #[test]
    fn trampoline_tolerates_unknown_cookie() {
        unsafe { startup_trampoline(std::ptr::null_mut(), u64::MAX as *mut c_void, S_OK) };
    }
}
