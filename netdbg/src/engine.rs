// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The engine core: dispatch thread, command channel, session lifecycle,
//! and the async public API.
//!
//! Every runtime capability call originates on the dispatch thread; public
//! methods enqueue a closure and await its completion. Commands that
//! semantically wait for the debuggee to stop additionally await the next
//! event off the event channel. Closures never block on the channel
//! themselves, so a stopping callback can always complete while a command
//! is in flight.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cordebug::{
    Controller, CorDebug, Process, StepRange, COR_DEBUG_INTERCEPT_NONE, COR_DEBUG_STOP_NONE,
};
use dbgshim::DbgShim;
use log::{debug, error, info};
use portable_pdb::SequencePoint;
use tokio::sync::oneshot;

use crate::breakpoints::{BreakpointInfo, BreakpointRecord};
use crate::callback::ManagedCallback;
use crate::error::EngineError;
use crate::eval;
use crate::events::{DebugEvent, EvalResult, SessionState, ThreadStack, VariableNode};
use crate::launcher;
use crate::session::EngineShared;
use crate::stack;
use crate::Result;

/// There can be only one engine per process: the runtime debug interface
/// supports a single debug relationship and requires one calling thread.
static ENGINE_EXISTS: AtomicBool = AtomicBool::new(false);

type Command = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Debug, Default)]
pub struct EngineOptions {
    /// Explicit helper-library path; otherwise the search order applies.
    pub dbgshim_path: Option<PathBuf>,
}

enum StepKind {
    Over,
    Into,
    Out,
}

pub struct DebugEngine {
    shared: Arc<EngineShared>,
    command_tx: flume::Sender<Command>,
}

impl DebugEngine {
    /// Locate the helper library and start the dispatch thread. Fails if
    /// the helper cannot be found or an engine already exists.
    pub fn new(options: EngineOptions) -> Result<Arc<Self>> {
        if ENGINE_EXISTS.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyInitialized);
        }

        let construct = || -> Result<Arc<Self>> {
            let shim = DbgShim::load(options.dbgshim_path.as_deref())?;
            info!("dbgshim loaded from {}", shim.path().display());

            let shared = Arc::new(EngineShared::new(shim));
            let (command_tx, command_rx) = flume::unbounded::<Command>();

            std::thread::Builder::new()
                .name("netdbg-dispatch".to_string())
                .spawn(move || {
                    for command in command_rx.iter() {
                        command();
                    }
                    debug!("dispatch thread exiting");
                })?;

            Ok(Arc::new(Self { shared, command_tx }))
        };

        match construct() {
            Ok(engine) => Ok(engine),
            Err(err) => {
                ENGINE_EXISTS.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Build the project, launch the app dll suspended, and return once
    /// the runtime reports process creation. The debuggee is left stopped
    /// so breakpoints can be set before the first continue.
    pub async fn launch(
        &self,
        project_path: &Path,
        app_dll_path: &Path,
        first_chance_exceptions: bool,
    ) -> Result<DebugEvent> {
        self.require_state(&[SessionState::Idle, SessionState::Exited], "launch")?;

        launcher::build_project(project_path).await?;

        let command_line = launcher::app_command_line(app_dll_path);
        self.launch_command(project_path, command_line, first_chance_exceptions)
            .await
    }

    /// Launch a project's test run under the debugger (the xUnit runner
    /// path); the project is built first.
    pub async fn launch_test(
        &self,
        project_path: &Path,
        first_chance_exceptions: bool,
    ) -> Result<DebugEvent> {
        self.require_state(&[SessionState::Idle, SessionState::Exited], "launch_test")?;

        launcher::build_project(project_path).await?;

        let command_line = launcher::test_command_line(project_path);
        self.launch_command(project_path, command_line, first_chance_exceptions)
            .await
    }

    async fn launch_command(
        &self,
        project_path: &Path,
        command_line: String,
        first_chance_exceptions: bool,
    ) -> Result<DebugEvent> {
        let working_dir = if project_path.is_dir() {
            Some(project_path.to_path_buf())
        } else {
            project_path.parent().map(|p| p.to_path_buf())
        };

        let shared = self.shared.clone();
        let receiver = self
            .dispatch(move || begin_launch(&shared, &command_line, working_dir, first_chance_exceptions))
            .await?;

        // Await precisely the process-created stop.
        loop {
            match receiver.recv_async().await {
                Ok(event) => match &event {
                    DebugEvent::Stopped { reason, .. } if reason == "process_created" => {
                        return Ok(event);
                    }
                    DebugEvent::Exited { .. } => return Ok(event),
                    other => debug!("event before process_created: {other:?}"),
                },
                Err(_) => return Err(EngineError::SessionClosed),
            }
        }
    }

    /// Attach to a running pid. Returns `(pid, process_name)`; the session
    /// is `Running` afterwards (use `pause` to stop it).
    pub async fn attach(&self, pid: u32) -> Result<(u32, String)> {
        self.require_state(&[SessionState::Idle, SessionState::Exited], "attach")?;

        let (notify_tx, notify_rx) = oneshot::channel();

        let shared = self.shared.clone();
        self.dispatch(move || begin_attach(&shared, pid, notify_tx))
            .await?;

        // The registration is asynchronous: the CreateProcess callback
        // fulfils this once the runtime is observed in the target.
        notify_rx
            .await
            .map_err(|_| EngineError::SessionClosed)?;

        let process_name = launcher::process_name(pid).unwrap_or_default();
        self.shared.set_state(SessionState::Running);

        Ok((pid, process_name))
    }

    /// Tear down any live session. Idempotent; the engine stays usable.
    pub async fn disconnect(&self) -> Result<()> {
        let shared = self.shared.clone();
        self.dispatch(move || {
            shared.teardown_session();
            shared.set_state(SessionState::Idle);
            Ok(())
        })
        .await
    }

    // -- breakpoints --------------------------------------------------------

    /// Map `(file, line)` to a method/IL-offset pair and create (or queue)
    /// a breakpoint there. Returns its id.
    pub async fn set_breakpoint(
        &self,
        dll_path: &Path,
        source_file: &str,
        line: u32,
    ) -> Result<u32> {
        self.require_state(
            &[SessionState::Stopped, SessionState::Running],
            "set_breakpoint",
        )?;

        let shared = self.shared.clone();
        let dll = dll_path.to_path_buf();
        let file = source_file.to_string();

        self.dispatch(move || set_breakpoint_command(&shared, &dll, &file, line))
            .await
    }

    /// Deactivate and forget a breakpoint. Unknown ids are not an error.
    pub async fn remove_breakpoint(&self, id: u32) -> Result<()> {
        let shared = self.shared.clone();
        self.dispatch(move || {
            let record = shared
                .breakpoints
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(id);

            if let Some(record) = record {
                if let Some(native) = &record.native {
                    if let Err(err) = native.activate(false) {
                        debug!("deactivate breakpoint {id}: {err}");
                    }
                }
            }

            Ok(())
        })
        .await
    }

    pub async fn list_breakpoints(&self) -> Result<Vec<BreakpointInfo>> {
        let shared = self.shared.clone();
        self.dispatch(move || {
            Ok(shared
                .breakpoints
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .snapshot())
        })
        .await
    }

    // -- execution control --------------------------------------------------

    /// Resume and wait for the next stop (or exit).
    pub async fn continue_execution(&self) -> Result<DebugEvent> {
        self.require_state(&[SessionState::Stopped], "continue")?;

        let shared = self.shared.clone();
        self.dispatch(move || {
            let process = current_process(&shared)?;
            process.continue_(false)?;
            shared.set_state(SessionState::Running);
            Ok(())
        })
        .await?;

        self.next_stop().await
    }

    pub async fn step_over(&self) -> Result<DebugEvent> {
        self.step(StepKind::Over).await
    }

    pub async fn step_into(&self) -> Result<DebugEvent> {
        self.step(StepKind::Into).await
    }

    pub async fn step_out(&self) -> Result<DebugEvent> {
        self.step(StepKind::Out).await
    }

    async fn step(&self, kind: StepKind) -> Result<DebugEvent> {
        self.require_state(&[SessionState::Stopped], "step")?;

        let shared = self.shared.clone();
        self.dispatch(move || step_command(&shared, kind)).await?;

        self.next_stop().await
    }

    /// Suspend all managed threads and surface the pause stop.
    pub async fn pause(&self) -> Result<DebugEvent> {
        self.require_state(&[SessionState::Running], "pause")?;

        let shared = self.shared.clone();
        self.dispatch(move || {
            let process = current_process(&shared)?;
            process.stop(0)?;

            let thread_id = shared
                .known_threads
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .next()
                .copied()
                .unwrap_or(0);
            shared
                .current_stopped_thread
                .store(thread_id, Ordering::SeqCst);

            // Stop() produces no callback of its own; report the pause.
            shared.publish(DebugEvent::Stopped {
                reason: "pause".to_string(),
                thread_id,
                top_frame: None,
            });

            Ok(())
        })
        .await?;

        self.next_stop().await
    }

    // -- inspection ---------------------------------------------------------

    /// Stacks for one thread, or for every known thread when `thread_id`
    /// is `None`.
    pub async fn get_stack_trace(&self, thread_id: Option<u32>) -> Result<Vec<ThreadStack>> {
        self.require_state(&[SessionState::Stopped], "stacktrace")?;

        let shared = self.shared.clone();
        self.dispatch(move || {
            let process = current_process(&shared)?;
            Ok(stack::build_stacks(&shared, &process, thread_id))
        })
        .await
    }

    /// Locals and arguments of the selected thread's active IL frame.
    /// Non-IL frames yield an empty list.
    pub async fn get_locals(&self, thread_id: Option<u32>) -> Result<Vec<VariableNode>> {
        self.require_state(&[SessionState::Stopped], "variables")?;

        let shared = self.shared.clone();
        self.dispatch(move || {
            let process = current_process(&shared)?;

            let tid = thread_id
                .unwrap_or_else(|| shared.current_stopped_thread.load(Ordering::SeqCst));
            let thread = process.get_thread(tid)?;

            let Some(frame) = thread.get_active_frame()? else {
                return Ok(Vec::new());
            };
            let Ok(il) = frame.to_il_frame() else {
                return Ok(Vec::new());
            };

            Ok(stack::read_frame_variables(&shared, &il))
        })
        .await
    }

    /// Restricted evaluation: a named local/argument/field chain/static.
    pub async fn evaluate(&self, expression: &str) -> Result<EvalResult> {
        self.require_state(&[SessionState::Stopped], "evaluate")?;

        let shared = self.shared.clone();
        let expression = expression.to_string();
        self.dispatch(move || {
            let process = current_process(&shared)?;
            Ok(eval::evaluate(&shared, &process, &expression))
        })
        .await
    }

    // -- plumbing -----------------------------------------------------------

    fn require_state(&self, allowed: &[SessionState], command: &'static str) -> Result<()> {
        check_state(self.shared.state(), allowed, command)
    }

    async fn dispatch<T, F>(&self, command: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        self.command_tx
            .send(Box::new(move || {
                let _ = tx.send(command());
            }))
            .map_err(|_| EngineError::SessionClosed)?;

        rx.await.map_err(|_| EngineError::SessionClosed)?
    }

    /// Await the next state-changing event. Informational `Output` items
    /// are logged and skipped.
    async fn next_stop(&self) -> Result<DebugEvent> {
        let receiver = self
            .shared
            .event_receiver()
            .ok_or(EngineError::NoSession)?;

        loop {
            match receiver.recv_async().await {
                Ok(event) => {
                    if event.state_after().is_some() {
                        return Ok(event);
                    }
                    debug!("informational event while waiting for stop: {event:?}");
                }
                Err(_) => return Err(EngineError::SessionClosed),
            }
        }
    }
}

impl Drop for DebugEngine {
    fn drop(&mut self) {
        ENGINE_EXISTS.store(false, Ordering::SeqCst);
    }
}

/// Gate a command on the session state without touching the runtime.
fn check_state(
    state: SessionState,
    allowed: &[SessionState],
    command: &'static str,
) -> Result<()> {
    if allowed.contains(&state) {
        return Ok(());
    }

    Err(EngineError::WrongState { command, state })
}

fn current_process(shared: &EngineShared) -> Result<Process> {
    shared
        .handles
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .process
        .clone()
        .ok_or(EngineError::NoSession)
}

// ---------------------------------------------------------------------------
// Dispatch-thread command bodies
// ---------------------------------------------------------------------------

/// Session setup shared by launch and attach: stale-session teardown,
/// fresh session id, fresh event channel, cleared registries.
fn begin_session(shared: &EngineShared) -> flume::Receiver<DebugEvent> {
    shared.teardown_session();

    // teardown set the suppress flag to swallow the old session's late
    // ExitProcess; the session-id guard covers it from here on.
    shared.suppress_exit_process.store(false, Ordering::SeqCst);
    shared.session_id.fetch_add(1, Ordering::SeqCst);

    shared.install_event_channel()
}

fn begin_launch(
    shared: &Arc<EngineShared>,
    command_line: &str,
    working_dir: Option<PathBuf>,
    first_chance_exceptions: bool,
) -> Result<flume::Receiver<DebugEvent>> {
    let receiver = begin_session(shared);

    shared.stop_at_create_process.store(true, Ordering::SeqCst);
    shared
        .notify_first_chance
        .store(first_chance_exceptions, Ordering::SeqCst);

    let (pid, resume_handle) = shared
        .shim
        .create_process_for_launch(command_line, working_dir.as_deref())?;
    info!("launched suspended debuggee pid {pid}: {command_line}");

    let registration =
        shared
            .shim
            .register_for_runtime_startup(pid, true, startup_closure(shared.clone(), pid))?;

    shared.shim.resume_process(&resume_handle)?;
    shared.shim.close_resume_handle(resume_handle)?;

    {
        let mut handles = shared.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.pid = Some(pid);
        handles.registration = Some(registration);
    }

    Ok(receiver)
}

fn begin_attach(
    shared: &Arc<EngineShared>,
    pid: u32,
    notify: oneshot::Sender<()>,
) -> Result<()> {
    let _receiver = begin_session(shared);

    shared.stop_at_create_process.store(false, Ordering::SeqCst);
    shared.notify_first_chance.store(false, Ordering::SeqCst);
    *shared
        .attach_notify
        .lock()
        .unwrap_or_else(|e| e.into_inner()) = Some(notify);

    let registration =
        shared
            .shim
            .register_for_runtime_startup(pid, false, startup_closure(shared.clone(), pid))?;

    {
        let mut handles = shared.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.pid = Some(pid);
        handles.registration = Some(registration);
    }

    info!("attach registered for pid {pid}");
    Ok(())
}

/// Runs on a runtime-internal thread once the target's runtime is up:
/// wraps the raw debugger pointer, initializes it, installs the callback
/// sink, and begins debugging the process.
fn startup_closure(shared: Arc<EngineShared>, pid: u32) -> dbgshim::StartupClosure {
    Box::new(move |raw_cordb, hr| {
        if hr < 0 || raw_cordb.is_null() {
            error!("runtime startup callback failed: HRESULT {hr:#010x}");
            return;
        }

        let result = (|| -> Result<()> {
            let cordebug = unsafe { CorDebug::from_raw(raw_cordb) }?;
            cordebug.initialize()?;

            let sink = ManagedCallback::create(shared.clone());
            let installed = cordebug.set_managed_callback(sink);
            // The runtime took its own reference on success; ours is done
            // either way.
            unsafe { ManagedCallback::release(sink) };
            installed?;

            let process = cordebug.debug_active_process(pid)?;

            let mut handles = shared.handles.lock().unwrap_or_else(|e| e.into_inner());
            handles.cordebug = Some(cordebug);
            handles.process = Some(process);

            Ok(())
        })();

        match result {
            Ok(()) => info!("debug session established for pid {pid}"),
            Err(err) => error!("failed to establish debug session for pid {pid}: {err}"),
        }
    })
}

fn set_breakpoint_command(
    shared: &EngineShared,
    dll_path: &Path,
    source_file: &str,
    line: u32,
) -> Result<u32> {
    let location = {
        let metadata = shared.metadata.lock().unwrap_or_else(|e| e.into_inner());
        metadata.find_location(dll_path, source_file, line)?
    };

    let Some(location) = location else {
        return Err(EngineError::BreakpointLocationUnknown {
            file: source_file.to_string(),
            line,
        });
    };

    let dll_basename = dll_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dll_path.to_string_lossy().into_owned());

    let id = shared
        .breakpoints
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .next_id();

    let mut record = BreakpointRecord {
        id,
        dll_basename: dll_basename.clone(),
        source_file: source_file.to_string(),
        line,
        method_token: location.method_token,
        il_offset: location.il_offset,
        native: None,
        enabled: true,
    };

    // If the owning module is already loaded, bind now; otherwise the
    // record waits for its LoadModule event.
    let module = shared
        .modules
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .find_by_basename(&dll_basename)
        .map(|entry| entry.module.clone());

    if let Some(module) = module {
        let native = module
            .get_function_from_token(location.method_token)?
            .get_il_code()?
            .create_breakpoint(location.il_offset)?;
        native.activate(true)?;
        record.native = Some(native);

        debug!(
            "breakpoint {id} bound at {source_file}:{line} (IL {:#x})",
            location.il_offset
        );
    } else {
        debug!("breakpoint {id} pending: {dll_basename} not loaded yet");
    }

    shared
        .breakpoints
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(record);

    Ok(id)
}

fn step_command(shared: &EngineShared, kind: StepKind) -> Result<()> {
    let process = current_process(shared)?;

    let tid = shared.current_stopped_thread.load(Ordering::SeqCst);
    let thread = process.get_thread(tid)?;

    let stepper = thread.create_stepper()?;
    stepper.set_intercept_mask(COR_DEBUG_INTERCEPT_NONE)?;
    stepper.set_unmapped_stop_mask(COR_DEBUG_STOP_NONE)?;

    match kind {
        StepKind::Out => stepper.step_out()?,
        StepKind::Over | StepKind::Into => {
            let step_in = matches!(kind, StepKind::Into);

            // The argument-less Step degenerates to instruction stepping
            // on this platform; always step by the current source line's
            // IL range instead.
            let range = current_line_range(shared, &thread)?;
            stepper.step_range(step_in, &[range])?;
        }
    }

    process.continue_(false)?;
    shared.set_state(SessionState::Running);

    Ok(())
}

/// The IL-offset span of the source line containing the frame's IP, from
/// the PDB sequence points.
fn current_line_range(
    shared: &EngineShared,
    thread: &cordebug::Thread,
) -> Result<StepRange> {
    let frame = thread
        .get_active_frame()?
        .ok_or(EngineError::NoSession)?;
    let il = frame.to_il_frame()?;

    let (token, ip, module_path) = stack::il_frame_context(&il)?;

    let il_size = il.get_function()?.get_il_code()?.get_size()?;

    let points = {
        let metadata = shared.metadata.lock().unwrap_or_else(|e| e.into_inner());
        metadata.sequence_points(Path::new(&module_path), token)?
    };

    let (start, end) = step_range_for_ip(&points, ip, il_size);
    Ok(StepRange {
        start_offset: start,
        end_offset: end,
    })
}

/// Pick `[sp.offset, next_sp.offset)` for the sequence point containing
/// `ip`, or `[sp.offset, il_size)` for the last. With no usable points,
/// fall back to a single-instruction span.
fn step_range_for_ip(points: &[SequencePoint], ip: u32, il_size: u32) -> (u32, u32) {
    let mut containing: Option<usize> = None;

    for (index, point) in points.iter().enumerate() {
        if point.il_offset <= ip {
            containing = Some(index);
        } else {
            break;
        }
    }

    match containing {
        Some(index) => {
            let start = points[index].il_offset;
            let end = points
                .get(index + 1)
                .map(|next| next.il_offset)
                .unwrap_or(il_size);
            (start, end.max(start + 1))
        }
        None => (ip, ip.saturating_add(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn point(il_offset: u32, hidden: bool) -> SequencePoint {
        SequencePoint {
            il_offset,
            start_line: 10,
            start_column: 1,
            end_line: 10,
            end_column: 2,
            document: 1,
            hidden,
        }
    }

    #[test]
    fn wrong_state_is_rejected_without_runtime_contact() {
        let err = check_state(SessionState::Exited, &[SessionState::Stopped], "variables")
            .unwrap_err();

        match err {
            EngineError::WrongState { command, state } => {
                assert_eq!(command, "variables");
                assert_eq!(state, SessionState::Exited);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn allowed_states_pass() {
        assert!(check_state(
            SessionState::Idle,
            &[SessionState::Idle, SessionState::Exited],
            "launch"
        )
        .is_ok());
    }

    #[test]
    fn step_range_spans_the_containing_line() {
        let points = vec![point(0, false), point(5, false), point(12, false)];

        // IP inside the second point's span.
        assert_eq!(step_range_for_ip(&points, 7, 40), (5, 12));
        // IP exactly on a point.
        assert_eq!(step_range_for_ip(&points, 5, 40), (5, 12));
        // Last point runs to the IL end.
        assert_eq!(step_range_for_ip(&points, 20, 40), (12, 40));
    }

    #[test]
    fn step_range_without_points_is_one_instruction() {
        assert_eq!(step_range_for_ip(&[], 9, 40), (9, 10));
    }

    #[test]
    fn hidden_points_still_bound_ranges() {
        let points = vec![point(0, false), point(8, true), point(12, false)];
        assert_eq!(step_range_for_ip(&points, 2, 40), (0, 8));
    }
}
