// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! State shared between the public API, the dispatch thread, and the
//! callback sink.
//!
//! The runtime capability handles live behind mutexes so the dispatch
//! thread and runtime callbacks can reach them, but the discipline stays:
//! the dispatch thread is the only engine-side caller, and sink handlers
//! only touch what a stopped debuggee permits.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use cordebug::{Controller, CorDebug, Module, Process};
use dbgshim::{DbgShim, StartupRegistration};
use log::{debug, warn};
use portable_pdb::MetadataCache;
use tokio::sync::oneshot;

use crate::breakpoints::BreakpointRegistry;
use crate::events::{DebugEvent, SessionState};

/// Runtime handles of the current session. All `None` while `Idle`.
#[derive(Default)]
pub(crate) struct SessionHandles {
    pub cordebug: Option<CorDebug>,
    pub process: Option<Process>,
    pub registration: Option<StartupRegistration>,
    pub pid: Option<u32>,
}

/// One loaded module, keyed by full path; populated from `LoadModule`.
pub(crate) struct LoadedModuleEntry {
    pub path: String,
    pub module: Module,
}

#[derive(Default)]
pub(crate) struct ModuleRegistry {
    entries: Vec<LoadedModuleEntry>,
}

impl ModuleRegistry {
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn insert(&mut self, path: String, module: Module) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.path == path) {
            existing.module = module;
        } else {
            self.entries.push(LoadedModuleEntry { path, module });
        }
    }

    /// The loaded module whose path ends with `basename`, if any.
    pub fn find_by_basename(&self, basename: &str) -> Option<&LoadedModuleEntry> {
        self.entries.iter().find(|e| e.path.ends_with(basename))
    }
}

pub(crate) struct EngineShared {
    pub shim: DbgShim,
    pub metadata: Mutex<MetadataCache>,
    pub state: Mutex<SessionState>,
    pub handles: Mutex<SessionHandles>,
    pub breakpoints: Mutex<BreakpointRegistry>,
    pub modules: Mutex<ModuleRegistry>,

    /// Writer half of the event channel; owned by the sink, swapped per
    /// session, dropped on `ExitProcess` to complete the channel.
    pub event_tx: Mutex<Option<flume::Sender<DebugEvent>>>,
    /// Reader half handed to awaiting commands.
    pub event_rx: Mutex<Option<flume::Receiver<DebugEvent>>>,

    /// Incremented per `launch`/`attach`; the staleness guard.
    pub session_id: AtomicU64,
    /// Session id captured by the `CreateProcess` callback.
    pub create_process_session: AtomicU64,

    pub stop_at_create_process: AtomicBool,
    pub notify_first_chance: AtomicBool,
    pub suppress_exit_process: AtomicBool,
    pub exception_stop_pending: AtomicBool,

    pub current_stopped_thread: AtomicU32,
    pub known_threads: Mutex<BTreeSet<u32>>,

    /// Fulfilled by the `CreateProcess` callback during `attach`.
    pub attach_notify: Mutex<Option<oneshot::Sender<()>>>,
}

impl EngineShared {
    pub fn new(shim: DbgShim) -> Self {
        Self {
            shim,
            metadata: Mutex::new(MetadataCache::new()),
            state: Mutex::new(SessionState::Idle),
            handles: Mutex::new(SessionHandles::default()),
            breakpoints: Mutex::new(BreakpointRegistry::new()),
            modules: Mutex::new(ModuleRegistry::default()),
            event_tx: Mutex::new(None),
            event_rx: Mutex::new(None),
            session_id: AtomicU64::new(0),
            create_process_session: AtomicU64::new(0),
            stop_at_create_process: AtomicBool::new(false),
            notify_first_chance: AtomicBool::new(false),
            suppress_exit_process: AtomicBool::new(false),
            exception_stop_pending: AtomicBool::new(false),
            current_stopped_thread: AtomicU32::new(0),
            known_threads: Mutex::new(BTreeSet::new()),
            attach_notify: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        debug!("session state -> {state:?}");
    }

    /// Publish an event on the current session's channel and update the
    /// session state it implies.
    pub fn publish(&self, event: DebugEvent) {
        if let Some(state) = event.state_after() {
            self.set_state(state);
        }

        let sender = self
            .event_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        match sender {
            Some(sender) => {
                if sender.send(event).is_err() {
                    warn!("event channel receiver dropped; event lost");
                }
            }
            None => warn!("no event channel installed; event dropped"),
        }
    }

    /// Complete the event channel: publish nothing further this session.
    pub fn close_event_channel(&self) {
        self.event_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    /// Install a fresh event channel for a new session, returning the
    /// reader. Items left in the previous channel are dropped.
    pub fn install_event_channel(&self) -> flume::Receiver<DebugEvent> {
        let (tx, rx) = flume::unbounded();

        *self.event_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        *self.event_rx.lock().unwrap_or_else(|e| e.into_inner()) = Some(rx.clone());

        rx
    }

    pub fn event_receiver(&self) -> Option<flume::Receiver<DebugEvent>> {
        self.event_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Best-effort teardown of any live session, used by `disconnect` and
    /// by relaunch hygiene. The dispatch thread keeps running.
    pub fn teardown_session(&self) {
        self.suppress_exit_process.store(true, Ordering::SeqCst);

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(process) = handles.process.take() {
            if let Err(err) = process.stop(0) {
                debug!("teardown: stop failed: {err}");
            }
            if let Err(err) = Controller::terminate(&process, 0) {
                debug!("teardown: terminate failed: {err}");
            }
        }

        if let Some(registration) = handles.registration.take() {
            if let Err(err) = self.shim.unregister(registration) {
                debug!("teardown: unregister failed: {err}");
            }
        }

        if let Some(cordebug) = handles.cordebug.take() {
            if let Err(err) = cordebug.terminate() {
                debug!("teardown: ICorDebug::Terminate failed: {err}");
            }
        }

        handles.pid = None;
        drop(handles);

        self.breakpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.modules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.known_threads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.current_stopped_thread.store(0, Ordering::SeqCst);
        self.exception_stop_pending.store(false, Ordering::SeqCst);
    }
}
