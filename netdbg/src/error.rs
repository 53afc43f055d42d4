// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

use crate::events::SessionState;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Helper library or runtime component missing; fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(#[from] dbgshim::ShimError),

    /// `dotnet build` exited nonzero. The session stays `Idle`.
    #[error("build failed with exit code {code}")]
    BuildFailed {
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// Command issued in a state that forbids it; the runtime is never
    /// contacted.
    #[error("cannot {command} while session is {state:?}")]
    WrongState {
        command: &'static str,
        state: SessionState,
    },

    /// The PDB has no sequence point for the requested source location.
    #[error("no code at {file}:{line}")]
    BreakpointLocationUnknown { file: String, line: u32 },

    /// Nonzero HRESULT from a runtime capability call.
    #[error(transparent)]
    Runtime(#[from] cordebug::CorError),

    #[error(transparent)]
    Metadata(#[from] portable_pdb::MetadataError),

    /// A second engine in the same process; the runtime debug interface
    /// supports only one.
    #[error("debug engine already initialized in this process")]
    AlreadyInitialized,

    /// The session's event channel closed (debuggee exited) while a
    /// command was waiting on it.
    #[error("debug session is gone")]
    SessionClosed,

    #[error("no runtime debug session is active")]
    NoSession,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// The raw HRESULT for runtime errors, for diagnostics.
    pub fn hresult(&self) -> Option<i32> {
        match self {
            EngineError::Runtime(err) => err.hresult(),
            _ => None,
        }
    }
}
