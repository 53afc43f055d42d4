// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bindings to the .NET runtime debugging helper library (`libdbgshim.so`).
//!
//! The helper library is the supported entry point for starting or attaching
//! a CoreCLR debug session on Linux: it spawns the debuggee suspended,
//! reports runtime startup inside a target process, and manufactures the
//! root `ICorDebug` interface pointer that the rest of the debugger drives.
//!
//! This crate only locates the library, binds its exports, and enforces the
//! callback-lifetime contract of `RegisterForRuntimeStartup`. It knows
//! nothing about the debug session itself.

#![cfg(target_os = "linux")]

mod api;
mod locate;

pub use api::{
    DbgShim, Hresult, ResumeHandle, ShimError, StartupClosure, StartupRegistration,
    COR_DEBUG_VERSION_4_0, S_OK,
};
pub use locate::candidate_paths;

/// Encode a Rust string as a NUL-terminated UTF-16 buffer.
pub(crate) fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Decode a NUL-terminated UTF-16 buffer, stopping at the first NUL.
pub(crate) fn from_wide(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_round_trip() {
        let wide = to_wide("dotnet app.dll");
        assert_eq!(wide.last(), Some(&0));
        assert_eq!(from_wide(&wide), "dotnet app.dll");
    }

    #[test]
    fn from_wide_stops_at_nul() {
        let buf = [0x61, 0x62, 0, 0x63];
        assert_eq!(from_wide(&buf), "ab");
    }
}
