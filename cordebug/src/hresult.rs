// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

pub type Hresult = i32;

pub const S_OK: Hresult = 0;
/// Success-with-caveat; enumerators return it at end of sequence.
pub const S_FALSE: Hresult = 1;

/// "Local variable not available" — the runtime's end-of-locals signal when
/// enumerating IL frame slots.
pub const CORDBG_E_IL_VAR_NOT_AVAILABLE: Hresult = 0x8013_1304_u32 as i32;

#[derive(Debug, Error)]
pub enum CorError {
    #[error("runtime call {call} failed with HRESULT {hr:#010x}")]
    Hresult { call: &'static str, hr: Hresult },

    #[error("interface pointer for {0} was null")]
    NullInterface(&'static str),
}

impl CorError {
    /// The raw HRESULT, when this error carries one.
    pub fn hresult(&self) -> Option<Hresult> {
        match self {
            CorError::Hresult { hr, .. } => Some(*hr),
            CorError::NullInterface(_) => None,
        }
    }
}

/// Map a failing HRESULT to an error; `S_OK`/`S_FALSE` and other
/// non-negative values pass through.
pub fn check_hresult(call: &'static str, hr: Hresult) -> Result<Hresult, CorError> {
    if hr < 0 {
        Err(CorError::Hresult { call, hr })
    } else {
        Ok(hr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_hresult_is_an_error() {
        let err = check_hresult("Stop", 0x8013_1301_u32 as i32).unwrap_err();
        assert_eq!(err.hresult(), Some(0x8013_1301_u32 as i32));
    }

    #[test]
    fn s_ok_and_s_false_pass() {
        assert_eq!(check_hresult("Next", S_OK).unwrap(), S_OK);
        assert_eq!(check_hresult("Next", S_FALSE).unwrap(), S_FALSE);
    }

    #[test]
    fn end_of_locals_hresult_value() {
        assert_eq!(CORDBG_E_IL_VAR_NOT_AVAILABLE as u32, 0x8013_1304);
    }
}
