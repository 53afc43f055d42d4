// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Method-definition table marker: runtime method tokens are
/// `0x06000000 | row`.
pub const METHOD_DEF_TOKEN_BASE: u32 = 0x0600_0000;

/// `CorDebugIntercept::INTERCEPT_NONE`.
pub const COR_DEBUG_INTERCEPT_NONE: u32 = 0;

/// `CorDebugUnmappedStop::STOP_NONE`. Notably this does not include
/// `STOP_UNMANAGED`, which must stay unset on this platform.
pub const COR_DEBUG_STOP_NONE: u32 = 0;

/// Element-type tag of a runtime value (`CorElementType`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorElementType {
    Void,
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    String,
    Ptr,
    ByRef,
    ValueType,
    Class,
    Var,
    Array,
    GenericInst,
    TypedByRef,
    I,
    U,
    FnPtr,
    Object,
    SzArray,
    MVar,
    Other(u32),
}

impl CorElementType {
    pub fn from_raw(raw: u32) -> Self {
        use CorElementType::*;

        match raw {
            0x01 => Void,
            0x02 => Boolean,
            0x03 => Char,
            0x04 => I1,
            0x05 => U1,
            0x06 => I2,
            0x07 => U2,
            0x08 => I4,
            0x09 => U4,
            0x0a => I8,
            0x0b => U8,
            0x0c => R4,
            0x0d => R8,
            0x0e => String,
            0x0f => Ptr,
            0x10 => ByRef,
            0x11 => ValueType,
            0x12 => Class,
            0x13 => Var,
            0x14 => Array,
            0x15 => GenericInst,
            0x16 => TypedByRef,
            0x18 => I,
            0x19 => U,
            0x1b => FnPtr,
            0x1c => Object,
            0x1d => SzArray,
            0x1e => MVar,
            other => Other(other),
        }
    }

    /// Tag name used when the value reader has no better rendering.
    pub fn tag_name(&self) -> &'static str {
        use CorElementType::*;

        match self {
            Void => "void",
            Boolean => "bool",
            Char => "char",
            I1 => "sbyte",
            U1 => "byte",
            I2 => "short",
            U2 => "ushort",
            I4 => "int",
            U4 => "uint",
            I8 => "long",
            U8 => "ulong",
            R4 => "float",
            R8 => "double",
            String => "string",
            Ptr => "pointer",
            ByRef => "byref",
            ValueType => "struct",
            Class => "class",
            Var => "typevar",
            Array => "array",
            GenericInst => "generic",
            TypedByRef => "typedbyref",
            I => "nint",
            U => "nuint",
            FnPtr => "fnptr",
            Object => "object",
            SzArray => "array",
            MVar => "methodvar",
            Other(_) => "unknown",
        }
    }
}

/// `CorDebugExceptionCallbackType` values delivered to the v2 exception
/// callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionCallbackType {
    FirstChance,
    UserFirstChance,
    CatchHandlerFound,
    Unhandled,
    Other(u32),
}

impl ExceptionCallbackType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ExceptionCallbackType::FirstChance,
            2 => ExceptionCallbackType::UserFirstChance,
            3 => ExceptionCallbackType::CatchHandlerFound,
            4 => ExceptionCallbackType::Unhandled,
            other => ExceptionCallbackType::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_type_round_trip_tags() {
        assert_eq!(CorElementType::from_raw(0x08), CorElementType::I4);
        assert_eq!(CorElementType::from_raw(0x1d), CorElementType::SzArray);
        assert_eq!(CorElementType::from_raw(0xff), CorElementType::Other(0xff));
    }

    #[test]
    fn unhandled_callback_type() {
        assert_eq!(
            ExceptionCallbackType::from_raw(4),
            ExceptionCallbackType::Unhandled
        );
    }
}
