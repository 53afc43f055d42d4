// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// COM interface identifier.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }
}

pub const IID_IUNKNOWN: Guid = Guid::new(
    0x0000_0000,
    0x0000,
    0x0000,
    [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
);

pub const IID_ICOR_DEBUG_MANAGED_CALLBACK: Guid = Guid::new(
    0x3d6f_5f60,
    0x7538,
    0x11d3,
    [0x8d, 0x5b, 0x00, 0x10, 0x4b, 0x35, 0xe7, 0xef],
);

pub const IID_ICOR_DEBUG_MANAGED_CALLBACK2: Guid = Guid::new(
    0x250e_5eea,
    0xdb5c,
    0x4c76,
    [0xb6, 0xf3, 0x8c, 0x46, 0xf1, 0x2e, 0x32, 0x03],
);

pub const IID_ICOR_DEBUG_IL_FRAME: Guid = Guid::new(
    0x03e2_6311,
    0x4f76,
    0x11d3,
    [0x88, 0xc6, 0x00, 0x60, 0x97, 0x94, 0x54, 0x18],
);

pub const IID_ICOR_DEBUG_FUNCTION_BREAKPOINT: Guid = Guid::new(
    0xcc7b_cae9,
    0x8a68,
    0x11d2,
    [0x98, 0x3c, 0x00, 0x00, 0xf8, 0x08, 0x34, 0x2d],
);

pub const IID_ICOR_DEBUG_GENERIC_VALUE: Guid = Guid::new(
    0xcc7b_caf8,
    0x8a68,
    0x11d2,
    [0x98, 0x3c, 0x00, 0x00, 0xf8, 0x08, 0x34, 0x2d],
);

pub const IID_ICOR_DEBUG_REFERENCE_VALUE: Guid = Guid::new(
    0xcc7b_caf9,
    0x8a68,
    0x11d2,
    [0x98, 0x3c, 0x00, 0x00, 0xf8, 0x08, 0x34, 0x2d],
);

pub const IID_ICOR_DEBUG_HEAP_VALUE: Guid = Guid::new(
    0xcc7b_cafa,
    0x8a68,
    0x11d2,
    [0x98, 0x3c, 0x00, 0x00, 0xf8, 0x08, 0x34, 0x2d],
);

pub const IID_ICOR_DEBUG_OBJECT_VALUE: Guid = Guid::new(
    0x18ad_3d6e,
    0xb7d2,
    0x11d2,
    [0xbd, 0x04, 0x00, 0x00, 0xf8, 0x08, 0x49, 0xbd],
);

pub const IID_ICOR_DEBUG_STRING_VALUE: Guid = Guid::new(
    0xcc7b_cafd,
    0x8a68,
    0x11d2,
    [0x98, 0x3c, 0x00, 0x00, 0xf8, 0x08, 0x34, 0x2d],
);

pub const IID_ICOR_DEBUG_ARRAY_VALUE: Guid = Guid::new(
    0x0405_b0df,
    0xa660,
    0x11d2,
    [0xbd, 0x02, 0x00, 0x00, 0xf8, 0x08, 0x49, 0xbd],
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_layout_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<Guid>(), 16);
    }

    #[test]
    fn distinct_value_iids() {
        assert_ne!(IID_ICOR_DEBUG_GENERIC_VALUE, IID_ICOR_DEBUG_REFERENCE_VALUE);
        assert_ne!(IID_ICOR_DEBUG_OBJECT_VALUE, IID_ICOR_DEBUG_STRING_VALUE);
    }
}
