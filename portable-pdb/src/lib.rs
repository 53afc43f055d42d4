// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Reader for compiled-assembly metadata and Portable PDB debug data.
//!
//! The runtime's in-process metadata interface is unavailable on Linux, so
//! every type- and debug-info question is answered directly from the
//! assembly file and its Portable PDB (adjacent `.pdb`, or embedded in the
//! PE debug directory): source line ↔ (method token, IL offset) mapping,
//! local and argument names, field layouts, base-type walks, enum members.
//!
//! Method tokens produced here are `0x06000000 | row`, the same identifiers
//! the runtime reports through its callback surface.

mod heaps;
mod pdb;
mod pe;
mod reader;
mod tables;

pub use heaps::Cursor;
pub use pdb::{Document, SequencePoint};
pub use reader::{display_name, FieldInfo, MetadataCache, MethodLocation};
pub use tables::TableId;

use std::path::PathBuf;

use thiserror::Error;

/// Method-definition token marker.
pub const METHOD_DEF_TOKEN: u32 = 0x0600_0000;
/// Type-definition token marker.
pub const TYPE_DEF_TOKEN: u32 = 0x0200_0000;
/// Field-definition token marker.
pub const FIELD_DEF_TOKEN: u32 = 0x0400_0000;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("i/o error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("truncated metadata while reading {0}")]
    Truncated(&'static str),

    #[error("bad signature for {0}")]
    BadSignature(&'static str),

    #[error("assembly has no CLI header: {0}")]
    NotManaged(PathBuf),

    #[error("metadata stream {0} not present")]
    MissingStream(&'static str),

    #[error("no portable PDB found for {0} (no adjacent .pdb, no embedded pdb)")]
    PdbNotFound(PathBuf),

    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("row {row} out of range for table {table:?}")]
    RowOutOfRange { table: TableId, row: u32 },
}

pub type Result<T> = std::result::Result<T, MetadataError>;
