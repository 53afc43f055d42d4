// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Locating metadata inside a managed PE file, and finding its Portable
//! PDB (adjacent file or embedded, deflate-compressed, in the PE debug
//! directory).

use std::io::Read;
use std::path::Path;

use goblin::pe::PE;
use log::debug;

use crate::heaps::Cursor;
use crate::tables::TABLE_COUNT;
use crate::{MetadataError, Result};

/// Debug-directory entry type for an embedded Portable PDB.
const DEBUG_TYPE_EMBEDDED_PORTABLE_PDB: u32 = 17;
/// `MPDB` magic introducing the embedded-PDB payload.
const EMBEDDED_PDB_SIGNATURE: u32 = 0x4244_504d;
/// `BSJB` metadata-root signature.
const METADATA_SIGNATURE: u32 = 0x424a_5342;

/// The stream slices of one metadata root.
pub struct MetadataStreams<'a> {
    pub tables: &'a [u8],
    pub strings: &'a [u8],
    pub blob: &'a [u8],
    pub guid: &'a [u8],
    /// `#Pdb` stream; present only in Portable PDB metadata.
    pub pdb: Option<&'a [u8]>,
}

fn rva_to_offset(pe: &PE, rva: u32) -> Option<usize> {
    for section in &pe.sections {
        let start = section.virtual_address;
        let size = section.virtual_size.max(section.size_of_raw_data);

        if rva >= start && rva < start.saturating_add(size) {
            return Some((rva - start + section.pointer_to_raw_data) as usize);
        }
    }

    None
}

/// Slice out the metadata root (`BSJB`...) of a managed PE image.
pub fn metadata_slice<'a>(path: &Path, data: &'a [u8]) -> Result<&'a [u8]> {
    let pe = PE::parse(data).map_err(|_| MetadataError::BadSignature("PE image"))?;

    let optional = pe
        .header
        .optional_header
        .ok_or(MetadataError::BadSignature("PE optional header"))?;

    let clr_dir = optional.data_directories.get_clr_runtime_header();
    let clr = clr_dir
        .as_ref()
        .ok_or_else(|| MetadataError::NotManaged(path.to_path_buf()))?
        .clone();

    let cli_offset = rva_to_offset(&pe, clr.virtual_address)
        .ok_or(MetadataError::Malformed("CLI header rva"))?;

    let cli = data
        .get(cli_offset..cli_offset + 16)
        .ok_or(MetadataError::Truncated("CLI header"))?;

    let mut cursor = Cursor::new(cli);
    cursor.skip(8)?; // cb, runtime version
    let metadata_rva = cursor.read_u32()?;
    let metadata_size = cursor.read_u32()? as usize;

    let metadata_offset = rva_to_offset(&pe, metadata_rva)
        .ok_or(MetadataError::Malformed("metadata rva"))?;

    data.get(metadata_offset..metadata_offset + metadata_size)
        .ok_or(MetadataError::Truncated("metadata root"))
}

/// Parse a metadata root into its stream slices. Works for both assembly
/// metadata and Portable PDB metadata (the physical format is shared).
pub fn parse_metadata_root(root: &[u8]) -> Result<MetadataStreams<'_>> {
    let mut cursor = Cursor::new(root);

    if cursor.read_u32()? != METADATA_SIGNATURE {
        return Err(MetadataError::BadSignature("metadata root"));
    }

    cursor.skip(4)?; // major/minor
    cursor.skip(4)?; // reserved
    let version_len = cursor.read_u32()? as usize;
    cursor.skip(version_len)?;
    cursor.skip(2)?; // flags
    let stream_count = cursor.read_u16()?;

    let mut tables = None;
    let mut strings = None;
    let mut blob = None;
    let mut guid = None;
    let mut pdb = None;

    for _ in 0..stream_count {
        let offset = cursor.read_u32()? as usize;
        let size = cursor.read_u32()? as usize;

        // Name: NUL-terminated ASCII, padded to a 4-byte boundary.
        let name_start = cursor.position();
        let mut name = String::new();
        loop {
            let byte = cursor.read_u8()?;
            if byte == 0 {
                break;
            }
            name.push(byte as char);
        }
        let consumed = cursor.position() - name_start;
        cursor.skip(consumed.next_multiple_of(4) - consumed)?;

        let stream = root
            .get(offset..offset + size)
            .ok_or(MetadataError::Truncated("stream"))?;

        match name.as_str() {
            "#~" | "#-" => tables = Some(stream),
            "#Strings" => strings = Some(stream),
            "#Blob" => blob = Some(stream),
            "#GUID" => guid = Some(stream),
            "#Pdb" => pdb = Some(stream),
            _ => {}
        }
    }

    Ok(MetadataStreams {
        tables: tables.ok_or(MetadataError::MissingStream("#~"))?,
        strings: strings.ok_or(MetadataError::MissingStream("#Strings"))?,
        blob: blob.unwrap_or(&[]),
        guid: guid.unwrap_or(&[]),
        pdb,
    })
}

/// Parse the `#Pdb` stream: 20-byte id, entry-point token, then row counts
/// for every referenced type-system table.
pub fn parse_pdb_stream(stream: &[u8]) -> Result<[u32; TABLE_COUNT]> {
    let mut cursor = Cursor::new(stream);

    cursor.skip(20)?; // pdb id
    cursor.skip(4)?; // entry point token
    let referenced = cursor.read_u64()?;

    let mut counts = [0u32; TABLE_COUNT];
    for (index, count) in counts.iter_mut().enumerate() {
        if referenced & (1u64 << index) != 0 {
            *count = cursor.read_u32()?;
        }
    }

    Ok(counts)
}

/// Extract an embedded Portable PDB from the PE debug directory, if any.
pub fn embedded_pdb(path: &Path, data: &[u8]) -> Result<Option<Vec<u8>>> {
    let pe = PE::parse(data).map_err(|_| MetadataError::BadSignature("PE image"))?;

    let Some(optional) = pe.header.optional_header else {
        return Ok(None);
    };

    let debug_table = optional.data_directories.get_debug_table();
    let Some(debug_dir) = debug_table.as_ref() else {
        return Ok(None);
    };

    let Some(dir_offset) = rva_to_offset(&pe, debug_dir.virtual_address) else {
        return Ok(None);
    };

    let entry_count = debug_dir.size as usize / 28;
    for index in 0..entry_count {
        let entry = data
            .get(dir_offset + index * 28..dir_offset + (index + 1) * 28)
            .ok_or(MetadataError::Truncated("debug directory"))?;

        let mut cursor = Cursor::new(entry);
        cursor.skip(12)?; // characteristics, timestamp, version
        let entry_type = cursor.read_u32()?;
        let size_of_data = cursor.read_u32()? as usize;
        cursor.skip(4)?; // address_of_raw_data
        let pointer_to_raw_data = cursor.read_u32()? as usize;

        if entry_type != DEBUG_TYPE_EMBEDDED_PORTABLE_PDB {
            continue;
        }

        let payload = data
            .get(pointer_to_raw_data..pointer_to_raw_data + size_of_data)
            .ok_or(MetadataError::Truncated("embedded pdb"))?;

        let mut payload_cursor = Cursor::new(payload);
        if payload_cursor.read_u32()? != EMBEDDED_PDB_SIGNATURE {
            return Err(MetadataError::BadSignature("embedded pdb"));
        }
        let uncompressed_size = payload_cursor.read_u32()? as usize;

        let mut decoder = flate2::read::DeflateDecoder::new(&payload[8..]);
        let mut decompressed = Vec::with_capacity(uncompressed_size);
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|_| MetadataError::Malformed("embedded pdb deflate"))?;

        debug!(
            "extracted embedded pdb from {}: {} bytes",
            path.display(),
            decompressed.len()
        );

        return Ok(Some(decompressed));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Hand-built metadata root with a `#~` and a `#Strings` stream.
    fn minimal_root() -> Vec<u8> {
        let version = b"v4.0.30319\0\0"; // padded to 4
        let tables_stream = [0u8; 24];
        let strings_stream = b"\0test\0\0\0";

        let mut root = Vec::new();
        root.extend_from_slice(&METADATA_SIGNATURE.to_le_bytes());
        root.extend_from_slice(&[1, 0, 1, 0]); // major, minor
        root.extend_from_slice(&0u32.to_le_bytes()); // reserved
        root.extend_from_slice(&(version.len() as u32).to_le_bytes());
        root.extend_from_slice(version);
        root.extend_from_slice(&0u16.to_le_bytes()); // flags
        root.extend_from_slice(&2u16.to_le_bytes()); // stream count

        // Header sizes: "#~\0\0" -> 12 bytes, "#Strings\0\0\0\0" -> 20 bytes.
        let headers_end = root.len() + 12 + 20;
        root.extend_from_slice(&(headers_end as u32).to_le_bytes());
        root.extend_from_slice(&(tables_stream.len() as u32).to_le_bytes());
        root.extend_from_slice(b"#~\0\0");
        root.extend_from_slice(&((headers_end + tables_stream.len()) as u32).to_le_bytes());
        root.extend_from_slice(&(strings_stream.len() as u32).to_le_bytes());
        root.extend_from_slice(b"#Strings\0\0\0\0");

        root.extend_from_slice(&tables_stream);
        root.extend_from_slice(strings_stream);
        root
    }

    #[test]
    fn metadata_root_streams_found() {
        let root = minimal_root();
        let streams = parse_metadata_root(&root).unwrap();
        assert_eq!(streams.tables.len(), 24);
        assert_eq!(streams.strings, b"\0test\0\0\0");
        assert!(streams.pdb.is_none());
    }

    #[test]
    fn missing_tables_stream_is_an_error() {
        let mut root = minimal_root();
        // Corrupt the "#~" name so the stream is not recognized.
        let pos = root.windows(2).position(|w| w == b"#~").unwrap();
        root[pos] = b'#';
        root[pos + 1] = b'x';

        assert!(matches!(
            parse_metadata_root(&root),
            Err(MetadataError::MissingStream("#~"))
        ));
    }

    #[test]
    fn pdb_stream_row_counts() {
        let mut stream = vec![0u8; 20]; // pdb id
        stream.extend_from_slice(&0u32.to_le_bytes()); // entry point
        let referenced: u64 = (1 << 0x06) | (1 << 0x02);
        stream.extend_from_slice(&referenced.to_le_bytes());
        stream.extend_from_slice(&7u32.to_le_bytes()); // TypeDef (lower bit first)
        stream.extend_from_slice(&42u32.to_le_bytes()); // MethodDef

        let counts = parse_pdb_stream(&stream).unwrap();
        assert_eq!(counts[0x02], 7);
        assert_eq!(counts[0x06], 42);
        assert_eq!(counts[0x00], 0);
    }
}
