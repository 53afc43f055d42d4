// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Decoders for Portable PDB blob formats: sequence points and document
//! names.

use crate::heaps::{blob_at, Cursor};
use crate::Result;

/// One sequence point: IL offset ↔ source range mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencePoint {
    pub il_offset: u32,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    /// Document table row the point belongs to.
    pub document: u32,
    /// Hidden points carry no source position and never host breakpoints.
    pub hidden: bool,
}

/// A row of the Document table with its decoded path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub row: u32,
    pub path: String,
}

/// Decode a `SequencePoints` blob.
///
/// `document_column` is the MethodDebugInformation row's Document value;
/// when nil (0) the blob itself opens with an initial-document record.
pub fn decode_sequence_points(blob: &[u8], document_column: u32) -> Result<Vec<SequencePoint>> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }

    let mut cursor = Cursor::new(blob);

    let _local_signature = cursor.read_compressed_u32()?;
    let mut document = if document_column == 0 {
        cursor.read_compressed_u32()?
    } else {
        document_column
    };

    let mut points = Vec::new();
    let mut il_offset = 0u32;
    let mut start_line = 0u32;
    let mut start_column = 0u32;
    let mut first_record = true;
    let mut saw_non_hidden = false;

    while !cursor.is_empty() {
        let delta_il = cursor.read_compressed_u32()?;

        // A zero IL delta on a non-first record switches documents.
        if !first_record && delta_il == 0 {
            document = cursor.read_compressed_u32()?;
            continue;
        }

        if first_record {
            il_offset = delta_il;
        } else {
            il_offset = il_offset.wrapping_add(delta_il);
        }
        first_record = false;

        let delta_lines = cursor.read_compressed_u32()?;
        let delta_columns: i64 = if delta_lines == 0 {
            i64::from(cursor.read_compressed_u32()?)
        } else {
            i64::from(cursor.read_compressed_i32()?)
        };

        if delta_lines == 0 && delta_columns == 0 {
            points.push(SequencePoint {
                il_offset,
                start_line: 0,
                start_column: 0,
                end_line: 0,
                end_column: 0,
                document,
                hidden: true,
            });
            continue;
        }

        if saw_non_hidden {
            start_line = start_line.wrapping_add(cursor.read_compressed_i32()? as u32);
            start_column = start_column.wrapping_add(cursor.read_compressed_i32()? as u32);
        } else {
            start_line = cursor.read_compressed_u32()?;
            start_column = cursor.read_compressed_u32()?;
        }
        saw_non_hidden = true;

        points.push(SequencePoint {
            il_offset,
            start_line,
            start_column,
            end_line: start_line.wrapping_add(delta_lines),
            end_column: (i64::from(start_column) + delta_columns) as u32,
            document,
            hidden: false,
        });
    }

    Ok(points)
}

/// Decode a Document-name blob: a separator character followed by
/// blob-heap indexes of the path parts.
pub fn decode_document_name(blob_heap: &[u8], name_blob: &[u8]) -> Result<String> {
    let mut cursor = Cursor::new(name_blob);

    let separator_code = cursor.read_compressed_u32()?;
    let separator = char::from_u32(separator_code).unwrap_or('/');

    let mut path = String::new();
    let mut first = true;

    while !cursor.is_empty() {
        let part_index = cursor.read_compressed_u32()?;

        if !first && separator_code != 0 {
            path.push(separator);
        }
        first = false;

        if part_index != 0 {
            let part = blob_at(blob_heap, part_index)?;
            path.push_str(&String::from_utf8_lossy(part));
        }
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sequence_points_with_hidden_and_deltas() {
        // local sig 0; doc known from column; three records:
        //   offset 0:  lines 16..17, cols 5..14
        //   offset 5:  line 18 (delta +2), cols 2..12 (col delta -3)
        //   offset 8:  hidden
        let blob = [
            0x00, 0x00, 0x01, 0x12, 0x10, 0x05, 0x05, 0x00, 0x0a, 0x04, 0x7b, 0x03, 0x00, 0x00,
        ];

        let points = decode_sequence_points(&blob, 1).unwrap();
        assert_eq!(points.len(), 3);

        assert_eq!(points[0].il_offset, 0);
        assert_eq!(points[0].start_line, 16);
        assert_eq!(points[0].end_line, 17);
        assert_eq!(points[0].start_column, 5);
        assert_eq!(points[0].end_column, 14);
        assert!(!points[0].hidden);

        assert_eq!(points[1].il_offset, 5);
        assert_eq!(points[1].start_line, 18);
        assert_eq!(points[1].end_line, 18);
        assert_eq!(points[1].start_column, 2);
        assert_eq!(points[1].end_column, 12);

        assert_eq!(points[2].il_offset, 8);
        assert!(points[2].hidden);
    }

    #[test]
    fn document_switch_record() {
        // local sig 0; doc column nil so initial doc = 1; point at offset
        // 0; then a document-record switching to doc 2; then a point at
        // offset 4.
        let blob = [
            0x00, 0x01, // header
            0x00, 0x01, 0x00, 0x0a, 0x01, // offset 0, lines 10..11, cols 1..1? no: dcols 0
            0x00, 0x02, // document switch to 2
            0x04, 0x01, 0x00, 0x02, 0x7f, // offset +4
        ];

        let points = decode_sequence_points(&blob, 0).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].document, 1);
        assert_eq!(points[0].il_offset, 0);
        assert_eq!(points[1].document, 2);
        assert_eq!(points[1].il_offset, 4);
        assert_eq!(points[1].start_line, 11);
        assert_eq!(points[1].start_column, 0);
    }

    #[test]
    fn empty_blob_yields_no_points() {
        assert!(decode_sequence_points(&[], 1).unwrap().is_empty());
    }

    #[test]
    fn document_name_with_slash_separator() {
        // Heap: parts "home" at 1, "Program.cs" at 6.
        let mut heap = vec![0u8];
        heap.push(4);
        heap.extend_from_slice(b"home");
        heap.push(10);
        heap.extend_from_slice(b"Program.cs");

        // Name blob: separator '/', parts: 0 (empty), 1, 6.
        let name = [b'/', 0x00, 0x01, 0x06];
        let path = decode_document_name(&heap, &name).unwrap();
        assert_eq!(path, "/home/Program.cs");
    }
}
