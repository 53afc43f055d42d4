// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The operations the debug engine asks of metadata: source ↔ IL mapping,
//! local/argument names, field layouts, base-type walks, enum members.
//!
//! All operations are static file reads; no runtime handles are involved.
//! Files are mapped once and cached for the lifetime of the cache.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use elsa::FrozenMap;
use log::debug;
use memmap2::Mmap;

use crate::heaps::{blob_at, string_at};
use crate::pdb::{decode_document_name, decode_sequence_points, Document, SequencePoint};
use crate::pe;
use crate::tables::{Coded, CodedValue, TableId, Tables};
use crate::{MetadataError, Result, FIELD_DEF_TOKEN, METHOD_DEF_TOKEN, TYPE_DEF_TOKEN};

const FIELD_ATTR_STATIC: u16 = 0x0010;
const FIELD_ATTR_LITERAL: u16 = 0x0040;

/// A resolved source location: method token plus IL offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MethodLocation {
    pub method_token: u32,
    pub il_offset: u32,
}

/// A field definition: token plus raw metadata name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub token: u32,
    pub name: String,
}

/// Map a raw metadata name to its display form.
///
/// Compiler infrastructure names (`<>c__DisplayClass...`) are dropped;
/// hoisted locals and backing fields (`<counter>5__2`, `<P>k__BackingField`)
/// surface as the source name; everything else passes through.
pub fn display_name(raw: &str) -> Option<String> {
    if raw.starts_with("<>") {
        return None;
    }

    if let Some(rest) = raw.strip_prefix('<') {
        if let Some(end) = rest.find('>') {
            let inner = &rest[..end];
            if inner.is_empty() {
                return None;
            }
            return Some(inner.to_string());
        }
    }

    Some(raw.to_string())
}

enum PdbBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
    Missing,
}

enum DllBytes {
    /// Mapped PE image from disk.
    Mapped(Mmap),
    /// Bare metadata root, injected by tests.
    #[cfg(test)]
    RawMetadata(Vec<u8>),
}

struct CacheEntry {
    dll: DllBytes,
    pdb: PdbBytes,
}

impl CacheEntry {
    fn dll_metadata(&self, dll_path: &Path) -> Result<&[u8]> {
        match &self.dll {
            DllBytes::Mapped(map) => pe::metadata_slice(dll_path, map),
            #[cfg(test)]
            DllBytes::RawMetadata(bytes) => Ok(bytes),
        }
    }
}

/// Per-path cache of mapped assemblies and their PDB data.
#[derive(Default)]
pub struct MetadataCache {
    entries: FrozenMap<String, Box<CacheEntry>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, dll_path: &Path) -> Result<&CacheEntry> {
        let key = dll_path.to_string_lossy().into_owned();

        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry);
        }

        let io_err = |source| MetadataError::Io {
            path: dll_path.to_path_buf(),
            source,
        };

        let file = File::open(dll_path).map_err(io_err)?;
        let dll = unsafe { Mmap::map(&file) }.map_err(io_err)?;

        let pdb = Self::load_pdb(dll_path, &dll)?;

        Ok(self.entries.insert(
            key,
            Box::new(CacheEntry {
                dll: DllBytes::Mapped(dll),
                pdb,
            }),
        ))
    }

    /// Seed the cache with bare metadata, bypassing the PE layer.
    #[cfg(test)]
    pub(crate) fn insert_synthetic(
        &self,
        dll_path: &str,
        dll_metadata: Vec<u8>,
        pdb_metadata: Option<Vec<u8>>,
    ) {
        let pdb = match pdb_metadata {
            Some(bytes) => PdbBytes::Owned(bytes),
            None => PdbBytes::Missing,
        };

        self.entries.insert(
            dll_path.to_string(),
            Box::new(CacheEntry {
                dll: DllBytes::RawMetadata(dll_metadata),
                pdb,
            }),
        );
    }

    fn load_pdb(dll_path: &Path, dll_data: &[u8]) -> Result<PdbBytes> {
        let adjacent = dll_path.with_extension("pdb");
        if adjacent.is_file() {
            let file = File::open(&adjacent).map_err(|source| MetadataError::Io {
                path: adjacent.clone(),
                source,
            })?;
            let map = unsafe { Mmap::map(&file) }.map_err(|source| MetadataError::Io {
                path: adjacent.clone(),
                source,
            })?;

            debug!("using adjacent pdb {}", adjacent.display());
            return Ok(PdbBytes::Mapped(map));
        }

        if let Some(embedded) = pe::embedded_pdb(dll_path, dll_data)? {
            return Ok(PdbBytes::Owned(embedded));
        }

        Ok(PdbBytes::Missing)
    }

    fn dll_view<'a>(&self, entry: &'a CacheEntry, dll_path: &Path) -> Result<View<'a>> {
        let root = entry.dll_metadata(dll_path)?;
        View::from_metadata(root)
    }

    fn pdb_view<'a>(&self, entry: &'a CacheEntry, dll_path: &Path) -> Result<View<'a>> {
        let bytes: &'a [u8] = match &entry.pdb {
            PdbBytes::Mapped(map) => map,
            PdbBytes::Owned(vec) => vec,
            PdbBytes::Missing => {
                return Err(MetadataError::PdbNotFound(dll_path.to_path_buf()))
            }
        };

        View::from_metadata(bytes)
    }

    // -- source/IL mapping --------------------------------------------------

    /// First sequence point matching `(source_file, line)`.
    pub fn find_location(
        &self,
        dll_path: &Path,
        source_file: &str,
        line: u32,
    ) -> Result<Option<MethodLocation>> {
        Ok(self
            .find_all_locations(dll_path, source_file, line)?
            .into_iter()
            .next())
    }

    /// Every sequence point matching `(source_file, line)`. Async methods
    /// can map a single source line onto several IL positions.
    pub fn find_all_locations(
        &self,
        dll_path: &Path,
        source_file: &str,
        line: u32,
    ) -> Result<Vec<MethodLocation>> {
        let entry = self.entry(dll_path)?;
        let view = self.pdb_view(entry, dll_path)?;

        let documents = view.documents()?;
        let matching_docs: Vec<u32> = documents
            .iter()
            .filter(|d| document_matches(&d.path, source_file))
            .map(|d| d.row)
            .collect();

        if matching_docs.is_empty() {
            return Ok(Vec::new());
        }

        let mut locations = Vec::new();
        let method_count = view.tables.row_count(TableId::MethodDebugInformation);

        for row in 1..=method_count {
            for point in view.sequence_points(row)? {
                if point.hidden
                    || point.start_line != line
                    || !matching_docs.contains(&point.document)
                {
                    continue;
                }

                locations.push(MethodLocation {
                    method_token: METHOD_DEF_TOKEN | row,
                    il_offset: point.il_offset,
                });
            }
        }

        Ok(locations)
    }

    /// Map `(method_token, il_offset)` back to source. Exact sequence
    /// point preferred, nearest predecessor otherwise.
    pub fn reverse_lookup(
        &self,
        dll_path: &Path,
        method_token: u32,
        il_offset: u32,
    ) -> Result<Option<(String, u32)>> {
        let entry = self.entry(dll_path)?;
        let view = self.pdb_view(entry, dll_path)?;

        let row = method_token & 0x00ff_ffff;
        if row == 0 || row > view.tables.row_count(TableId::MethodDebugInformation) {
            return Ok(None);
        }

        let points = view.sequence_points(row)?;

        let best = points
            .iter()
            .filter(|p| !p.hidden)
            .find(|p| p.il_offset == il_offset)
            .or_else(|| {
                points
                    .iter()
                    .filter(|p| !p.hidden && p.il_offset <= il_offset)
                    .last()
            });

        let Some(point) = best else {
            return Ok(None);
        };

        let path = view.document_path(point.document)?;
        Ok(Some((path, point.start_line)))
    }

    /// All sequence points of a method, in IL order; used to compute the
    /// step ranges covering the current source line.
    pub fn sequence_points(&self, dll_path: &Path, method_token: u32) -> Result<Vec<SequencePoint>> {
        let entry = self.entry(dll_path)?;
        let view = self.pdb_view(entry, dll_path)?;

        let row = method_token & 0x00ff_ffff;
        if row == 0 || row > view.tables.row_count(TableId::MethodDebugInformation) {
            return Ok(Vec::new());
        }

        view.sequence_points(row)
    }

    // -- names --------------------------------------------------------------

    /// Local-slot → display-name map from the PDB local scopes. Hoisted
    /// names are unwrapped; compiler-internal slots are absent.
    pub fn get_local_names(
        &self,
        dll_path: &Path,
        method_token: u32,
    ) -> Result<BTreeMap<u32, String>> {
        let entry = self.entry(dll_path)?;
        let view = self.pdb_view(entry, dll_path)?;

        let method_row = method_token & 0x00ff_ffff;
        let scope_count = view.tables.row_count(TableId::LocalScope);
        let variable_count = view.tables.row_count(TableId::LocalVariable);

        let mut names = BTreeMap::new();

        for scope_row in 1..=scope_count {
            let scope = view.local_scope(scope_row)?;
            if scope.method != method_row {
                continue;
            }

            let variables_end = if scope_row < scope_count {
                view.local_scope(scope_row + 1)?.variable_list
            } else {
                variable_count + 1
            };

            for variable_row in scope.variable_list..variables_end {
                let (slot, raw_name) = view.local_variable(variable_row)?;
                if let Some(name) = display_name(&raw_name) {
                    names.entry(u32::from(slot)).or_insert(name);
                }
            }
        }

        Ok(names)
    }

    /// Argument-sequence → name map from the Param table. Sequence numbers
    /// are 1-based; 0 names the return value and is skipped.
    pub fn get_argument_names(
        &self,
        dll_path: &Path,
        method_token: u32,
    ) -> Result<BTreeMap<u32, String>> {
        let entry = self.entry(dll_path)?;
        let view = self.dll_view(entry, dll_path)?;

        let method_row = method_token & 0x00ff_ffff;
        let method_count = view.tables.row_count(TableId::MethodDef);
        if method_row == 0 || method_row > method_count {
            return Ok(BTreeMap::new());
        }

        let param_start = view.method_def(method_row)?.param_list;
        let param_end = if method_row < method_count {
            view.method_def(method_row + 1)?.param_list
        } else {
            view.tables.row_count(TableId::Param) + 1
        };

        let mut names = BTreeMap::new();
        for param_row in param_start..param_end {
            let (sequence, name) = view.param(param_row)?;
            if sequence > 0 && !name.is_empty() {
                names.insert(u32::from(sequence), name);
            }
        }

        Ok(names)
    }

    // -- types and fields ---------------------------------------------------

    /// Instance (non-static) fields of a type definition, raw names.
    pub fn read_instance_fields(
        &self,
        dll_path: &Path,
        typedef_token: u32,
    ) -> Result<Vec<FieldInfo>> {
        self.read_fields(dll_path, typedef_token, false)
    }

    /// Static fields of a type definition, excluding `value__` and
    /// compiler-internal names.
    pub fn read_static_fields(
        &self,
        dll_path: &Path,
        typedef_token: u32,
    ) -> Result<Vec<FieldInfo>> {
        Ok(self
            .read_fields(dll_path, typedef_token, true)?
            .into_iter()
            .filter(|f| f.name != "value__" && !f.name.starts_with("<>"))
            .collect())
    }

    fn read_fields(
        &self,
        dll_path: &Path,
        typedef_token: u32,
        want_static: bool,
    ) -> Result<Vec<FieldInfo>> {
        let entry = self.entry(dll_path)?;
        let view = self.dll_view(entry, dll_path)?;

        let type_row = typedef_token & 0x00ff_ffff;
        let (field_start, field_end) = view.field_range(type_row)?;

        let mut fields = Vec::new();
        for field_row in field_start..field_end {
            let field = view.field(field_row)?;
            let is_static = field.flags & FIELD_ATTR_STATIC != 0;

            if is_static == want_static {
                fields.push(FieldInfo {
                    token: FIELD_DEF_TOKEN | field_row,
                    name: field.name,
                });
            }
        }

        Ok(fields)
    }

    /// Namespace-qualified type name.
    pub fn get_type_name(&self, dll_path: &Path, typedef_token: u32) -> Result<String> {
        let entry = self.entry(dll_path)?;
        let view = self.dll_view(entry, dll_path)?;

        let row = view.type_def(typedef_token & 0x00ff_ffff)?;
        if row.namespace.is_empty() {
            Ok(row.name)
        } else {
            Ok(format!("{}.{}", row.namespace, row.name))
        }
    }

    /// Base type of a typedef, as a typedef token in the *same* assembly.
    /// Returns 0 for `System.Object`, for cross-assembly bases, and for
    /// interfaces without an extends row.
    pub fn get_base_type_token(&self, dll_path: &Path, typedef_token: u32) -> Result<u32> {
        let entry = self.entry(dll_path)?;
        let view = self.dll_view(entry, dll_path)?;

        let row = view.type_def(typedef_token & 0x00ff_ffff)?;

        match row.extends {
            CodedValue {
                table: Some(TableId::TypeDef),
                row: base_row,
            } if base_row != 0 => {
                let base = view.type_def(base_row)?;
                if base.namespace == "System" && base.name == "Object" {
                    Ok(0)
                } else {
                    Ok(TYPE_DEF_TOKEN | base_row)
                }
            }
            _ => Ok(0),
        }
    }

    /// Whether a typedef derives directly from `System.Enum`, whether the
    /// base lives in this assembly or behind an assembly reference.
    pub fn is_enum_type(&self, dll_path: &Path, typedef_token: u32) -> Result<bool> {
        let entry = self.entry(dll_path)?;
        let view = self.dll_view(entry, dll_path)?;

        let row = view.type_def(typedef_token & 0x00ff_ffff)?;

        match row.extends {
            CodedValue {
                table: Some(TableId::TypeRef),
                row: ref_row,
            } if ref_row != 0 => {
                let (namespace, name) = view.type_ref(ref_row)?;
                Ok(namespace == "System" && name == "Enum")
            }
            CodedValue {
                table: Some(TableId::TypeDef),
                row: def_row,
            } if def_row != 0 => {
                let base = view.type_def(def_row)?;
                Ok(base.namespace == "System" && base.name == "Enum")
            }
            _ => Ok(false),
        }
    }

    /// Enum members: type name plus constant-value → member-name map,
    /// decoded from each static field's default-value blob.
    pub fn get_enum_members(
        &self,
        dll_path: &Path,
        typedef_token: u32,
    ) -> Result<(String, BTreeMap<i64, String>)> {
        let entry = self.entry(dll_path)?;
        let view = self.dll_view(entry, dll_path)?;

        let type_name = self.get_type_name(dll_path, typedef_token)?;

        let type_row = typedef_token & 0x00ff_ffff;
        let (field_start, field_end) = view.field_range(type_row)?;

        let mut members = BTreeMap::new();
        for field_row in field_start..field_end {
            let field = view.field(field_row)?;

            let is_member = field.flags & FIELD_ATTR_STATIC != 0
                && field.flags & FIELD_ATTR_LITERAL != 0
                && field.name != "value__"
                && !field.name.starts_with("<>");
            if !is_member {
                continue;
            }

            if let Some(value) = view.constant_for_field(field_row)? {
                members.entry(value).or_insert(field.name);
            }
        }

        Ok((type_name, members))
    }

    /// Declaring type of a method, from the TypeDef method-list ranges.
    pub fn find_method_type(&self, dll_path: &Path, method_token: u32) -> Result<Option<u32>> {
        let entry = self.entry(dll_path)?;
        let view = self.dll_view(entry, dll_path)?;

        let method_row = method_token & 0x00ff_ffff;
        let type_count = view.tables.row_count(TableId::TypeDef);
        let method_count = view.tables.row_count(TableId::MethodDef);

        for type_row in 1..=type_count {
            let start = view.type_def(type_row)?.method_list;
            let end = if type_row < type_count {
                view.type_def(type_row + 1)?.method_list
            } else {
                method_count + 1
            };

            if (start..end).contains(&method_row) {
                return Ok(Some(TYPE_DEF_TOKEN | type_row));
            }
        }

        Ok(None)
    }

    /// Human-readable method name, qualified by its declaring type when
    /// one is found: `Namespace.Type.Method`.
    pub fn get_method_display(&self, dll_path: &Path, method_token: u32) -> Result<String> {
        let entry = self.entry(dll_path)?;
        let view = self.dll_view(entry, dll_path)?;

        let method_row = method_token & 0x00ff_ffff;
        if method_row == 0 || method_row > view.tables.row_count(TableId::MethodDef) {
            return Ok(format!("0x{method_token:08x}"));
        }

        let name = view.method_def(method_row)?.name;

        match self.find_method_type(dll_path, method_token)? {
            Some(type_token) => {
                let type_name = self.get_type_name(dll_path, type_token)?;
                Ok(format!("{type_name}.{name}"))
            }
            None => Ok(name),
        }
    }

    /// Whether a method definition is static (no `this` argument slot).
    pub fn method_is_static(&self, dll_path: &Path, method_token: u32) -> Result<bool> {
        const METHOD_ATTR_STATIC: u16 = 0x0010;

        let entry = self.entry(dll_path)?;
        let view = self.dll_view(entry, dll_path)?;

        let method_row = method_token & 0x00ff_ffff;
        if method_row == 0 || method_row > view.tables.row_count(TableId::MethodDef) {
            return Ok(false);
        }

        Ok(view.method_def(method_row)?.flags & METHOD_ATTR_STATIC != 0)
    }

    /// Find a type definition by simple name (any namespace).
    pub fn find_type_by_name(&self, dll_path: &Path, simple_name: &str) -> Result<Option<u32>> {
        let entry = self.entry(dll_path)?;
        let view = self.dll_view(entry, dll_path)?;

        let type_count = view.tables.row_count(TableId::TypeDef);
        for type_row in 1..=type_count {
            if view.type_def(type_row)?.name == simple_name {
                return Ok(Some(TYPE_DEF_TOKEN | type_row));
            }
        }

        Ok(None)
    }
}

/// A document path matches when it ends with the requested file, or when
/// just the file names agree.
fn document_matches(document_path: &str, requested: &str) -> bool {
    if document_path.ends_with(requested) {
        return true;
    }

    let doc_file = Path::new(document_path).file_name();
    let req_file = Path::new(requested).file_name();

    match (doc_file, req_file) {
        (Some(d), Some(r)) => d == r,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Parsed metadata view
// ---------------------------------------------------------------------------

struct TypeDefRow {
    name: String,
    namespace: String,
    extends: CodedValue,
    field_list: u32,
    method_list: u32,
}

struct MethodDefRow {
    flags: u16,
    name: String,
    param_list: u32,
}

struct FieldRow {
    flags: u16,
    name: String,
}

struct LocalScopeRow {
    method: u32,
    variable_list: u32,
}

pub(crate) struct View<'a> {
    tables: Tables<'a>,
    strings: &'a [u8],
    blob: &'a [u8],
}

impl<'a> View<'a> {
    /// Parse a metadata root (assembly or Portable PDB; the `#Pdb` stream
    /// decides which index widths apply).
    pub(crate) fn from_metadata(root: &'a [u8]) -> Result<View<'a>> {
        let streams = pe::parse_metadata_root(root)?;

        let external_counts = match streams.pdb {
            Some(pdb_stream) => Some(pe::parse_pdb_stream(pdb_stream)?),
            None => None,
        };

        let tables = Tables::parse(streams.tables, external_counts)?;

        Ok(View {
            tables,
            strings: streams.strings,
            blob: streams.blob,
        })
    }

    fn string(&self, index: u32) -> Result<String> {
        Ok(string_at(self.strings, index)?.to_string())
    }

    fn type_def(&self, row: u32) -> Result<TypeDefRow> {
        let mut reader = self.tables.row(TableId::TypeDef, row)?;
        reader.read_u32()?; // flags
        let name = self.string(reader.read_string_index()?)?;
        let namespace = self.string(reader.read_string_index()?)?;
        let extends = reader.read_coded_index(Coded::TypeDefOrRef)?;
        let field_list = reader.read_table_index(TableId::Field)?;
        let method_list = reader.read_table_index(TableId::MethodDef)?;

        Ok(TypeDefRow {
            name,
            namespace,
            extends,
            field_list,
            method_list,
        })
    }

    fn type_ref(&self, row: u32) -> Result<(String, String)> {
        let mut reader = self.tables.row(TableId::TypeRef, row)?;
        reader.read_coded_index(Coded::ResolutionScope)?;
        let name = self.string(reader.read_string_index()?)?;
        let namespace = self.string(reader.read_string_index()?)?;
        Ok((namespace, name))
    }

    fn method_def(&self, row: u32) -> Result<MethodDefRow> {
        let mut reader = self.tables.row(TableId::MethodDef, row)?;
        reader.read_u32()?; // rva
        reader.read_u16()?; // impl flags
        let flags = reader.read_u16()?;
        let name = self.string(reader.read_string_index()?)?;
        reader.read_blob_index()?; // signature
        let param_list = reader.read_table_index(TableId::Param)?;
        Ok(MethodDefRow {
            flags,
            name,
            param_list,
        })
    }

    fn field(&self, row: u32) -> Result<FieldRow> {
        let mut reader = self.tables.row(TableId::Field, row)?;
        let flags = reader.read_u16()?;
        let name = self.string(reader.read_string_index()?)?;
        reader.read_blob_index()?; // signature
        Ok(FieldRow { flags, name })
    }

    fn field_range(&self, type_row: u32) -> Result<(u32, u32)> {
        let type_count = self.tables.row_count(TableId::TypeDef);
        let field_count = self.tables.row_count(TableId::Field);

        let start = self.type_def(type_row)?.field_list;
        let end = if type_row < type_count {
            self.type_def(type_row + 1)?.field_list
        } else {
            field_count + 1
        };

        Ok((start, end))
    }

    fn param(&self, row: u32) -> Result<(u16, String)> {
        let mut reader = self.tables.row(TableId::Param, row)?;
        reader.read_u16()?; // flags
        let sequence = reader.read_u16()?;
        let name = self.string(reader.read_string_index()?)?;
        Ok((sequence, name))
    }

    /// Decode a field's default-value constant into an i64, using the
    /// constant's element-type code.
    fn constant_for_field(&self, field_row: u32) -> Result<Option<i64>> {
        let constant_count = self.tables.row_count(TableId::Constant);

        for constant_row in 1..=constant_count {
            let mut reader = self.tables.row(TableId::Constant, constant_row)?;
            let type_code = reader.read_u8()?;
            reader.read_u8()?; // padding
            let parent = reader.read_coded_index(Coded::HasConstant)?;
            let value_index = reader.read_blob_index()?;

            if parent.table != Some(TableId::Field) || parent.row != field_row {
                continue;
            }

            let bytes = blob_at(self.blob, value_index)?;
            return Ok(Some(decode_constant(type_code, bytes)?));
        }

        Ok(None)
    }

    fn local_scope(&self, row: u32) -> Result<LocalScopeRow> {
        let mut reader = self.tables.row(TableId::LocalScope, row)?;
        let method = reader.read_table_index(TableId::MethodDef)?;
        reader.read_table_index(TableId::ImportScope)?;
        let variable_list = reader.read_table_index(TableId::LocalVariable)?;
        Ok(LocalScopeRow {
            method,
            variable_list,
        })
    }

    fn local_variable(&self, row: u32) -> Result<(u16, String)> {
        let mut reader = self.tables.row(TableId::LocalVariable, row)?;
        reader.read_u16()?; // attributes
        let slot = reader.read_u16()?;
        let name = self.string(reader.read_string_index()?)?;
        Ok((slot, name))
    }

    fn sequence_points(&self, method_row: u32) -> Result<Vec<SequencePoint>> {
        let mut reader = self.tables.row(TableId::MethodDebugInformation, method_row)?;
        let document = reader.read_table_index(TableId::Document)?;
        let points_index = reader.read_blob_index()?;

        if points_index == 0 {
            return Ok(Vec::new());
        }

        let points_blob = blob_at(self.blob, points_index)?;
        decode_sequence_points(points_blob, document)
    }

    fn document_path(&self, row: u32) -> Result<String> {
        let mut reader = self.tables.row(TableId::Document, row)?;
        let name_index = reader.read_blob_index()?;
        let name_blob = blob_at(self.blob, name_index)?;
        decode_document_name(self.blob, name_blob)
    }

    fn documents(&self) -> Result<Vec<Document>> {
        let count = self.tables.row_count(TableId::Document);
        let mut documents = Vec::with_capacity(count as usize);

        for row in 1..=count {
            documents.push(Document {
                row,
                path: self.document_path(row)?,
            });
        }

        Ok(documents)
    }
}

/// Decode a constant blob by its element-type code. Only the integral
/// codes enums can use are supported.
fn decode_constant(type_code: u8, bytes: &[u8]) -> Result<i64> {
    let err = || MetadataError::Malformed("constant blob");

    let value = match type_code {
        0x02 | 0x05 => i64::from(*bytes.first().ok_or_else(err)?), // bool, u8
        0x04 => i64::from(*bytes.first().ok_or_else(err)? as i8),  // i8
        0x03 | 0x07 => {
            // char, u16
            let b: [u8; 2] = bytes.try_into().map_err(|_| err())?;
            i64::from(u16::from_le_bytes(b))
        }
        0x06 => {
            let b: [u8; 2] = bytes.try_into().map_err(|_| err())?;
            i64::from(i16::from_le_bytes(b))
        }
        0x08 => {
            let b: [u8; 4] = bytes.try_into().map_err(|_| err())?;
            i64::from(i32::from_le_bytes(b))
        }
        0x09 => {
            let b: [u8; 4] = bytes.try_into().map_err(|_| err())?;
            i64::from(u32::from_le_bytes(b))
        }
        0x0a => {
            let b: [u8; 8] = bytes.try_into().map_err(|_| err())?;
            i64::from_le_bytes(b)
        }
        0x0b => {
            let b: [u8; 8] = bytes.try_into().map_err(|_| err())?;
            u64::from_le_bytes(b) as i64
        }
        _ => return Err(err()),
    };

    Ok(value)
}
