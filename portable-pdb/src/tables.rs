// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Physical layout of the `#~` tables stream.
//!
//! Row sizes depend on which tables are present, how many rows each has,
//! and the heap-size flags, so every table's column schema is declared and
//! sizes are computed generically. Portable PDB files carry their own
//! tables (0x30..0x37) whose columns may reference type-system tables; the
//! row counts for those come from the `#Pdb` stream.

use crate::heaps::Cursor;
use crate::{MetadataError, Result};

pub const TABLE_COUNT: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0a,
    Constant = 0x0b,
    CustomAttribute = 0x0c,
    FieldMarshal = 0x0d,
    DeclSecurity = 0x0e,
    ClassLayout = 0x0f,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1a,
    TypeSpec = 0x1b,
    ImplMap = 0x1c,
    FieldRva = 0x1d,
    EncLog = 0x1e,
    EncMap = 0x1f,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2a,
    MethodSpec = 0x2b,
    GenericParamConstraint = 0x2c,
    Document = 0x30,
    MethodDebugInformation = 0x31,
    LocalScope = 0x32,
    LocalVariable = 0x33,
    LocalConstant = 0x34,
    ImportScope = 0x35,
    StateMachineMethod = 0x36,
    CustomDebugInformation = 0x37,
}

/// Coded-index families (ECMA-335 II.24.2.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coded {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
    HasCustomDebugInformation,
}

impl Coded {
    pub fn tag_bits(self) -> u32 {
        match self {
            Coded::TypeDefOrRef => 2,
            Coded::HasConstant => 2,
            Coded::HasCustomAttribute => 5,
            Coded::HasFieldMarshal => 1,
            Coded::HasDeclSecurity => 2,
            Coded::MemberRefParent => 3,
            Coded::HasSemantics => 1,
            Coded::MethodDefOrRef => 1,
            Coded::MemberForwarded => 1,
            Coded::Implementation => 2,
            Coded::CustomAttributeType => 3,
            Coded::ResolutionScope => 2,
            Coded::TypeOrMethodDef => 1,
            Coded::HasCustomDebugInformation => 5,
        }
    }

    /// Member tables in tag order. `None` marks an unused tag value.
    pub fn members(self) -> &'static [Option<TableId>] {
        use TableId::*;

        match self {
            Coded::TypeDefOrRef => &[Some(TypeDef), Some(TypeRef), Some(TypeSpec)],
            Coded::HasConstant => &[Some(Field), Some(Param), Some(Property)],
            Coded::HasCustomAttribute => &[
                Some(MethodDef),
                Some(Field),
                Some(TypeRef),
                Some(TypeDef),
                Some(Param),
                Some(InterfaceImpl),
                Some(MemberRef),
                Some(Module),
                Some(DeclSecurity),
                Some(Property),
                Some(Event),
                Some(StandAloneSig),
                Some(ModuleRef),
                Some(TypeSpec),
                Some(Assembly),
                Some(AssemblyRef),
                Some(File),
                Some(ExportedType),
                Some(ManifestResource),
                Some(GenericParam),
                Some(GenericParamConstraint),
                Some(MethodSpec),
            ],
            Coded::HasFieldMarshal => &[Some(Field), Some(Param)],
            Coded::HasDeclSecurity => &[Some(TypeDef), Some(MethodDef), Some(Assembly)],
            Coded::MemberRefParent => &[
                Some(TypeDef),
                Some(TypeRef),
                Some(ModuleRef),
                Some(MethodDef),
                Some(TypeSpec),
            ],
            Coded::HasSemantics => &[Some(Event), Some(Property)],
            Coded::MethodDefOrRef => &[Some(MethodDef), Some(MemberRef)],
            Coded::MemberForwarded => &[Some(Field), Some(MethodDef)],
            Coded::Implementation => &[Some(File), Some(AssemblyRef), Some(ExportedType)],
            Coded::CustomAttributeType => &[
                None,
                None,
                Some(MethodDef),
                Some(MemberRef),
                None,
            ],
            Coded::ResolutionScope => &[
                Some(Module),
                Some(ModuleRef),
                Some(AssemblyRef),
                Some(TypeRef),
            ],
            Coded::TypeOrMethodDef => &[Some(TypeDef), Some(MethodDef)],
            Coded::HasCustomDebugInformation => &[
                Some(MethodDef),
                Some(Field),
                Some(TypeRef),
                Some(TypeDef),
                Some(Param),
                Some(InterfaceImpl),
                Some(MemberRef),
                Some(Module),
                Some(DeclSecurity),
                Some(Property),
                Some(Event),
                Some(StandAloneSig),
                Some(ModuleRef),
                Some(TypeSpec),
                Some(Assembly),
                Some(AssemblyRef),
                Some(File),
                Some(ExportedType),
                Some(ManifestResource),
                Some(GenericParam),
                Some(GenericParamConstraint),
                Some(MethodSpec),
                Some(Document),
                Some(LocalScope),
                Some(LocalVariable),
                Some(LocalConstant),
                Some(ImportScope),
            ],
        }
    }
}

/// One column of a table row.
#[derive(Clone, Copy, Debug)]
pub enum Column {
    U8,
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Table(TableId),
    Coded(Coded),
}

/// Column schema per table (ECMA-335 II.22 plus the Portable PDB tables).
pub fn schema(table: TableId) -> &'static [Column] {
    use self::Coded as C;
    use Column::*;
    use TableId as T;

    match table {
        T::Module => &[U16, Str, Guid, Guid, Guid],
        T::TypeRef => &[Coded(C::ResolutionScope), Str, Str],
        T::TypeDef => &[
            U32,
            Str,
            Str,
            Coded(C::TypeDefOrRef),
            Table(T::Field),
            Table(T::MethodDef),
        ],
        T::FieldPtr => &[Table(T::Field)],
        T::Field => &[U16, Str, Blob],
        T::MethodPtr => &[Table(T::MethodDef)],
        T::MethodDef => &[U32, U16, U16, Str, Blob, Table(T::Param)],
        T::ParamPtr => &[Table(T::Param)],
        T::Param => &[U16, U16, Str],
        T::InterfaceImpl => &[Table(T::TypeDef), Coded(C::TypeDefOrRef)],
        T::MemberRef => &[Coded(C::MemberRefParent), Str, Blob],
        T::Constant => &[U8, U8, Coded(C::HasConstant), Blob],
        T::CustomAttribute => &[
            Coded(C::HasCustomAttribute),
            Coded(C::CustomAttributeType),
            Blob,
        ],
        T::FieldMarshal => &[Coded(C::HasFieldMarshal), Blob],
        T::DeclSecurity => &[U16, Coded(C::HasDeclSecurity), Blob],
        T::ClassLayout => &[U16, U32, Table(T::TypeDef)],
        T::FieldLayout => &[U32, Table(T::Field)],
        T::StandAloneSig => &[Blob],
        T::EventMap => &[Table(T::TypeDef), Table(T::Event)],
        T::EventPtr => &[Table(T::Event)],
        T::Event => &[U16, Str, Coded(C::TypeDefOrRef)],
        T::PropertyMap => &[Table(T::TypeDef), Table(T::Property)],
        T::PropertyPtr => &[Table(T::Property)],
        T::Property => &[U16, Str, Blob],
        T::MethodSemantics => &[U16, Table(T::MethodDef), Coded(C::HasSemantics)],
        T::MethodImpl => &[
            Table(T::TypeDef),
            Coded(C::MethodDefOrRef),
            Coded(C::MethodDefOrRef),
        ],
        T::ModuleRef => &[Str],
        T::TypeSpec => &[Blob],
        T::ImplMap => &[
            U16,
            Coded(C::MemberForwarded),
            Str,
            Table(T::ModuleRef),
        ],
        T::FieldRva => &[U32, Table(T::Field)],
        T::EncLog => &[U32, U32],
        T::EncMap => &[U32],
        T::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
        T::AssemblyProcessor => &[U32],
        T::AssemblyOs => &[U32, U32, U32],
        T::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
        T::AssemblyRefProcessor => &[U32, Table(T::AssemblyRef)],
        T::AssemblyRefOs => &[U32, U32, U32, Table(T::AssemblyRef)],
        T::File => &[U32, Str, Blob],
        T::ExportedType => &[U32, U32, Str, Str, Coded(C::Implementation)],
        T::ManifestResource => &[U32, U32, Str, Coded(C::Implementation)],
        T::NestedClass => &[Table(T::TypeDef), Table(T::TypeDef)],
        T::GenericParam => &[U16, U16, Coded(C::TypeOrMethodDef), Str],
        T::MethodSpec => &[Coded(C::MethodDefOrRef), Blob],
        T::GenericParamConstraint => &[Table(T::GenericParam), Coded(C::TypeDefOrRef)],
        T::Document => &[Blob, Guid, Blob, Guid],
        T::MethodDebugInformation => &[Table(T::Document), Blob],
        T::LocalScope => &[
            Table(T::MethodDef),
            Table(T::ImportScope),
            Table(T::LocalVariable),
            Table(T::LocalConstant),
            U32,
            U32,
        ],
        T::LocalVariable => &[U16, U16, Str],
        T::LocalConstant => &[Str, Blob],
        T::ImportScope => &[Table(T::ImportScope), Blob],
        T::StateMachineMethod => &[Table(T::MethodDef), Table(T::MethodDef)],
        T::CustomDebugInformation => &[Coded(C::HasCustomDebugInformation), Guid, Blob],
    }
}

fn table_from_index(index: usize) -> Option<TableId> {
    use TableId::*;

    const ALL: &[TableId] = &[
        Module,
        TypeRef,
        TypeDef,
        FieldPtr,
        Field,
        MethodPtr,
        MethodDef,
        ParamPtr,
        Param,
        InterfaceImpl,
        MemberRef,
        Constant,
        CustomAttribute,
        FieldMarshal,
        DeclSecurity,
        ClassLayout,
        FieldLayout,
        StandAloneSig,
        EventMap,
        EventPtr,
        Event,
        PropertyMap,
        PropertyPtr,
        Property,
        MethodSemantics,
        MethodImpl,
        ModuleRef,
        TypeSpec,
        ImplMap,
        FieldRva,
        EncLog,
        EncMap,
        Assembly,
        AssemblyProcessor,
        AssemblyOs,
        AssemblyRef,
        AssemblyRefProcessor,
        AssemblyRefOs,
        File,
        ExportedType,
        ManifestResource,
        NestedClass,
        GenericParam,
        MethodSpec,
        GenericParamConstraint,
        Document,
        MethodDebugInformation,
        LocalScope,
        LocalVariable,
        LocalConstant,
        ImportScope,
        StateMachineMethod,
        CustomDebugInformation,
    ];

    ALL.iter().copied().find(|&t| t as usize == index)
}

/// A decoded coded-index value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodedValue {
    pub table: Option<TableId>,
    pub row: u32,
}

/// Parsed `#~` stream: row counts, per-table offsets, heap-width flags.
pub struct Tables<'a> {
    rows_data: &'a [u8],
    row_counts: [u32; TABLE_COUNT],
    /// Row counts used only for index-width computation; in Portable PDB
    /// files the `#Pdb` stream supplies counts for referenced type-system
    /// tables that have no local rows.
    width_counts: [u32; TABLE_COUNT],
    table_offsets: [usize; TABLE_COUNT],
    row_sizes: [usize; TABLE_COUNT],
    wide_string: bool,
    wide_guid: bool,
    wide_blob: bool,
}

impl<'a> Tables<'a> {
    /// Parse a `#~` stream. `external_counts` carries the `#Pdb` stream's
    /// referenced-table row counts when parsing Portable PDB metadata.
    pub fn parse(
        stream: &'a [u8],
        external_counts: Option<[u32; TABLE_COUNT]>,
    ) -> Result<Tables<'a>> {
        let mut cursor = Cursor::new(stream);

        cursor.skip(4)?; // reserved
        cursor.skip(2)?; // major/minor version
        let heap_sizes = cursor.read_u8()?;
        cursor.skip(1)?; // reserved
        let valid = cursor.read_u64()?;
        cursor.skip(8)?; // sorted bitvector

        let mut row_counts = [0u32; TABLE_COUNT];
        for (index, count) in row_counts.iter_mut().enumerate() {
            if valid & (1u64 << index) != 0 {
                *count = cursor.read_u32()?;
            }
        }

        let mut width_counts = row_counts;
        if let Some(external) = external_counts {
            for (width, ext) in width_counts.iter_mut().zip(external.iter()) {
                *width = (*width).max(*ext);
            }
        }

        let wide_string = heap_sizes & 0x01 != 0;
        let wide_guid = heap_sizes & 0x02 != 0;
        let wide_blob = heap_sizes & 0x04 != 0;

        let mut tables = Tables {
            rows_data: &[],
            row_counts,
            width_counts,
            table_offsets: [0; TABLE_COUNT],
            row_sizes: [0; TABLE_COUNT],
            wide_string,
            wide_guid,
            wide_blob,
        };

        let mut offset = 0usize;
        for index in 0..TABLE_COUNT {
            if row_counts[index] == 0 {
                continue;
            }

            let table = table_from_index(index)
                .ok_or(MetadataError::Malformed("unknown metadata table present"))?;

            let row_size = tables.compute_row_size(table);
            tables.table_offsets[index] = offset;
            tables.row_sizes[index] = row_size;
            offset += row_size * row_counts[index] as usize;
        }

        let rows_start = cursor.position();
        let rows_end = rows_start
            .checked_add(offset)
            .ok_or(MetadataError::Truncated("#~ rows"))?;

        if rows_end > stream.len() {
            return Err(MetadataError::Truncated("#~ rows"));
        }

        tables.rows_data = &stream[rows_start..rows_end];
        Ok(tables)
    }

    pub fn row_count(&self, table: TableId) -> u32 {
        self.row_counts[table as usize]
    }

    fn index_width(&self, count: u32, limit: u32) -> usize {
        if count < limit {
            2
        } else {
            4
        }
    }

    fn table_index_width(&self, table: TableId) -> usize {
        self.index_width(self.width_counts[table as usize], 1 << 16)
    }

    fn coded_index_width(&self, coded: Coded) -> usize {
        let max_rows = coded
            .members()
            .iter()
            .flatten()
            .map(|&t| self.width_counts[t as usize])
            .max()
            .unwrap_or(0);

        self.index_width(max_rows, 1 << (16 - coded.tag_bits()))
    }

    fn column_width(&self, column: Column) -> usize {
        match column {
            Column::U8 => 1,
            Column::U16 => 2,
            Column::U32 => 4,
            Column::Str => {
                if self.wide_string {
                    4
                } else {
                    2
                }
            }
            Column::Guid => {
                if self.wide_guid {
                    4
                } else {
                    2
                }
            }
            Column::Blob => {
                if self.wide_blob {
                    4
                } else {
                    2
                }
            }
            Column::Table(t) => self.table_index_width(t),
            Column::Coded(c) => self.coded_index_width(c),
        }
    }

    fn compute_row_size(&self, table: TableId) -> usize {
        schema(table).iter().map(|&c| self.column_width(c)).sum()
    }

    /// Cursor positioned at 1-based `row` of `table`.
    pub fn row(&self, table: TableId, row: u32) -> Result<RowReader<'a, '_>> {
        let count = self.row_counts[table as usize];
        if row == 0 || row > count {
            return Err(MetadataError::RowOutOfRange { table, row });
        }

        let row_size = self.row_sizes[table as usize];
        let start = self.table_offsets[table as usize] + row_size * (row as usize - 1);
        let data = self
            .rows_data
            .get(start..start + row_size)
            .ok_or(MetadataError::Truncated("table row"))?;

        Ok(RowReader {
            tables: self,
            cursor: Cursor::new(data),
        })
    }
}

/// Reads one row's columns in schema order.
pub struct RowReader<'a, 't> {
    tables: &'t Tables<'a>,
    cursor: Cursor<'a>,
}

impl<'a, 't> RowReader<'a, 't> {
    pub fn read_u8(&mut self) -> Result<u8> {
        self.cursor.read_u8()
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.cursor.read_u16()
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.cursor.read_u32()
    }

    fn read_index(&mut self, width: usize) -> Result<u32> {
        if width == 2 {
            Ok(u32::from(self.cursor.read_u16()?))
        } else {
            self.cursor.read_u32()
        }
    }

    pub fn read_string_index(&mut self) -> Result<u32> {
        let width = if self.tables.wide_string { 4 } else { 2 };
        self.read_index(width)
    }

    pub fn read_guid_index(&mut self) -> Result<u32> {
        let width = if self.tables.wide_guid { 4 } else { 2 };
        self.read_index(width)
    }

    pub fn read_blob_index(&mut self) -> Result<u32> {
        let width = if self.tables.wide_blob { 4 } else { 2 };
        self.read_index(width)
    }

    pub fn read_table_index(&mut self, table: TableId) -> Result<u32> {
        let width = self.tables.table_index_width(table);
        self.read_index(width)
    }

    pub fn read_coded_index(&mut self, coded: Coded) -> Result<CodedValue> {
        let width = self.tables.coded_index_width(coded);
        let raw = self.read_index(width)?;

        let tag_bits = coded.tag_bits();
        let tag = (raw & ((1 << tag_bits) - 1)) as usize;
        let row = raw >> tag_bits;

        let table = coded.members().get(tag).copied().flatten();
        Ok(CodedValue { table, row })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Build a minimal `#~` stream: header, row counts, raw row bytes.
    fn tables_stream(counts: &[(TableId, u32)], rows: &[u8]) -> Vec<u8> {
        let mut valid = 0u64;
        for &(table, _) in counts {
            valid |= 1 << (table as usize);
        }

        let mut stream = vec![0, 0, 0, 0, 2, 0, 0x00, 1];
        stream.extend_from_slice(&valid.to_le_bytes());
        stream.extend_from_slice(&0u64.to_le_bytes());

        let mut ordered: Vec<_> = counts.to_vec();
        ordered.sort_by_key(|&(t, _)| t as usize);
        for &(_, count) in &ordered {
            stream.extend_from_slice(&count.to_le_bytes());
        }

        stream.extend_from_slice(rows);
        stream
    }

    #[test]
    fn narrow_indices_for_small_tables() {
        // One Field row: flags u16, name str16, sig blob16 -> 6 bytes.
        let rows = [0x16, 0x00, 0x01, 0x00, 0x02, 0x00];
        let stream = tables_stream(&[(TableId::Field, 1)], &rows);
        let tables = Tables::parse(&stream, None).unwrap();

        assert_eq!(tables.row_count(TableId::Field), 1);

        let mut row = tables.row(TableId::Field, 1).unwrap();
        assert_eq!(row.read_u16().unwrap(), 0x16);
        assert_eq!(row.read_string_index().unwrap(), 1);
        assert_eq!(row.read_blob_index().unwrap(), 2);
    }

    #[test]
    fn coded_index_decodes_tag_and_row() {
        // One Constant row: type u8, pad u8, HasConstant coded16, value blob16.
        // HasConstant tag 0 = Field, so raw 0x04 = row 1 of Field.
        let rows = [0x08, 0x00, 0x04, 0x00, 0x01, 0x00];
        let stream = tables_stream(&[(TableId::Constant, 1)], &rows);
        let tables = Tables::parse(&stream, None).unwrap();

        let mut row = tables.row(TableId::Constant, 1).unwrap();
        assert_eq!(row.read_u8().unwrap(), 0x08);
        assert_eq!(row.read_u8().unwrap(), 0x00);

        let parent = row.read_coded_index(Coded::HasConstant).unwrap();
        assert_eq!(parent.table, Some(TableId::Field));
        assert_eq!(parent.row, 1);
    }

    #[test]
    fn external_counts_widen_referenced_tables() {
        // LocalScope references MethodDef; with 0x20000 external MethodDef
        // rows the method column must be 4 bytes wide.
        let mut external = [0u32; TABLE_COUNT];
        external[TableId::MethodDef as usize] = 0x2_0000;

        // method u32, import_scope u16, variable_list u16, constant_list
        // u16, start u32, length u32 -> 18 bytes.
        let rows = [
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
        ];
        let stream = tables_stream(&[(TableId::LocalScope, 1)], &rows);
        let tables = Tables::parse(&stream, Some(external)).unwrap();

        let mut row = tables.row(TableId::LocalScope, 1).unwrap();
        assert_eq!(row.read_table_index(TableId::MethodDef).unwrap(), 1);
        assert_eq!(row.read_table_index(TableId::ImportScope).unwrap(), 0);
        assert_eq!(row.read_table_index(TableId::LocalVariable).unwrap(), 1);
        assert_eq!(row.read_table_index(TableId::LocalConstant).unwrap(), 0);
        assert_eq!(row.read_u32().unwrap(), 0);
        assert_eq!(row.read_u32().unwrap(), 0x10);
    }

    #[test]
    fn out_of_range_row_is_an_error() {
        let stream = tables_stream(&[], &[]);
        let tables = Tables::parse(&stream, None).unwrap();
        assert!(tables.row(TableId::TypeDef, 1).is_err());
    }
}
