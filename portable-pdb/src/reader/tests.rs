// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Reader tests over hand-built metadata. The builder emits narrow (2-byte)
//! indexes only, which holds for any table under 64k rows.

use std::path::Path;

use pretty_assertions::assert_eq;

use super::{display_name, MetadataCache};
use crate::tables::TableId;
use crate::{FIELD_DEF_TOKEN, METHOD_DEF_TOKEN, TYPE_DEF_TOKEN};

const METADATA_SIGNATURE: u32 = 0x424a_5342;

#[derive(Default)]
struct MetadataBuilder {
    strings: Vec<u8>,
    blob: Vec<u8>,
    tables: Vec<(TableId, Vec<u8>, u32)>,
    pdb_referenced: Vec<(TableId, u32)>,
    emit_pdb_stream: bool,
}

impl MetadataBuilder {
    fn new() -> Self {
        Self {
            strings: vec![0],
            blob: vec![0],
            ..Self::default()
        }
    }

    fn string(&mut self, value: &str) -> u16 {
        let index = self.strings.len() as u16;
        self.strings.extend_from_slice(value.as_bytes());
        self.strings.push(0);
        index
    }

    fn blob(&mut self, value: &[u8]) -> u16 {
        assert!(value.len() < 0x80);
        let index = self.blob.len() as u16;
        self.blob.push(value.len() as u8);
        self.blob.extend_from_slice(value);
        index
    }

    fn row(&mut self, table: TableId, bytes: &[u8]) {
        match self.tables.iter_mut().find(|(t, _, _)| *t == table) {
            Some((_, data, count)) => {
                data.extend_from_slice(bytes);
                *count += 1;
            }
            None => self.tables.push((table, bytes.to_vec(), 1)),
        }
    }

    fn pdb_stream(&mut self, referenced: &[(TableId, u32)]) {
        self.emit_pdb_stream = true;
        self.pdb_referenced = referenced.to_vec();
    }

    fn build(&self) -> Vec<u8> {
        let mut tables_stream = Vec::new();
        tables_stream.extend_from_slice(&0u32.to_le_bytes()); // reserved
        tables_stream.push(2); // major
        tables_stream.push(0); // minor
        tables_stream.push(0); // heap sizes: all narrow
        tables_stream.push(1); // reserved

        let mut ordered: Vec<_> = self.tables.iter().collect();
        ordered.sort_by_key(|(t, _, _)| *t as usize);

        let mut valid = 0u64;
        for (table, _, _) in &ordered {
            valid |= 1 << (*table as usize);
        }
        tables_stream.extend_from_slice(&valid.to_le_bytes());
        tables_stream.extend_from_slice(&0u64.to_le_bytes()); // sorted

        for (_, _, count) in &ordered {
            tables_stream.extend_from_slice(&count.to_le_bytes());
        }
        for (_, data, _) in &ordered {
            tables_stream.extend_from_slice(data);
        }

        let mut pdb_stream = Vec::new();
        if self.emit_pdb_stream {
            pdb_stream.extend_from_slice(&[0u8; 20]); // pdb id
            pdb_stream.extend_from_slice(&0u32.to_le_bytes()); // entry point

            let mut referenced = 0u64;
            for (table, _) in &self.pdb_referenced {
                referenced |= 1 << (*table as usize);
            }
            pdb_stream.extend_from_slice(&referenced.to_le_bytes());

            let mut ordered_refs: Vec<_> = self.pdb_referenced.clone();
            ordered_refs.sort_by_key(|(t, _)| *t as usize);
            for (_, count) in &ordered_refs {
                pdb_stream.extend_from_slice(&count.to_le_bytes());
            }
        }

        let mut streams: Vec<(&str, &[u8])> = Vec::new();
        if self.emit_pdb_stream {
            streams.push(("#Pdb", &pdb_stream));
        }
        streams.push(("#~", &tables_stream));
        streams.push(("#Strings", &self.strings));
        streams.push(("#Blob", &self.blob));

        let version = b"PDB v1.0\0\0\0\0";

        let mut root = Vec::new();
        root.extend_from_slice(&METADATA_SIGNATURE.to_le_bytes());
        root.extend_from_slice(&[1, 0, 1, 0]);
        root.extend_from_slice(&0u32.to_le_bytes());
        root.extend_from_slice(&(version.len() as u32).to_le_bytes());
        root.extend_from_slice(version);
        root.extend_from_slice(&0u16.to_le_bytes());
        root.extend_from_slice(&(streams.len() as u16).to_le_bytes());

        let headers_len: usize = streams
            .iter()
            .map(|(name, _)| 8 + (name.len() + 1).next_multiple_of(4))
            .sum();

        let mut offset = root.len() + headers_len;
        for (name, data) in &streams {
            root.extend_from_slice(&(offset as u32).to_le_bytes());
            root.extend_from_slice(&(data.len() as u32).to_le_bytes());
            root.extend_from_slice(name.as_bytes());
            let padded = (name.len() + 1).next_multiple_of(4);
            root.extend(std::iter::repeat(0u8).take(padded - name.len()));
            offset += data.len();
        }

        for (_, data) in &streams {
            root.extend_from_slice(data);
        }

        root
    }
}

fn le16(v: u16) -> [u8; 2] {
    v.to_le_bytes()
}

/// Assembly fixture:
///   TypeRef 1 = System.Enum, TypeRef 2 = System.Object
///   TypeDef 1 = <Module>
///   TypeDef 2 = ConsoleApp.Base     (extends System.Object by ref)
///   TypeDef 3 = ConsoleApp.Derived  (extends Base)
///   TypeDef 4 = ConsoleApp.DayOfWeek (extends System.Enum by ref)
///   Fields: 1 _message (Base), 2 _count, 3 <Items>k__BackingField,
///           4 s_total (Derived), 5 value__, 6 Sunday=0, 7 Monday=1
///   Methods: 1 Main(args), 2 Helper(x, y) — both on Derived
fn assembly_metadata() -> Vec<u8> {
    let mut b = MetadataBuilder::new();

    let s_enum = b.string("Enum");
    let s_object = b.string("Object");
    let s_system = b.string("System");
    let s_module = b.string("<Module>");
    let s_base = b.string("Base");
    let s_derived = b.string("Derived");
    let s_dayofweek = b.string("DayOfWeek");
    let s_consoleapp = b.string("ConsoleApp");
    let s_message = b.string("_message");
    let s_count = b.string("_count");
    let s_items = b.string("<Items>k__BackingField");
    let s_total = b.string("s_total");
    let s_value = b.string("value__");
    let s_sunday = b.string("Sunday");
    let s_monday = b.string("Monday");
    let s_main = b.string("Main");
    let s_helper = b.string("Helper");
    let s_args = b.string("args");
    let s_x = b.string("x");
    let s_y = b.string("y");

    let empty = b.blob(&[]);
    let const_zero = b.blob(&0i32.to_le_bytes());
    let const_one = b.blob(&1i32.to_le_bytes());

    // TypeRef: ResolutionScope coded (AssemblyRef = tag 2), name, namespace.
    let scope = (1 << 2) | 2u16;
    for name in [s_enum, s_object] {
        let mut row = Vec::new();
        row.extend_from_slice(&le16(scope));
        row.extend_from_slice(&le16(name));
        row.extend_from_slice(&le16(s_system));
        b.row(TableId::TypeRef, &row);
    }

    // TypeDef: flags, name, namespace, extends (TypeDefOrRef), field_list,
    // method_list.
    let type_rows: [(u16, u16, u16, u16, u16); 4] = [
        (s_module, 0, 0, 1, 1),
        // Base extends TypeRef 2 (System.Object): tag 1.
        (s_base, s_consoleapp, (2 << 2) | 1, 1, 1),
        // Derived extends TypeDef 2 (Base): tag 0.
        (s_derived, s_consoleapp, 2 << 2, 2, 1),
        // DayOfWeek extends TypeRef 1 (System.Enum): tag 1.
        (s_dayofweek, s_consoleapp, (1 << 2) | 1, 5, 3),
    ];
    for (name, namespace, extends, field_list, method_list) in type_rows {
        let mut row = Vec::new();
        row.extend_from_slice(&0u32.to_le_bytes());
        row.extend_from_slice(&le16(name));
        row.extend_from_slice(&le16(namespace));
        row.extend_from_slice(&le16(extends));
        row.extend_from_slice(&le16(field_list));
        row.extend_from_slice(&le16(method_list));
        b.row(TableId::TypeDef, &row);
    }

    // Field: flags, name, signature.
    const INSTANCE: u16 = 0x0001;
    const ENUM_MEMBER: u16 = 0x8051; // private | static | literal | hasdefault
    const STATIC: u16 = 0x0011;
    let field_rows: [(u16, u16); 7] = [
        (INSTANCE, s_message),
        (INSTANCE, s_count),
        (INSTANCE, s_items),
        (STATIC, s_total),
        (INSTANCE, s_value),
        (ENUM_MEMBER, s_sunday),
        (ENUM_MEMBER, s_monday),
    ];
    for (flags, name) in field_rows {
        let mut row = Vec::new();
        row.extend_from_slice(&le16(flags));
        row.extend_from_slice(&le16(name));
        row.extend_from_slice(&le16(empty));
        b.row(TableId::Field, &row);
    }

    // MethodDef: rva, impl flags, flags, name, signature, param_list.
    // Main is static; Helper is an instance method.
    let method_rows: [(u16, u16, u16); 2] = [(0x0016, s_main, 1), (0x0006, s_helper, 2)];
    for (flags, name, param_list) in method_rows {
        let mut row = Vec::new();
        row.extend_from_slice(&0u32.to_le_bytes());
        row.extend_from_slice(&le16(0));
        row.extend_from_slice(&le16(flags));
        row.extend_from_slice(&le16(name));
        row.extend_from_slice(&le16(empty));
        row.extend_from_slice(&le16(param_list));
        b.row(TableId::MethodDef, &row);
    }

    // Param: flags, sequence, name.
    let param_rows: [(u16, u16); 3] = [(1, s_args), (1, s_x), (2, s_y)];
    for (sequence, name) in param_rows {
        let mut row = Vec::new();
        row.extend_from_slice(&le16(0));
        row.extend_from_slice(&le16(sequence));
        row.extend_from_slice(&le16(name));
        b.row(TableId::Param, &row);
    }

    // Constant: type, pad, parent (HasConstant; Field = tag 0), value.
    let constant_rows: [(u16, u16); 2] = [(6 << 2, const_zero), (7 << 2, const_one)];
    for (parent, value) in constant_rows {
        let mut row = vec![0x08, 0x00]; // ELEMENT_TYPE_I4
        row.extend_from_slice(&le16(parent));
        row.extend_from_slice(&le16(value));
        b.row(TableId::Constant, &row);
    }

    b.build()
}

/// Portable PDB fixture for the assembly above:
///   Document 1 = /home/proj/Program.cs
///   Method 1 sequence points: IL 0 -> line 17, IL 5 -> line 18,
///     IL 8 hidden, IL 12 -> line 21
///   Method 1 locals: slot 0 "counter", slot 1 "<hoisted>5__2",
///     slot 2 "<>u__1"
fn pdb_metadata() -> Vec<u8> {
    let mut b = MetadataBuilder::new();
    b.pdb_stream(&[(TableId::MethodDef, 2)]);

    let s_counter = b.string("counter");
    let s_hoisted = b.string("<hoisted>5__2");
    let s_internal = b.string("<>u__1");

    let p_home = b.blob(b"home");
    let p_proj = b.blob(b"proj");
    let p_file = b.blob(b"Program.cs");
    let doc_name = b.blob(&[
        b'/',
        0x00,
        p_home as u8,
        p_proj as u8,
        p_file as u8,
    ]);

    let points = b.blob(&[
        0x00, // local signature
        0x00, 0x00, 0x09, 0x11, 0x05, // IL 0, line 17
        0x05, 0x00, 0x09, 0x02, 0x00, // IL 5, line 18
        0x03, 0x00, 0x00, // IL 8, hidden
        0x04, 0x00, 0x09, 0x06, 0x00, // IL 12, line 21
    ]);

    // Document: name, hash algorithm, hash, language.
    let mut row = Vec::new();
    row.extend_from_slice(&le16(doc_name));
    row.extend_from_slice(&le16(0));
    row.extend_from_slice(&le16(0));
    row.extend_from_slice(&le16(0));
    b.row(TableId::Document, &row);

    // MethodDebugInformation: document, sequence points.
    let mut row = Vec::new();
    row.extend_from_slice(&le16(1));
    row.extend_from_slice(&le16(points));
    b.row(TableId::MethodDebugInformation, &row);
    let mut row = Vec::new();
    row.extend_from_slice(&le16(0));
    row.extend_from_slice(&le16(0));
    b.row(TableId::MethodDebugInformation, &row);

    // LocalScope: method, import scope, variables, constants, start, length.
    let mut row = Vec::new();
    row.extend_from_slice(&le16(1));
    row.extend_from_slice(&le16(0));
    row.extend_from_slice(&le16(1));
    row.extend_from_slice(&le16(0));
    row.extend_from_slice(&0u32.to_le_bytes());
    row.extend_from_slice(&32u32.to_le_bytes());
    b.row(TableId::LocalScope, &row);

    // LocalVariable: attributes, index, name.
    for (slot, name) in [(0u16, s_counter), (1, s_hoisted), (2, s_internal)] {
        let mut row = Vec::new();
        row.extend_from_slice(&le16(0));
        row.extend_from_slice(&le16(slot));
        row.extend_from_slice(&le16(name));
        b.row(TableId::LocalVariable, &row);
    }

    b.build()
}

fn fixture() -> (MetadataCache, &'static Path) {
    let cache = MetadataCache::new();
    cache.insert_synthetic("/tmp/App.dll", assembly_metadata(), Some(pdb_metadata()));
    (cache, Path::new("/tmp/App.dll"))
}

#[test]
fn find_location_maps_line_to_method_and_offset() {
    let (cache, dll) = fixture();

    let location = cache
        .find_location(dll, "Program.cs", 18)
        .unwrap()
        .expect("line 18 must resolve");

    assert_eq!(location.method_token, METHOD_DEF_TOKEN | 1);
    assert_eq!(location.il_offset, 5);
}

#[test]
fn find_location_matches_full_suffix_paths() {
    let (cache, dll) = fixture();

    let by_suffix = cache
        .find_location(dll, "proj/Program.cs", 17)
        .unwrap()
        .expect("suffix path must resolve");
    assert_eq!(by_suffix.il_offset, 0);

    assert!(cache
        .find_location(dll, "Other.cs", 17)
        .unwrap()
        .is_none());
}

#[test]
fn find_location_misses_unmapped_line() {
    let (cache, dll) = fixture();
    assert!(cache.find_location(dll, "Program.cs", 20).unwrap().is_none());
}

#[test]
fn reverse_lookup_exact_and_nearest_predecessor() {
    let (cache, dll) = fixture();
    let token = METHOD_DEF_TOKEN | 1;

    let (file, line) = cache.reverse_lookup(dll, token, 5).unwrap().unwrap();
    assert_eq!(file, "/home/proj/Program.cs");
    assert_eq!(line, 18);

    // Offset 9 has no exact point; nearest non-hidden predecessor is IL 5.
    let (_, line) = cache.reverse_lookup(dll, token, 9).unwrap().unwrap();
    assert_eq!(line, 18);

    let (_, line) = cache.reverse_lookup(dll, token, 3).unwrap().unwrap();
    assert_eq!(line, 17);
}

#[test]
fn local_names_unwrap_hoisted_and_skip_internal() {
    let (cache, dll) = fixture();

    let names = cache.get_local_names(dll, METHOD_DEF_TOKEN | 1).unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(names[&0], "counter");
    assert_eq!(names[&1], "hoisted");
    assert!(!names.contains_key(&2));
}

#[test]
fn argument_names_by_sequence() {
    let (cache, dll) = fixture();

    let main_args = cache.get_argument_names(dll, METHOD_DEF_TOKEN | 1).unwrap();
    assert_eq!(main_args.len(), 1);
    assert_eq!(main_args[&1], "args");

    let helper_args = cache
        .get_argument_names(dll, METHOD_DEF_TOKEN | 2)
        .unwrap();
    assert_eq!(helper_args[&1], "x");
    assert_eq!(helper_args[&2], "y");
}

#[test]
fn instance_and_static_fields_split() {
    let (cache, dll) = fixture();
    let derived = TYPE_DEF_TOKEN | 3;

    let instance = cache.read_instance_fields(dll, derived).unwrap();
    let names: Vec<&str> = instance.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["_count", "<Items>k__BackingField"]);
    assert_eq!(instance[0].token, FIELD_DEF_TOKEN | 2);

    let statics = cache.read_static_fields(dll, derived).unwrap();
    let names: Vec<&str> = statics.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["s_total"]);
}

#[test]
fn base_type_walk_stops_at_object() {
    let (cache, dll) = fixture();

    let derived = TYPE_DEF_TOKEN | 3;
    let base = cache.get_base_type_token(dll, derived).unwrap();
    assert_eq!(base, TYPE_DEF_TOKEN | 2);

    // Base extends System.Object through a type reference.
    assert_eq!(cache.get_base_type_token(dll, base).unwrap(), 0);
}

#[test]
fn enum_detection_and_members() {
    let (cache, dll) = fixture();
    let day_of_week = TYPE_DEF_TOKEN | 4;

    assert!(cache.is_enum_type(dll, day_of_week).unwrap());
    assert!(!cache.is_enum_type(dll, TYPE_DEF_TOKEN | 3).unwrap());

    let (type_name, members) = cache.get_enum_members(dll, day_of_week).unwrap();
    assert_eq!(type_name, "ConsoleApp.DayOfWeek");
    assert_eq!(members[&0], "Sunday");
    assert_eq!(members[&1], "Monday");
    assert_eq!(members.len(), 2);
}

#[test]
fn type_name_and_lookup_by_simple_name() {
    let (cache, dll) = fixture();

    assert_eq!(
        cache.get_type_name(dll, TYPE_DEF_TOKEN | 3).unwrap(),
        "ConsoleApp.Derived"
    );

    assert_eq!(
        cache.find_type_by_name(dll, "Derived").unwrap(),
        Some(TYPE_DEF_TOKEN | 3)
    );
    assert_eq!(cache.find_type_by_name(dll, "Missing").unwrap(), None);
}

#[test]
fn method_declaring_type() {
    let (cache, dll) = fixture();

    assert_eq!(
        cache.find_method_type(dll, METHOD_DEF_TOKEN | 2).unwrap(),
        Some(TYPE_DEF_TOKEN | 3)
    );
}

#[test]
fn method_display_and_staticness() {
    let (cache, dll) = fixture();

    assert_eq!(
        cache
            .get_method_display(dll, METHOD_DEF_TOKEN | 1)
            .unwrap(),
        "ConsoleApp.Derived.Main"
    );

    assert!(cache.method_is_static(dll, METHOD_DEF_TOKEN | 1).unwrap());
    assert!(!cache.method_is_static(dll, METHOD_DEF_TOKEN | 2).unwrap());
}

#[test]
fn display_name_rules() {
    assert_eq!(display_name("counter"), Some("counter".to_string()));
    assert_eq!(display_name("<counter>5__2"), Some("counter".to_string()));
    assert_eq!(
        display_name("<Items>k__BackingField"),
        Some("Items".to_string())
    );
    assert_eq!(display_name("<>u__1"), None);
    assert_eq!(display_name("<>c__DisplayClass0_0"), None);
}
