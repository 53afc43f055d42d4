// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Recursive rendering of runtime values into `VariableNode` trees:
//! primitives, strings, arrays, objects with inheritance, enums,
//! `Nullable<T>`. Bounded by depth and element caps, defended against
//! cycles by a visited-address set carried down each path. Per-field
//! failures render inline and never propagate.

use std::collections::HashSet;
use std::path::Path;

use cordebug::{Class, CorElementType, ObjectValue, Value};
use portable_pdb::{display_name, MetadataCache};

use crate::events::VariableNode;

pub(crate) const MAX_DEPTH: usize = 3;
pub(crate) const MAX_ARRAY_ELEMENTS: usize = 10;

pub(crate) struct ValueReader<'a> {
    metadata: &'a MetadataCache,
}

impl<'a> ValueReader<'a> {
    pub fn new(metadata: &'a MetadataCache) -> Self {
        Self { metadata }
    }

    pub fn read(&self, name: &str, value: &Value) -> VariableNode {
        let mut visited = HashSet::new();
        self.read_value(name, value, 0, &mut visited)
    }

    fn read_value(
        &self,
        name: &str,
        value: &Value,
        depth: usize,
        visited: &mut HashSet<u64>,
    ) -> VariableNode {
        match self.try_read(name, value, depth, visited) {
            Ok(node) => node,
            Err(err) => VariableNode::leaf(name, "", format!("<error: {err}>")),
        }
    }

    fn try_read(
        &self,
        name: &str,
        value: &Value,
        depth: usize,
        visited: &mut HashSet<u64>,
    ) -> anyhow::Result<VariableNode> {
        if depth > MAX_DEPTH {
            return Ok(VariableNode::leaf(name, "", "<max depth>"));
        }

        let tag = value.get_type()?;

        use CorElementType::*;
        match tag {
            Boolean | Char | I1 | U1 | I2 | U2 | I4 | U4 | I8 | U8 | R4 | R8 => {
                let bytes = value.to_generic()?.read_bytes()?;
                match render_primitive(tag, &bytes) {
                    Some(rendered) => Ok(VariableNode::leaf(name, tag.tag_name(), rendered)),
                    None => Ok(VariableNode::leaf(
                        name,
                        tag.tag_name(),
                        format!("<{}>", tag.tag_name()),
                    )),
                }
            }

            String => self.read_string(name, value),

            SzArray | Array => self.read_array(name, value, depth, visited),

            // In-place struct: no dereference.
            ValueType => {
                let object = value.to_object()?;
                self.read_object(name, &object, depth, visited)
            }

            Class | Object => self.read_reference(name, value, depth, visited),

            other => Ok(VariableNode::leaf(
                name,
                other.tag_name(),
                format!("<{}>", other.tag_name()),
            )),
        }
    }

    fn read_string(&self, name: &str, value: &Value) -> anyhow::Result<VariableNode> {
        // The direct cast works for unboxed strings; otherwise this is a
        // reference that must be dereferenced first.
        if let Ok(string_value) = value.to_string_value() {
            return Ok(VariableNode::leaf(
                name,
                "string",
                quote_string(&string_value.get_string()?),
            ));
        }

        let reference = value.to_reference()?;
        if reference.is_null()? {
            return Ok(VariableNode::leaf(name, "string", "null"));
        }

        let string_value = reference.dereference()?.to_string_value()?;
        Ok(VariableNode::leaf(
            name,
            "string",
            quote_string(&string_value.get_string()?),
        ))
    }

    fn read_array(
        &self,
        name: &str,
        value: &Value,
        depth: usize,
        visited: &mut HashSet<u64>,
    ) -> anyhow::Result<VariableNode> {
        let array = match value.to_array() {
            Ok(array) => array,
            Err(_) => {
                let reference = value.to_reference()?;
                if reference.is_null()? {
                    return Ok(VariableNode::leaf(name, "array", "null"));
                }
                reference.dereference()?.to_array()?
            }
        };

        let count = array.get_count()? as usize;
        let element_type = array.get_element_type()?;

        let mut children = Vec::new();
        for index in 0..count.min(MAX_ARRAY_ELEMENTS) {
            let child_name = format!("[{index}]");
            match array.get_element_at_position(index as u32) {
                Ok(element) => {
                    children.push(self.read_value(&child_name, &element, depth + 1, visited))
                }
                Err(err) => {
                    children.push(VariableNode::leaf(child_name, "", format!("<error: {err}>")))
                }
            }
        }

        Ok(VariableNode {
            name: name.to_string(),
            type_name: format!("{}[]", element_type.tag_name()),
            value: format!("[{count} elements]"),
            children,
        })
    }

    fn read_reference(
        &self,
        name: &str,
        value: &Value,
        depth: usize,
        visited: &mut HashSet<u64>,
    ) -> anyhow::Result<VariableNode> {
        let Ok(reference) = value.to_reference() else {
            // Already dereferenced by the runtime.
            let object = value.to_object()?;
            return self.read_object(name, &object, depth, visited);
        };

        if reference.is_null()? {
            return Ok(VariableNode::leaf(name, "object", "null"));
        }

        let address = reference.get_value()?;
        if visited.contains(&address) {
            return Ok(VariableNode::leaf(name, "object", "<circular>"));
        }

        let inner = reference.dereference()?;

        visited.insert(address);
        let node = match inner.to_object() {
            Ok(object) => self.read_object(name, &object, depth, visited),
            Err(_) => Ok(self.read_value(name, &inner, depth, visited)),
        };
        visited.remove(&address);

        node
    }

    fn read_object(
        &self,
        name: &str,
        object: &ObjectValue,
        depth: usize,
        visited: &mut HashSet<u64>,
    ) -> anyhow::Result<VariableNode> {
        let class = object.get_class()?;
        let token = class.get_token()?;
        let module = class.get_module()?;
        let module_path_string = module.get_name()?;
        let module_path = Path::new(&module_path_string);

        let type_name = self
            .metadata
            .get_type_name(module_path, token)
            .unwrap_or_else(|_| "object".to_string());

        if self.metadata.is_enum_type(module_path, token)? {
            return self.read_enum(name, object, &class, module_path, token, &type_name);
        }

        if simple_name(&type_name).starts_with("Nullable`") {
            return self.read_nullable(name, object, &class, module_path, token, depth, visited);
        }

        let mut children = Vec::new();
        let mut level = token;

        // Field enumeration walks base classes: the runtime requires the
        // *declaring* class handle to read each field.
        while level != 0 {
            let fields = self.metadata.read_instance_fields(module_path, level)?;
            let level_class = module.get_class_from_token(level)?;

            for field in fields {
                let Some(display) = display_name(&field.name) else {
                    continue;
                };

                match object.get_field_value(&level_class, field.token) {
                    Ok(field_value) => {
                        children.push(self.read_value(&display, &field_value, depth + 1, visited));
                    }
                    Err(err) => {
                        children.push(VariableNode::leaf(display, "", format!("<error: {err}>")));
                    }
                }
            }

            level = self.metadata.get_base_type_token(module_path, level)?;
        }

        Ok(VariableNode {
            name: name.to_string(),
            type_name,
            value: format!("{{fields: {}}}", children.len()),
            children,
        })
    }

    fn read_enum(
        &self,
        name: &str,
        object: &ObjectValue,
        class: &Class,
        module_path: &Path,
        token: u32,
        type_name: &str,
    ) -> anyhow::Result<VariableNode> {
        let fields = self.metadata.read_instance_fields(module_path, token)?;
        let value_field = fields
            .iter()
            .find(|f| f.name == "value__")
            .ok_or_else(|| anyhow::anyhow!("enum has no value__ field"))?;

        let raw = object.get_field_value(class, value_field.token)?;
        let bytes = raw.to_generic()?.read_bytes()?;
        let (signed, unsigned) = integer_interpretations(&bytes);

        let (_, members) = self.metadata.get_enum_members(module_path, token)?;

        let rendered = members
            .get(&signed)
            .or_else(|| members.get(&(unsigned as i64)))
            .map(|member| format!("{type_name}.{member}"))
            .unwrap_or_else(|| format!("{type_name}({signed})"));

        Ok(VariableNode::leaf(name, type_name, rendered))
    }

    fn read_nullable(
        &self,
        name: &str,
        object: &ObjectValue,
        class: &Class,
        module_path: &Path,
        token: u32,
        depth: usize,
        visited: &mut HashSet<u64>,
    ) -> anyhow::Result<VariableNode> {
        let fields = self.metadata.read_instance_fields(module_path, token)?;

        let has_value_field = fields
            .iter()
            .find(|f| f.name == "hasValue")
            .ok_or_else(|| anyhow::anyhow!("Nullable has no hasValue field"))?;
        let value_field = fields
            .iter()
            .find(|f| f.name == "value")
            .ok_or_else(|| anyhow::anyhow!("Nullable has no value field"))?;

        let has_value_bytes = object
            .get_field_value(class, has_value_field.token)?
            .to_generic()?
            .read_bytes()?;

        if has_value_bytes.first().copied().unwrap_or(0) == 0 {
            return Ok(VariableNode::leaf(name, "Nullable`1", "null"));
        }

        let inner = object.get_field_value(class, value_field.token)?;
        let mut node = self.read_value(name, &inner, depth, visited);
        node.name = name.to_string();
        Ok(node)
    }
}

/// The type name's last dotted segment.
fn simple_name(type_name: &str) -> &str {
    type_name.rsplit('.').next().unwrap_or(type_name)
}

/// Sign-extended and zero-extended readings of a little-endian integer.
fn integer_interpretations(bytes: &[u8]) -> (i64, u64) {
    let mut unsigned: u64 = 0;
    for (i, b) in bytes.iter().enumerate().take(8) {
        unsigned |= u64::from(*b) << (8 * i);
    }

    let bits = (bytes.len().min(8) * 8) as u32;
    let signed = if bits == 0 || bits == 64 {
        unsigned as i64
    } else if unsigned & (1 << (bits - 1)) != 0 {
        (unsigned | (u64::MAX << bits)) as i64
    } else {
        unsigned as i64
    };

    (signed, unsigned)
}

/// Render a primitive's raw little-endian bytes per its element type.
pub(crate) fn render_primitive(tag: CorElementType, bytes: &[u8]) -> Option<String> {
    use CorElementType::*;

    let rendered = match tag {
        Boolean => {
            if *bytes.first()? != 0 {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        Char => {
            let raw = u16::from_le_bytes(bytes.get(..2)?.try_into().ok()?);
            let c = char::from_u32(u32::from(raw))?;
            format!("'{c}'")
        }
        I1 => (bytes.first().copied()? as i8).to_string(),
        U1 => bytes.first()?.to_string(),
        I2 => i16::from_le_bytes(bytes.get(..2)?.try_into().ok()?).to_string(),
        U2 => u16::from_le_bytes(bytes.get(..2)?.try_into().ok()?).to_string(),
        I4 => i32::from_le_bytes(bytes.get(..4)?.try_into().ok()?).to_string(),
        U4 => u32::from_le_bytes(bytes.get(..4)?.try_into().ok()?).to_string(),
        I8 => i64::from_le_bytes(bytes.get(..8)?.try_into().ok()?).to_string(),
        U8 => u64::from_le_bytes(bytes.get(..8)?.try_into().ok()?).to_string(),
        R4 => f32::from_le_bytes(bytes.get(..4)?.try_into().ok()?).to_string(),
        R8 => f64::from_le_bytes(bytes.get(..8)?.try_into().ok()?).to_string(),
        _ => return None,
    };

    Some(rendered)
}

/// Quote a string value for display.
pub(crate) fn quote_string(value: &str) -> String {
    format!("\"{value}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cordebug::CorElementType::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn primitives_render_canonically() {
        assert_eq!(render_primitive(Boolean, &[1]).unwrap(), "true");
        assert_eq!(render_primitive(Boolean, &[0]).unwrap(), "false");
        assert_eq!(render_primitive(Char, &[0x41, 0x00]).unwrap(), "'A'");
        assert_eq!(render_primitive(I1, &[0xff]).unwrap(), "-1");
        assert_eq!(render_primitive(U1, &[0xff]).unwrap(), "255");
        assert_eq!(
            render_primitive(I4, &0i32.to_le_bytes()).unwrap(),
            "0"
        );
        assert_eq!(
            render_primitive(I4, &(-42i32).to_le_bytes()).unwrap(),
            "-42"
        );
        assert_eq!(
            render_primitive(U8, &u64::MAX.to_le_bytes()).unwrap(),
            "18446744073709551615"
        );
        assert_eq!(
            render_primitive(R8, &42.5f64.to_le_bytes()).unwrap(),
            "42.5"
        );
    }

    #[test]
    fn truncated_primitive_bytes_are_rejected() {
        assert!(render_primitive(I4, &[0x01]).is_none());
    }

    #[test]
    fn string_quoting() {
        assert_eq!(quote_string("hello"), "\"hello\"");
        assert_eq!(quote_string(""), "\"\"");
    }

    #[test]
    fn sign_extension_for_enum_values() {
        assert_eq!(integer_interpretations(&[0xff]), (-1, 255));
        assert_eq!(integer_interpretations(&1i32.to_le_bytes()), (1, 1));
        assert_eq!(
            integer_interpretations(&(-2i32).to_le_bytes()),
            (-2, 0xffff_fffe)
        );
    }

    #[test]
    fn simple_name_takes_last_segment() {
        assert_eq!(simple_name("System.Nullable`1"), "Nullable`1");
        assert_eq!(simple_name("Program"), "Program");
    }
}
