// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Restricted expression evaluation: a dotted chain of simple names.
//!
//! Lookup precedence for the first segment: local, argument, then static
//! field (of the current method's type, or of a type named by the
//! segment). Remaining segments walk instance fields. Arbitrary
//! expressions are out of scope.

use std::path::Path;

use cordebug::{IlFrame, Module, ObjectValue, Process, Value};
use log::debug;
use portable_pdb::{display_name, MetadataCache};

use crate::events::EvalResult;
use crate::session::EngineShared;
use crate::stack::il_frame_context;
use crate::values::ValueReader;

/// Split a dotted identifier chain; `None` when any segment is not a
/// simple identifier.
pub(crate) fn parse_expression(expression: &str) -> Option<Vec<String>> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    for segment in trimmed.split('.') {
        if !is_identifier(segment) {
            return None;
        }
        segments.push(segment.to_string());
    }

    Some(segments)
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();

    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_alphanumeric() || c == '_')
}

pub(crate) fn evaluate(shared: &EngineShared, process: &Process, expression: &str) -> EvalResult {
    let Some(segments) = parse_expression(expression) else {
        return EvalResult::not_found(expression);
    };

    match try_evaluate(shared, process, &segments) {
        Some(value) => {
            let metadata = shared.metadata.lock().unwrap_or_else(|e| e.into_inner());
            let node = ValueReader::new(&metadata).read(expression, &value);
            EvalResult::found(node.value)
        }
        None => EvalResult::not_found(&segments[0]),
    }
}

fn try_evaluate(shared: &EngineShared, process: &Process, segments: &[String]) -> Option<Value> {
    let tid = shared
        .current_stopped_thread
        .load(std::sync::atomic::Ordering::SeqCst);
    let thread = process.get_thread(tid).ok()?;
    let il = thread.get_active_frame().ok()??.to_il_frame().ok()?;

    let (method_token, _ip, module_path_string) = il_frame_context(&il).ok()?;
    let module_path = Path::new(&module_path_string);
    let module = il.get_function().ok()?.get_module().ok()?;

    let metadata = shared.metadata.lock().unwrap_or_else(|e| e.into_inner());

    let base = lookup_base(
        &metadata,
        &il,
        &module,
        module_path,
        method_token,
        segments,
    )?;

    let (value, consumed) = base;
    chain_fields(&metadata, &value, &segments[consumed..])
}

/// Resolve the first segment (or two, for `Type.Field` statics). Returns
/// the base value and how many segments it consumed.
fn lookup_base(
    metadata: &MetadataCache,
    il: &IlFrame,
    module: &Module,
    module_path: &Path,
    method_token: u32,
    segments: &[String],
) -> Option<(Value, usize)> {
    let first = segments[0].as_str();

    // (a) local with that name.
    let locals = metadata
        .get_local_names(module_path, method_token)
        .unwrap_or_default();
    if let Some((slot, _)) = locals.iter().find(|(_, name)| name.as_str() == first) {
        if let Ok(value) = il.get_local_variable(*slot) {
            return Some((value, 1));
        }
    }

    // (b) argument by name (including `this` for instance methods).
    let is_static = metadata
        .method_is_static(module_path, method_token)
        .unwrap_or(true);
    if !is_static && first == "this" {
        if let Ok(value) = il.get_argument(0) {
            return Some((value, 1));
        }
    }
    let arguments = metadata
        .get_argument_names(module_path, method_token)
        .unwrap_or_default();
    if let Some((sequence, _)) = arguments.iter().find(|(_, name)| name.as_str() == first) {
        let slot = if is_static { sequence - 1 } else { *sequence };
        if let Ok(value) = il.get_argument(slot) {
            return Some((value, 1));
        }
    }

    // (d1) static field of the current method's declaring type.
    if let Ok(Some(type_token)) = metadata.find_method_type(module_path, method_token) {
        if let Some(value) =
            read_static_field(metadata, il, module, module_path, type_token, first)
        {
            return Some((value, 1));
        }
    }

    // (d2) `Type.Field`: a type reachable by simple name.
    if segments.len() >= 2 {
        if let Ok(Some(type_token)) = metadata.find_type_by_name(module_path, first) {
            if let Some(value) = read_static_field(
                metadata,
                il,
                module,
                module_path,
                type_token,
                segments[1].as_str(),
            ) {
                return Some((value, 2));
            }
        }
    }

    None
}

fn read_static_field(
    metadata: &MetadataCache,
    il: &IlFrame,
    module: &Module,
    module_path: &Path,
    type_token: u32,
    field_name: &str,
) -> Option<Value> {
    let fields = metadata.read_static_fields(module_path, type_token).ok()?;
    let field = fields.iter().find(|f| {
        display_name(&f.name).as_deref() == Some(field_name)
    })?;

    let class = module.get_class_from_token(type_token).ok()?;

    // Statics not yet initialized by the class constructor need the frame
    // as evaluation context.
    match class.get_static_field_value(field.token, Some(il)) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!("static field read failed for {field_name}: {err}");
            None
        }
    }
}

/// Walk the remaining segments as instance fields, dereferencing along
/// the way.
fn chain_fields(metadata: &MetadataCache, base: &Value, segments: &[String]) -> Option<Value> {
    if segments.is_empty() {
        // Re-wrap the base by taking an extra reference so the caller owns
        // an independent handle.
        return Some(base.clone());
    }

    let mut current = base.clone();

    for segment in segments {
        let object = to_object(&current)?;
        current = field_on_object(metadata, &object, segment)?;
    }

    Some(current)
}

fn to_object(value: &Value) -> Option<ObjectValue> {
    if let Ok(object) = value.to_object() {
        return Some(object);
    }

    let reference = value.to_reference().ok()?;
    if reference.is_null().ok()? {
        return None;
    }
    reference.dereference().ok()?.to_object().ok()
}

/// Find `name` among the object's instance fields, walking base levels;
/// each level's read uses that level's class handle.
fn field_on_object(
    metadata: &MetadataCache,
    object: &ObjectValue,
    name: &str,
) -> Option<Value> {
    let class = object.get_class().ok()?;
    let module = class.get_module().ok()?;
    let module_path_string = module.get_name().ok()?;
    let module_path = Path::new(&module_path_string);

    let mut level = class.get_token().ok()?;

    while level != 0 {
        let fields = metadata.read_instance_fields(module_path, level).ok()?;

        for field in &fields {
            if display_name(&field.name).as_deref() != Some(name) {
                continue;
            }

            let level_class = module.get_class_from_token(level).ok()?;
            return object.get_field_value(&level_class, field.token).ok();
        }

        level = metadata.get_base_type_token(module_path, level).ok()?;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn simple_identifiers_parse() {
        assert_eq!(parse_expression("counter"), Some(vec!["counter".into()]));
        assert_eq!(
            parse_expression("this.items"),
            Some(vec!["this".into(), "items".into()])
        );
        assert_eq!(
            parse_expression(" order.total "),
            Some(vec!["order".into(), "total".into()])
        );
        assert_eq!(parse_expression("_private"), Some(vec!["_private".into()]));
    }

    #[test]
    fn arbitrary_expressions_are_rejected() {
        assert_eq!(parse_expression(""), None);
        assert_eq!(parse_expression("a + b"), None);
        assert_eq!(parse_expression("items[0]"), None);
        assert_eq!(parse_expression("Call()"), None);
        assert_eq!(parse_expression("a..b"), None);
        assert_eq!(parse_expression("3rd"), None);
    }
}
