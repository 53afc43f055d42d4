// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Stack, locals, and exception inspection over a stopped debuggee.
//!
//! Frames are walked chain-by-chain, one element at a time; bulk
//! enumeration is unreliable on this platform. Per-frame and per-slot
//! failures degrade to minimal output instead of failing the command.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::Ordering;

use cordebug::{IlFrame, Process, Thread, CORDBG_E_IL_VAR_NOT_AVAILABLE};
use log::debug;

use crate::events::{StackFrame, ThreadStack, VariableNode};
use crate::session::EngineShared;
use crate::values::ValueReader;

/// Upper bound on local/argument slots probed before giving up; the
/// runtime signals the real end with `CORDBG_E_IL_VAR_NOT_AVAILABLE`.
const MAX_SLOTS: u32 = 256;

/// Display text for frames that are not IL frames.
const NON_IL_FRAME: &str = "[native frame]";

/// IL frame coordinates: method token, current IP, owning module path.
pub(crate) fn il_frame_context(il: &IlFrame) -> Result<(u32, u32, String), cordebug::CorError> {
    let (ip, _mapping) = il.get_ip()?;
    let function = il.get_function()?;
    let token = function.get_token()?;
    let module = function.get_module()?;
    let path = module.get_name()?;
    Ok((token, ip, path))
}

/// Describe one IL frame, best-effort: method display name from metadata,
/// source position from the PDB.
pub(crate) fn describe_il_frame(shared: &EngineShared, il: &IlFrame, index: u32) -> StackFrame {
    let Ok((token, ip, module_path)) = il_frame_context(il) else {
        return StackFrame {
            index,
            method_display: NON_IL_FRAME.to_string(),
            source_file: None,
            source_line: None,
            il_offset: 0,
        };
    };

    let metadata = shared.metadata.lock().unwrap_or_else(|e| e.into_inner());
    let path = Path::new(&module_path);

    let method_display = metadata
        .get_method_display(path, token)
        .unwrap_or_else(|_| format!("0x{token:08x}"));

    let (source_file, source_line) = match metadata.reverse_lookup(path, token, ip) {
        Ok(Some((file, line))) => (Some(file), Some(line)),
        _ => (None, None),
    };

    StackFrame {
        index,
        method_display,
        source_file,
        source_line,
        il_offset: ip,
    }
}

/// The innermost frame of a thread, for event payloads.
pub(crate) fn top_frame(shared: &EngineShared, thread: &Thread) -> Option<StackFrame> {
    let frame = thread.get_active_frame().ok()??;
    let il = frame.to_il_frame().ok()?;
    Some(describe_il_frame(shared, &il, 0))
}

/// Walk one thread's chains and frames into a `ThreadStack`.
pub(crate) fn thread_stack(shared: &EngineShared, thread: &Thread, thread_id: u32) -> ThreadStack {
    let mut frames = Vec::new();
    let mut index = 0u32;

    let chains = match thread.enumerate_chains() {
        Ok(chains) => chains,
        Err(err) => {
            debug!("chain enumeration failed for thread {thread_id}: {err}");
            Vec::new()
        }
    };

    for chain in chains {
        if !chain.is_managed().unwrap_or(false) {
            continue;
        }

        let chain_frames = match chain.enumerate_frames() {
            Ok(frames) => frames,
            Err(err) => {
                debug!("frame enumeration failed for thread {thread_id}: {err}");
                continue;
            }
        };

        for frame in chain_frames {
            match frame.to_il_frame() {
                Ok(il) => frames.push(describe_il_frame(shared, &il, index)),
                Err(_) => frames.push(StackFrame {
                    index,
                    method_display: NON_IL_FRAME.to_string(),
                    source_file: None,
                    source_line: None,
                    il_offset: 0,
                }),
            }
            index += 1;
        }
    }

    ThreadStack { thread_id, frames }
}

/// Build stacks for one thread or for every known thread. Full runtime
/// thread enumeration is unreliable here, so the sink-maintained id set
/// drives the walk via per-id `get_thread`.
pub(crate) fn build_stacks(
    shared: &EngineShared,
    process: &Process,
    thread_id: Option<u32>,
) -> Vec<ThreadStack> {
    let ids: Vec<u32> = match thread_id {
        Some(id) => vec![id],
        None => {
            let known = shared
                .known_threads
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if known.is_empty() {
                let current = shared.current_stopped_thread.load(Ordering::SeqCst);
                if current != 0 {
                    vec![current]
                } else {
                    Vec::new()
                }
            } else {
                known.iter().copied().collect()
            }
        }
    };

    let mut stacks = Vec::new();
    for id in ids {
        match process.get_thread(id) {
            Ok(thread) => stacks.push(thread_stack(shared, &thread, id)),
            Err(err) => debug!("get_thread({id}) failed: {err}"),
        }
    }

    stacks
}

/// Read all locals and arguments of an IL frame into variable nodes.
pub(crate) fn read_frame_variables(shared: &EngineShared, il: &IlFrame) -> Vec<VariableNode> {
    let metadata = shared.metadata.lock().unwrap_or_else(|e| e.into_inner());
    let reader = ValueReader::new(&metadata);

    let (local_names, argument_names, is_static) = match il_frame_context(il) {
        Ok((token, _ip, module_path)) => {
            let path = Path::new(&module_path);
            (
                metadata.get_local_names(path, token).unwrap_or_default(),
                metadata
                    .get_argument_names(path, token)
                    .unwrap_or_default(),
                metadata.method_is_static(path, token).unwrap_or(true),
            )
        }
        Err(_) => (BTreeMap::new(), BTreeMap::new(), true),
    };

    let mut variables = Vec::new();

    // Arguments first: slot 0 is `this` for instance methods; named slots
    // map to Param sequence numbers.
    for slot in 0..MAX_SLOTS {
        match il.get_argument(slot) {
            Ok(value) => {
                let name = if !is_static && slot == 0 {
                    "this".to_string()
                } else {
                    let sequence = if is_static { slot + 1 } else { slot };
                    argument_names
                        .get(&sequence)
                        .cloned()
                        .unwrap_or_else(|| format!("arg_{slot}"))
                };
                variables.push(reader.read(&name, &value));
            }
            Err(err) => {
                if err.hresult() != Some(CORDBG_E_IL_VAR_NOT_AVAILABLE) {
                    debug!("get_argument({slot}) failed: {err}");
                }
                break;
            }
        }
    }

    // Locals: slots missing from the PDB map render as `local_N`.
    for slot in 0..MAX_SLOTS {
        match il.get_local_variable(slot) {
            Ok(value) => {
                let name = local_names
                    .get(&slot)
                    .cloned()
                    .unwrap_or_else(|| format!("local_{slot}"));
                variables.push(reader.read(&name, &value));
            }
            Err(err) => {
                if err.hresult() != Some(CORDBG_E_IL_VAR_NOT_AVAILABLE) {
                    debug!("get_local_variable({slot}) failed: {err}");
                }
                break;
            }
        }
    }

    variables
}

/// Read the current exception's type name and `_message` off a thread.
/// Must run before any `continue`: the current-exception context is tied
/// to the active exception. Every failure path degrades to a placeholder.
pub(crate) fn read_exception_info(shared: &EngineShared, thread: &Thread) -> (String, String) {
    const FALLBACK: (&str, &str) = ("<unknown>", "Exception info unavailable");

    match try_read_exception_info(shared, thread) {
        Some(info) => info,
        None => (FALLBACK.0.to_string(), FALLBACK.1.to_string()),
    }
}

fn try_read_exception_info(shared: &EngineShared, thread: &Thread) -> Option<(String, String)> {
    let value = thread.get_current_exception().ok()??;

    // The exception arrives as a reference; null means nothing to report.
    let object = match value.to_reference() {
        Ok(reference) => {
            if reference.is_null().ok()? {
                return None;
            }
            reference.dereference().ok()?.to_object().ok()?
        }
        Err(_) => value.to_object().ok()?,
    };

    let class = object.get_class().ok()?;
    let token = class.get_token().ok()?;
    let module = class.get_module().ok()?;
    let module_path_string = module.get_name().ok()?;
    let module_path = Path::new(&module_path_string);

    let metadata = shared.metadata.lock().unwrap_or_else(|e| e.into_inner());
    let type_name = metadata.get_type_name(module_path, token).ok()?;

    // `_message` may be declared on a base type; the field read needs the
    // declaring level's class handle.
    let mut level = token;
    while level != 0 {
        let fields = metadata.read_instance_fields(module_path, level).ok()?;

        if let Some(field) = fields.iter().find(|f| f.name == "_message") {
            let level_class = module.get_class_from_token(level).ok()?;
            let message_value = object.get_field_value(&level_class, field.token).ok()?;

            let message = match message_value.to_reference() {
                Ok(reference) => {
                    if reference.is_null().ok()? {
                        String::new()
                    } else {
                        reference
                            .dereference()
                            .ok()?
                            .to_string_value()
                            .ok()?
                            .get_string()
                            .ok()?
                    }
                }
                Err(_) => message_value.to_string_value().ok()?.get_string().ok()?,
            };

            return Some((type_name, message));
        }

        level = metadata.get_base_type_token(module_path, level).ok()?;
    }

    Some((type_name, String::new()))
}
