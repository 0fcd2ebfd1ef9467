//! Stack, scope and variable materialization.
//!
//! CDP hands the adapter remote objects; this module turns them into DAP
//! stack frames, scopes and variables, including getter invocation, indexed
//! vs named partitioning and pagination over large collections.

use crate::adapter::handles::HandleTable;
use crate::adapter::scripts::ScriptRegistry;
use crate::adapter::skipfiles::SkipFileManager;
use crate::cdp::CdpClient;
use crate::cdp::types::{CallArgument, CallFrame, PropertyDescriptor, RemoteObject};
use crate::dap::types::{Scope, Source, StackFrame, Variable};
use crate::error::Error;
use crate::transform::{LineNumbering, PathTransformer, SourceMapTransformer};
use itertools::Itertools;
use serde_json::json;

/// Payload behind a `sourceReference` handle.
#[derive(Debug, Clone)]
pub enum SourceContainer {
    Inlined { contents: String, mapped_path: String },
    Script { script_id: String },
}

/// Payload behind a `variablesReference` handle. Dispatch is by tag, every
/// variant supports `expand` and `set_value`.
#[derive(Debug, Clone)]
pub enum VariableContainer {
    Scope {
        call_frame_id: String,
        scope_number: usize,
        object_id: Option<String>,
        this: Option<RemoteObject>,
        return_value: Option<RemoteObject>,
    },
    Property {
        object_id: String,
        evaluate_name: String,
        subtype: Option<String>,
    },
    LoggedObjects {
        args: Vec<RemoteObject>,
    },
    Exception {
        exception: RemoteObject,
    },
}

/// Variable list filter from the DAP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyFilter {
    All,
    Indexed,
    Named,
}

impl PropertyFilter {
    pub fn from_request(filter: Option<&str>) -> Self {
        match filter {
            Some("indexed") => PropertyFilter::Indexed,
            Some("named") => PropertyFilter::Named,
            _ => PropertyFilter::All,
        }
    }

    fn keeps(&self, name: &str) -> bool {
        match self {
            PropertyFilter::All => true,
            PropertyFilter::Indexed => is_indexed_prop_name(name),
            PropertyFilter::Named => !is_indexed_prop_name(name),
        }
    }
}

/// A name is indexed iff it is a canonical non-negative decimal integer.
pub fn is_indexed_prop_name(name: &str) -> bool {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    name.len() == 1 || !name.starts_with('0')
}

/// Compose the evaluate name of a child property.
pub fn compose_evaluate_name(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        return name.to_string();
    }
    if is_indexed_prop_name(name) {
        return format!("{parent}[{name}]");
    }
    if is_identifier(name) {
        return format!("{parent}.{name}");
    }
    format!("{parent}[\"{name}\"]")
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

// ---------------------------------- rendering ----------------------------------

/// Truncate a function description to its signature.
fn function_signature(description: &str) -> String {
    if let Some(idx) = description.find('{') {
        return format!("{}{{ … }}", &description[..idx]);
    }
    if let Some(idx) = description.find("=>") {
        return format!("{} …", &description[..idx + 2]);
    }
    description.to_string()
}

/// Short value string for an object, preview based when the debuggee sent one.
fn object_value_string(obj: &RemoteObject) -> String {
    let Some(preview) = &obj.preview else {
        return obj
            .description
            .clone()
            .unwrap_or_else(|| "Object".to_string());
    };

    let is_array = matches!(obj.subtype.as_deref(), Some("array") | Some("typedarray"));
    let body = preview
        .properties
        .iter()
        .map(|prop| {
            let value = prop.value.as_deref().unwrap_or("…");
            if is_array && is_indexed_prop_name(&prop.name) {
                value.to_string()
            } else {
                format!("{}: {}", prop.name, value)
            }
        })
        .join(", ");
    let ellipsis = if preview.overflow { ", …" } else { "" };

    if is_array {
        format!("[{body}{ellipsis}]")
    } else {
        format!("{{{body}{ellipsis}}}")
    }
}

/// Render a remote object to its display string.
///
/// `stringify` selects the client-facing form for string primitives (quoted)
/// over the raw contents.
pub fn remote_object_value(obj: &RemoteObject, stringify: bool) -> String {
    match obj.r#type.as_str() {
        "object" => match obj.subtype.as_deref() {
            Some("null") => "null".to_string(),
            Some("internal#location") => "internal#location".to_string(),
            _ => object_value_string(obj),
        },
        "undefined" => "undefined".to_string(),
        "function" => function_signature(obj.description.as_deref().unwrap_or("function")),
        "number" => obj
            .description
            .clone()
            .or_else(|| obj.value.as_ref().map(|v| v.to_string()))
            .unwrap_or_default(),
        "boolean" => obj
            .value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default(),
        _ => {
            // string and the remaining primitives
            let raw = match &obj.value {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(v) => v.to_string(),
                None => obj.description.clone().unwrap_or_default(),
            };
            if stringify { format!("\"{raw}\"") } else { raw }
        }
    }
}

/// Indexed/named property count estimate for large collections, so clients
/// can page instead of expanding everything.
fn collection_prop_counts(
    client: &mut CdpClient,
    obj: &RemoteObject,
) -> Option<(i64, i64)> {
    let subtype = obj.subtype.as_deref()?;
    let object_id = obj.object_id.as_deref()?;

    match subtype {
        "array" | "typedarray" => {
            if let Some(preview) = obj.preview.as_ref().filter(|p| !p.overflow) {
                let indexed = preview
                    .properties
                    .iter()
                    .filter(|p| is_indexed_prop_name(&p.name))
                    .count() as i64;
                let named = preview.properties.len() as i64 - indexed;
                return Some((indexed, named));
            }
            // [length, ownKeys - length + 2], the 2 covers `length` and `__proto__`
            let decl = "function() { return [this.length, Object.getOwnPropertyNames(this).length - this.length + 2]; }";
            eval_counts(client, object_id, decl)
        }
        "set" | "map" => {
            // [0, ownKeys + 1], the 1 accounts for [[Entries]]
            let decl = "function() { return [0, Object.getOwnPropertyNames(this).length + 1]; }";
            eval_counts(client, object_id, decl)
        }
        _ => None,
    }
}

fn eval_counts(client: &mut CdpClient, object_id: &str, decl: &str) -> Option<(i64, i64)> {
    let result = client.call_function_on(object_id, decl, &[], true).ok()?;
    let counts = result.result.value?;
    let counts = counts.as_array()?;
    Some((counts.first()?.as_i64()?, counts.get(1)?.as_i64()?))
}

/// Convert a remote object to a DAP variable, minting a container handle when
/// it is expandable.
pub fn remote_object_to_variable(
    client: &mut CdpClient,
    variables: &mut HandleTable<VariableContainer>,
    name: &str,
    evaluate_name: &str,
    obj: &RemoteObject,
    stringify: bool,
) -> Variable {
    let expandable = obj.r#type == "object"
        && !matches!(obj.subtype.as_deref(), Some("null") | Some("internal#location"));

    let Some(object_id) = obj.object_id.clone().filter(|_| expandable) else {
        return Variable {
            name: name.to_string(),
            value: remote_object_value(obj, stringify),
            evaluate_name: Some(evaluate_name.to_string()),
            variables_reference: 0,
            named_variables: None,
            indexed_variables: None,
        };
    };

    let counts = collection_prop_counts(client, obj);
    let reference = variables.create(VariableContainer::Property {
        object_id,
        evaluate_name: evaluate_name.to_string(),
        subtype: obj.subtype.clone(),
    });

    Variable {
        name: name.to_string(),
        value: remote_object_value(obj, stringify),
        evaluate_name: Some(evaluate_name.to_string()),
        variables_reference: reference,
        indexed_variables: counts.map(|(indexed, _)| indexed),
        named_variables: counts.map(|(_, named)| named),
    }
}

// ---------------------------------- expansion ----------------------------------

/// Expand an object id into DAP variables: own properties merged with
/// accessors found on the prototype chain, deduplicated by name.
fn expand_object(
    client: &mut CdpClient,
    variables: &mut HandleTable<VariableContainer>,
    object_id: &str,
    evaluate_name: &str,
    filter: PropertyFilter,
) -> Result<Vec<Variable>, Error> {
    let accessors = client.get_properties(object_id, false, true)?;
    let own = client.get_properties(object_id, true, false)?;

    let mut merged: Vec<PropertyDescriptor> = Vec::new();
    for prop in accessors.result.into_iter().chain(own.result) {
        if !merged.iter().any(|p| p.name == prop.name) {
            merged.push(prop);
        }
    }

    let mut out = Vec::new();
    for prop in merged {
        if !filter.keeps(&prop.name) {
            continue;
        }
        out.push(property_to_variable(client, variables, object_id, evaluate_name, &prop));
    }

    Ok(out)
}

fn property_to_variable(
    client: &mut CdpClient,
    variables: &mut HandleTable<VariableContainer>,
    object_id: &str,
    parent_evaluate_name: &str,
    prop: &PropertyDescriptor,
) -> Variable {
    let evaluate_name = compose_evaluate_name(parent_evaluate_name, &prop.name);

    if let Some(getter) = &prop.get {
        if getter.r#type != "undefined" {
            return invoke_getter(client, variables, object_id, &prop.name, &evaluate_name);
        }
    }

    if prop.value.is_none() && prop.set.as_ref().is_some_and(|s| s.r#type != "undefined") {
        return Variable {
            name: prop.name.clone(),
            value: "setter".to_string(),
            evaluate_name: Some(evaluate_name),
            variables_reference: 0,
            named_variables: None,
            indexed_variables: None,
        };
    }

    match &prop.value {
        Some(value) => {
            remote_object_to_variable(client, variables, &prop.name, &evaluate_name, value, true)
        }
        None => Variable {
            name: prop.name.clone(),
            value: "undefined".to_string(),
            evaluate_name: Some(evaluate_name),
            variables_reference: 0,
            named_variables: None,
            indexed_variables: None,
        },
    }
}

/// Run a property getter in the debuggee. A throwing getter renders its
/// exception as the value, never as a request error.
fn invoke_getter(
    client: &mut CdpClient,
    variables: &mut HandleTable<VariableContainer>,
    object_id: &str,
    name: &str,
    evaluate_name: &str,
) -> Variable {
    let args = [CallArgument {
        value: Some(json!(name)),
        object_id: None,
    }];

    match client.call_function_on(object_id, "function(p){return this[p]}", &args, false) {
        Ok(result) => {
            if let Some(details) = result.exception_details {
                return Variable {
                    name: name.to_string(),
                    value: details.message(),
                    evaluate_name: Some(evaluate_name.to_string()),
                    variables_reference: 0,
                    named_variables: None,
                    indexed_variables: None,
                };
            }
            remote_object_to_variable(client, variables, name, evaluate_name, &result.result, true)
        }
        Err(e) => Variable {
            name: name.to_string(),
            value: e.to_string(),
            evaluate_name: Some(evaluate_name.to_string()),
            variables_reference: 0,
            named_variables: None,
            indexed_variables: None,
        },
    }
}

/// Expand a slice of a large collection via a debuggee-side helper, keeping
/// only indexed names of the returned chunk.
fn expand_object_range(
    client: &mut CdpClient,
    variables: &mut HandleTable<VariableContainer>,
    object_id: &str,
    subtype: Option<&str>,
    evaluate_name: &str,
    start: u64,
    count: u64,
) -> Result<Vec<Variable>, Error> {
    let indexed = matches!(subtype, Some("array") | Some("typedarray"));
    let decl = if indexed {
        "function(start, count){ var result = {}; for (var i = start; i < start + count; i++) result[i] = this[i]; return result; }"
    } else {
        "function(start, count){ var result = {}; var names = Object.getOwnPropertyNames(this); for (var i = start; i < start + count && i < names.length; i++) result[names[i]] = this[names[i]]; return result; }"
    };

    let args = [
        CallArgument {
            value: Some(json!(start)),
            object_id: None,
        },
        CallArgument {
            value: Some(json!(count)),
            object_id: None,
        },
    ];

    let sliced = client.call_function_on(object_id, decl, &args, false)?;
    if let Some(details) = sliced.exception_details {
        return Err(Error::EvaluateFailed(details.message()));
    }
    let Some(chunk_id) = sliced.result.object_id.as_deref() else {
        return Ok(Vec::new());
    };

    let own = client.get_properties(chunk_id, true, false)?;
    let mut out = Vec::new();
    for prop in &own.result {
        if !is_indexed_prop_name(&prop.name) {
            continue;
        }
        out.push(property_to_variable(client, variables, chunk_id, evaluate_name, prop));
    }

    Ok(out)
}

/// Expand any variable container.
pub fn expand_container(
    client: &mut CdpClient,
    variables: &mut HandleTable<VariableContainer>,
    container: &VariableContainer,
    filter: PropertyFilter,
    start: Option<u64>,
    count: Option<u64>,
) -> Result<Vec<Variable>, Error> {
    match container {
        VariableContainer::Scope {
            object_id,
            this,
            return_value,
            ..
        } => {
            let mut out = Vec::new();
            if let Some(return_value) = return_value {
                out.push(remote_object_to_variable(
                    client,
                    variables,
                    "Return value",
                    "",
                    return_value,
                    true,
                ));
            }
            if let Some(this) = this {
                out.push(remote_object_to_variable(client, variables, "this", "this", this, true));
            }
            if let Some(object_id) = object_id {
                out.extend(expand_object(client, variables, object_id, "", filter)?);
            }
            Ok(out)
        }
        VariableContainer::Property {
            object_id,
            evaluate_name,
            subtype,
        } => {
            if let (Some(start), Some(count)) = (start, count) {
                return expand_object_range(
                    client,
                    variables,
                    object_id,
                    subtype.as_deref(),
                    evaluate_name,
                    start,
                    count,
                );
            }
            expand_object(client, variables, object_id, evaluate_name, filter)
        }
        VariableContainer::LoggedObjects { args } => {
            let mut out = Vec::new();
            for (i, arg) in args.iter().enumerate() {
                let name = i.to_string();
                out.push(remote_object_to_variable(client, variables, &name, "", arg, true));
            }
            Ok(out)
        }
        VariableContainer::Exception { exception } => match exception.object_id.as_deref() {
            Some(object_id) => expand_object(client, variables, object_id, "", filter),
            None => Ok(vec![remote_object_to_variable(
                client,
                variables,
                "exception",
                "",
                exception,
                true,
            )]),
        },
    }
}

/// Names of every variable across the scopes of a call frame, deduplicated.
/// Used as the completion set when no object expression is present.
pub fn scope_variable_names(client: &mut CdpClient, frame: &CallFrame) -> Result<Vec<String>, Error> {
    let mut names = Vec::new();
    for scope in &frame.scope_chain {
        if let Some(object_id) = &scope.object.object_id {
            let props = client.get_properties(object_id, true, false)?;
            names.extend(props.result.into_iter().map(|p| p.name));
        }
    }
    Ok(names.into_iter().unique().collect())
}

/// Assign a new value through a variable container.
pub fn set_container_value(
    client: &mut CdpClient,
    container: &VariableContainer,
    name: &str,
    value: &str,
) -> Result<String, Error> {
    match container {
        VariableContainer::Scope {
            call_frame_id,
            scope_number,
            ..
        } => {
            let evaluated = client.evaluate_on_call_frame(call_frame_id, value, false)?;
            if let Some(details) = evaluated.exception_details {
                return Err(Error::EvaluateFailed(details.message()));
            }
            client.set_variable_value(
                call_frame_id,
                *scope_number,
                name,
                CallArgument::from_remote_object(&evaluated.result),
            )?;
            Ok(remote_object_value(&evaluated.result, true))
        }
        VariableContainer::Property { object_id, .. } => {
            let decl = format!("function() {{ return this[\"{name}\"] = {value}; }}");
            let result = client.call_function_on(object_id, &decl, &[], false)?;
            if let Some(details) = result.exception_details {
                return Err(Error::EvaluateFailed(details.message()));
            }
            Ok(remote_object_value(&result.result, true))
        }
        VariableContainer::LoggedObjects { .. } | VariableContainer::Exception { .. } => {
            Err(Error::SetValueNotSupported)
        }
    }
}

// ---------------------------------- stack frames ----------------------------------

pub struct StackBuildCx<'a> {
    pub scripts: &'a ScriptRegistry,
    pub paths: &'a dyn PathTransformer,
    pub sourcemaps: &'a dyn SourceMapTransformer,
    pub lines: LineNumbering,
    pub skip: &'a SkipFileManager,
    pub source_maps_enabled: bool,
    pub smart_step_enabled: bool,
}

/// Scopes of the top call frame, plus a synthetic "Exception" scope when the
/// pause pinned a thrown value.
pub fn scopes_for_frame(
    frame: &CallFrame,
    exception: Option<&RemoteObject>,
    variables: &mut HandleTable<VariableContainer>,
) -> Vec<Scope> {
    let mut scopes = Vec::with_capacity(frame.scope_chain.len() + 1);

    if let Some(exception) = exception {
        scopes.push(Scope {
            name: "Exception".to_string(),
            variables_reference: variables.create(VariableContainer::Exception {
                exception: exception.clone(),
            }),
            expensive: false,
        });
    }

    for (i, scope) in frame.scope_chain.iter().enumerate() {
        let container = VariableContainer::Scope {
            call_frame_id: frame.call_frame_id.clone(),
            scope_number: i,
            object_id: scope.object.object_id.clone(),
            this: if i == 0 { frame.this.clone() } else { None },
            return_value: if i == 0 { frame.return_value.clone() } else { None },
        };

        scopes.push(Scope {
            name: capitalize(&scope.r#type),
            variables_reference: variables.create(container),
            expensive: scope.r#type == "global",
        });
    }

    scopes
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Materialize DAP stack frames from registered call frames.
pub fn build_stack_frames(
    cx: &StackBuildCx<'_>,
    sources: &mut HandleTable<SourceContainer>,
    frames: &[(i64, CallFrame)],
    levels: Option<usize>,
) -> Vec<StackFrame> {
    let take = levels.filter(|&n| n > 0).unwrap_or(frames.len());

    frames
        .iter()
        .take(take)
        .map(|(handle, frame)| build_one_frame(cx, sources, *handle, frame))
        .collect()
}

fn build_one_frame(
    cx: &StackBuildCx<'_>,
    sources: &mut HandleTable<SourceContainer>,
    handle: i64,
    frame: &CallFrame,
) -> StackFrame {
    let script_id = &frame.location.script_id;
    let line = frame.location.line_number;
    let column = frame.location.column_number.unwrap_or(0);

    let name = if frame.function_name.is_empty() {
        "(anonymous function)".to_string()
    } else {
        frame.function_name.clone()
    };

    let Some(script) = cx.scripts.get_by_id(script_id) else {
        // script never seen (or filtered): the client can only fetch it by reference
        return StackFrame {
            id: handle,
            name,
            source: Some(Source {
                name: Some(format!("VM{script_id}")),
                path: None,
                source_reference: Some(sources.create(SourceContainer::Script {
                    script_id: script_id.clone(),
                })),
                origin: None,
            }),
            line: cx.lines.to_client_line(line),
            column: cx.lines.to_client_column(column),
            presentation_hint: None,
        };
    };

    // path transformer, then source maps, then line/column base
    let mut path = cx
        .paths
        .target_url_to_client_path(&script.url)
        .unwrap_or_else(|| script.url.clone());
    let mut mapped = false;
    let (mut line, mut column) = (line, column);
    if let Some(authored) = cx.sourcemaps.generated_to_authored(&script.url, line, column) {
        path = authored.path;
        line = authored.line;
        column = authored.column;
        mapped = true;
    }

    let mut origin = None;
    let mut presentation_hint = None;
    if cx.skip.is_skipped(&path) {
        origin = Some("(skipped by 'skipFiles')".to_string());
        presentation_hint = Some("deemphasize");
    } else if cx.source_maps_enabled && cx.smart_step_enabled && !mapped {
        origin = Some("(skipped by 'smartStep')".to_string());
        presentation_hint = Some("deemphasize");
    }

    let source = if ScriptRegistry::is_placeholder_url(&path) {
        Source {
            name: Some(format!("VM{script_id}")),
            path: None,
            source_reference: Some(sources.create(SourceContainer::Script {
                script_id: script_id.clone(),
            })),
            origin,
        }
    } else if mapped && !is_openable_path(&path) {
        // an authored source living only inside its source map is served by
        // reference, with the contents the map carried
        let container = match cx.sourcemaps.source_content(&path) {
            Some(contents) => SourceContainer::Inlined {
                contents,
                mapped_path: path.clone(),
            },
            None => SourceContainer::Script {
                script_id: script_id.clone(),
            },
        };
        Source {
            name: Some(basename(&path)),
            path: None,
            source_reference: Some(sources.create(container)),
            origin,
        }
    } else {
        Source {
            name: Some(basename(&path)),
            path: Some(path),
            source_reference: None,
            origin,
        }
    };

    StackFrame {
        id: handle,
        name,
        source: Some(source),
        line: cx.lines.to_client_line(line),
        column: cx.lines.to_client_column(column),
        presentation_hint,
    }
}

/// Recovery frame for runtimes that send malformed call frame lists.
pub fn unknown_frame() -> StackFrame {
    StackFrame {
        id: 0,
        name: "Unknown".to_string(),
        source: None,
        line: 0,
        column: 0,
        presentation_hint: Some("subtle"),
    }
}

fn basename(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string()
}

/// Whether the client can open `path` as a file on its own.
fn is_openable_path(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() > 1 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
