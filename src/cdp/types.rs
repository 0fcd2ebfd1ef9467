//! Typed subset of the Chrome DevTools Protocol used by the adapter core.
//!
//! Only the fields the core reads are modeled, everything else is ignored at
//! deserialization time. All structures tolerate missing optional fields since
//! runtimes of different vintages disagree on what they send.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mirror of CDP `Runtime.RemoteObject`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub r#type: String,
    pub subtype: Option<String>,
    pub class_name: Option<String>,
    pub value: Option<Value>,
    pub description: Option<String>,
    pub object_id: Option<String>,
    pub preview: Option<ObjectPreview>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectPreview {
    pub overflow: bool,
    pub properties: Vec<PropertyPreview>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertyPreview {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub value: Option<String>,
    pub subtype: Option<String>,
}

/// Mirror of CDP `Runtime.PropertyDescriptor`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertyDescriptor {
    pub name: String,
    pub value: Option<RemoteObject>,
    pub get: Option<RemoteObject>,
    pub set: Option<RemoteObject>,
    pub was_thrown: Option<bool>,
    pub enumerable: Option<bool>,
}

/// Argument for `Runtime.callFunctionOn` and `Debugger.setVariableValue`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallArgument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl CallArgument {
    /// Coerce an evaluation result to an argument: by reference when the
    /// debuggee returned an object id, by value otherwise.
    pub fn from_remote_object(obj: &RemoteObject) -> Self {
        match &obj.object_id {
            Some(id) => CallArgument {
                object_id: Some(id.clone()),
                value: None,
            },
            None => CallArgument {
                object_id: None,
                value: obj.value.clone(),
            },
        }
    }
}

/// Location inside a script, 0-based as everywhere in CDP.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    pub script_id: String,
    pub line_number: u64,
    pub column_number: Option<u64>,
}

/// Position used by `Debugger.setBlackboxedRanges`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptPosition {
    pub line_number: u64,
    pub column_number: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Scope {
    #[serde(rename = "type")]
    pub r#type: String,
    pub object: RemoteObject,
}

/// Mirror of CDP `Debugger.CallFrame`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallFrame {
    pub call_frame_id: String,
    pub function_name: String,
    pub location: Location,
    pub scope_chain: Vec<Scope>,
    pub this: Option<RemoteObject>,
    pub return_value: Option<RemoteObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExceptionDetails {
    pub text: String,
    pub exception: Option<RemoteObject>,
    pub line_number: u64,
    pub column_number: u64,
}

impl ExceptionDetails {
    /// The message a debuggee-side throw should surface to the user.
    pub fn message(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| self.text.clone())
    }
}

// ---------------------------------- command results ----------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetBreakpointByUrlResult {
    pub breakpoint_id: String,
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetBreakpointResult {
    pub breakpoint_id: String,
    pub actual_location: Option<Location>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluateResult {
    pub result: RemoteObject,
    pub exception_details: Option<ExceptionDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetPropertiesResult {
    pub result: Vec<PropertyDescriptor>,
    pub exception_details: Option<ExceptionDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetScriptSourceResult {
    pub script_source: String,
}

// ---------------------------------- events ----------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptParsedEvent {
    pub script_id: String,
    pub url: String,
    pub source_map_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PausedEvent {
    /// Kept raw: some runtimes send malformed frames, the stack builder
    /// recovers by materializing a single dummy frame.
    pub call_frames: Value,
    pub reason: String,
    pub data: Option<Value>,
    pub hit_breakpoints: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakpointResolvedEvent {
    pub breakpoint_id: String,
    pub location: Location,
}

/// Back-compat `Console.messageAdded` payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsoleMessage {
    pub level: String,
    pub text: String,
    pub parameters: Option<Vec<RemoteObject>>,
}
