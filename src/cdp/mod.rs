//! Debuggee side of the adapter: a typed client over a raw CDP connection.
//!
//! The transport itself (WebSocket, pipe, in-process mock) is a collaborator
//! behind the [`CdpConnection`] trait, the core only sees blocking round-trips.

pub mod types;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use strum_macros::{Display, EnumString};

use types::{
    BreakpointResolvedEvent, CallArgument, ConsoleMessage, EvaluateResult, GetPropertiesResult,
    GetScriptSourceResult, PausedEvent, ScriptParsedEvent, ScriptPosition, SetBreakpointByUrlResult,
    SetBreakpointResult,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum CdpError {
    #[error("{method}: {message}")]
    Command { method: &'static str, message: String },
    #[error("runtime disconnected")]
    Disconnected,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// A single blocking CDP round-trip.
///
/// Implementations own request/response correlation and framing. An `Err` of
/// [`CdpError::Command`] means the debuggee rejected the command, which for
/// some commands (blackboxing) is an expected condition.
pub trait CdpConnection: Send {
    fn call(&mut self, method: &'static str, params: Value) -> Result<Value, CdpError>;
}

/// Typed facade over a [`CdpConnection`], one method per CDP command the core issues.
pub struct CdpClient {
    conn: Box<dyn CdpConnection>,
}

impl CdpClient {
    pub fn new(conn: Box<dyn CdpConnection>) -> Self {
        Self { conn }
    }

    fn call<T: DeserializeOwned>(&mut self, method: &'static str, params: Value) -> Result<T, CdpError> {
        let result = self.conn.call(method, params)?;
        serde_json::from_value(result).map_err(|e| CdpError::MalformedResponse(e.to_string()))
    }

    fn call_unit(&mut self, method: &'static str, params: Value) -> Result<(), CdpError> {
        self.conn.call(method, params)?;
        Ok(())
    }

    /// Enable the domains the adapter listens on. `Console.enable` is a
    /// back-compat surface, old runtimes require it for `messageAdded`,
    /// new ones reject it.
    pub fn enable_domains(&mut self) -> Result<(), CdpError> {
        self.call_unit("Debugger.enable", json!({}))?;
        self.call_unit("Runtime.enable", json!({}))?;
        if let Err(e) = self.call_unit("Console.enable", json!({})) {
            log::debug!(target: "cdp", "Console.enable rejected: {e}");
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), CdpError> {
        self.call_unit("Debugger.resume", json!({}))
    }

    pub fn pause(&mut self) -> Result<(), CdpError> {
        self.call_unit("Debugger.pause", json!({}))
    }

    pub fn step_over(&mut self) -> Result<(), CdpError> {
        self.call_unit("Debugger.stepOver", json!({}))
    }

    pub fn step_into(&mut self) -> Result<(), CdpError> {
        self.call_unit("Debugger.stepInto", json!({}))
    }

    pub fn step_out(&mut self) -> Result<(), CdpError> {
        self.call_unit("Debugger.stepOut", json!({}))
    }

    pub fn set_breakpoint_by_url(
        &mut self,
        url_regex: &str,
        line: u64,
        column: u64,
        condition: Option<&str>,
    ) -> Result<SetBreakpointByUrlResult, CdpError> {
        let mut params = json!({
            "urlRegex": url_regex,
            "lineNumber": line,
            "columnNumber": column,
        });
        if let Some(cond) = condition {
            params["condition"] = json!(cond);
        }
        self.call("Debugger.setBreakpointByUrl", params)
    }

    pub fn set_breakpoint(
        &mut self,
        script_id: &str,
        line: u64,
        column: u64,
        condition: Option<&str>,
    ) -> Result<SetBreakpointResult, CdpError> {
        let mut params = json!({
            "location": { "scriptId": script_id, "lineNumber": line, "columnNumber": column },
        });
        if let Some(cond) = condition {
            params["condition"] = json!(cond);
        }
        self.call("Debugger.setBreakpoint", params)
    }

    pub fn remove_breakpoint(&mut self, breakpoint_id: &str) -> Result<(), CdpError> {
        self.call_unit("Debugger.removeBreakpoint", json!({ "breakpointId": breakpoint_id }))
    }

    pub fn set_pause_on_exceptions(&mut self, state: PauseOnExceptionsState) -> Result<(), CdpError> {
        self.call_unit(
            "Debugger.setPauseOnExceptions",
            json!({ "state": state.to_string() }),
        )
    }

    pub fn set_blackbox_patterns(&mut self, patterns: &[String]) -> Result<(), CdpError> {
        self.call_unit("Debugger.setBlackboxPatterns", json!({ "patterns": patterns }))
    }

    pub fn set_blackboxed_ranges(
        &mut self,
        script_id: &str,
        positions: &[ScriptPosition],
    ) -> Result<(), CdpError> {
        self.call_unit(
            "Debugger.setBlackboxedRanges",
            json!({ "scriptId": script_id, "positions": positions }),
        )
    }

    pub fn evaluate_on_call_frame(
        &mut self,
        call_frame_id: &str,
        expression: &str,
        return_by_value: bool,
    ) -> Result<EvaluateResult, CdpError> {
        self.call(
            "Debugger.evaluateOnCallFrame",
            json!({
                "callFrameId": call_frame_id,
                "expression": expression,
                "silent": true,
                "generatePreview": true,
                "returnByValue": return_by_value,
            }),
        )
    }

    pub fn evaluate(&mut self, expression: &str, return_by_value: bool) -> Result<EvaluateResult, CdpError> {
        self.call(
            "Runtime.evaluate",
            json!({
                "expression": expression,
                "silent": true,
                "generatePreview": true,
                "returnByValue": return_by_value,
            }),
        )
    }

    pub fn get_properties(
        &mut self,
        object_id: &str,
        own_properties: bool,
        accessor_properties_only: bool,
    ) -> Result<GetPropertiesResult, CdpError> {
        self.call(
            "Runtime.getProperties",
            json!({
                "objectId": object_id,
                "ownProperties": own_properties,
                "accessorPropertiesOnly": accessor_properties_only,
                "generatePreview": true,
            }),
        )
    }

    pub fn call_function_on(
        &mut self,
        object_id: &str,
        declaration: &str,
        arguments: &[CallArgument],
        return_by_value: bool,
    ) -> Result<EvaluateResult, CdpError> {
        self.call(
            "Runtime.callFunctionOn",
            json!({
                "objectId": object_id,
                "functionDeclaration": declaration,
                "arguments": arguments,
                "silent": true,
                "returnByValue": return_by_value,
            }),
        )
    }

    pub fn set_variable_value(
        &mut self,
        call_frame_id: &str,
        scope_number: usize,
        name: &str,
        value: CallArgument,
    ) -> Result<(), CdpError> {
        self.call_unit(
            "Debugger.setVariableValue",
            json!({
                "callFrameId": call_frame_id,
                "scopeNumber": scope_number,
                "variableName": name,
                "newValue": value,
            }),
        )
    }

    pub fn get_script_source(&mut self, script_id: &str) -> Result<String, CdpError> {
        let result: GetScriptSourceResult =
            self.call("Debugger.getScriptSource", json!({ "scriptId": script_id }))?;
        Ok(result.script_source)
    }

    pub fn restart_frame(&mut self, call_frame_id: &str) -> Result<(), CdpError> {
        self.call_unit("Debugger.restartFrame", json!({ "callFrameId": call_frame_id }))
    }
}

/// `Debugger.setPauseOnExceptions` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum PauseOnExceptionsState {
    #[strum(serialize = "all")]
    All,
    #[strum(serialize = "uncaught")]
    Uncaught,
    #[strum(serialize = "none")]
    None,
}

/// Incoming CDP events the adapter consumes.
#[derive(Debug, Clone)]
pub enum CdpEvent {
    ScriptParsed(ScriptParsedEvent),
    Paused(PausedEvent),
    Resumed,
    BreakpointResolved(BreakpointResolvedEvent),
    ExecutionContextsCleared,
    ConsoleMessage(ConsoleMessage),
    Detached { reason: String },
}

impl CdpEvent {
    /// Decode a raw `(method, params)` notification, `None` for events the core ignores.
    pub fn from_message(method: &str, params: Value) -> Option<CdpEvent> {
        let event = match method {
            "Debugger.scriptParsed" => {
                CdpEvent::ScriptParsed(serde_json::from_value(params).ok()?)
            }
            "Debugger.paused" => CdpEvent::Paused(serde_json::from_value(params).ok()?),
            "Debugger.resumed" => CdpEvent::Resumed,
            "Debugger.breakpointResolved" => {
                CdpEvent::BreakpointResolved(serde_json::from_value(params).ok()?)
            }
            "Runtime.executionContextsCleared" => CdpEvent::ExecutionContextsCleared,
            "Console.messageAdded" => {
                let message = params.get("message")?.clone();
                CdpEvent::ConsoleMessage(serde_json::from_value(message).ok()?)
            }
            "Inspector.detached" => CdpEvent::Detached {
                reason: params
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            _ => return None,
        };

        Some(event)
    }
}
