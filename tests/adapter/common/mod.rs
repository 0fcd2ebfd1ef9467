//! Test harness: a scripted CDP connection recording the full call trace and
//! a sink recording every event the adapter emits.

use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use webdbg::adapter::{ClientEvent, DebugAdapter, EventSink};
use webdbg::cdp::{CdpClient, CdpConnection, CdpError, CdpEvent};
use webdbg::dap::requests::{
    LaunchArguments, SetBreakpointsArguments, SetBreakpointsSource, SourceBreakpoint,
};
use webdbg::transform::{
    AuthoredLocation, GeneratedLocation, NoSourceMaps, PathTransformer, SourceDetail,
    SourceMapTransformer,
};

pub type Trace = Arc<Mutex<Vec<(String, Value)>>>;
pub type Responses = Arc<Mutex<HashMap<&'static str, VecDeque<Value>>>>;

/// CDP connection returning queued responses, falling back to sane defaults.
pub struct ScriptedCdp {
    trace: Trace,
    responses: Responses,
    next_breakpoint: u64,
}

impl ScriptedCdp {
    fn default_response(&mut self, method: &str, params: &Value) -> Value {
        match method {
            "Debugger.setBreakpointByUrl" => {
                self.next_breakpoint += 1;
                json!({ "breakpointId": format!("bp{}", self.next_breakpoint), "locations": [] })
            }
            "Debugger.setBreakpoint" => {
                self.next_breakpoint += 1;
                json!({
                    "breakpointId": format!("bp{}", self.next_breakpoint),
                    "actualLocation": params["location"],
                })
            }
            "Runtime.getProperties" => json!({ "result": [] }),
            "Runtime.evaluate" | "Debugger.evaluateOnCallFrame" | "Runtime.callFunctionOn" => {
                json!({ "result": { "type": "undefined" } })
            }
            "Debugger.getScriptSource" => json!({ "scriptSource": "" }),
            _ => json!({}),
        }
    }
}

impl CdpConnection for ScriptedCdp {
    fn call(&mut self, method: &'static str, params: Value) -> Result<Value, CdpError> {
        self.trace
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        let queued = self
            .responses
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        if let Some(response) = queued {
            if let Some(message) = response.get("__error__").and_then(Value::as_str) {
                return Err(CdpError::Command {
                    method,
                    message: message.to_string(),
                });
            }
            return Ok(response);
        }

        Ok(self.default_response(method, &params))
    }
}

pub struct RecordingSink {
    events: Arc<Mutex<Vec<ClientEvent>>>,
}

impl EventSink for RecordingSink {
    fn dispatch(&mut self, event: ClientEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Path transformer that resolves client paths only against already parsed
/// script URLs, like a real workspace resolver would.
#[derive(Default)]
pub struct TestPaths {
    known: Arc<Mutex<Vec<String>>>,
}

impl PathTransformer for TestPaths {
    fn script_parsed(&mut self, url: &str) -> String {
        self.known.lock().unwrap().push(url.to_string());
        url.to_string()
    }

    fn client_path_to_target_url(&self, path: &str) -> Option<String> {
        self.known
            .lock()
            .unwrap()
            .iter()
            .find(|url| *url == path || url.ends_with(path))
            .cloned()
    }

    fn target_url_to_client_path(&self, url: &str) -> Option<String> {
        Some(url.strip_prefix("file://").unwrap_or(url).to_string())
    }
}

/// Source-map transformer backed by a static generated-url -> authored-paths
/// table. Positions map through unchanged.
#[derive(Default)]
pub struct TestSourceMaps {
    pub mappings: HashMap<String, Vec<String>>,
    pub details: HashMap<String, Vec<SourceDetail>>,
    pub contents: HashMap<String, String>,
}

impl SourceMapTransformer for TestSourceMaps {
    fn script_parsed(&mut self, url: &str, _source_map_url: Option<&str>) -> Vec<String> {
        self.mappings.get(url).cloned().unwrap_or_default()
    }

    fn authored_to_generated(&self, path: &str, line: u64, column: u64) -> Option<GeneratedLocation> {
        self.mappings.iter().find_map(|(url, authored)| {
            authored.iter().any(|a| a == path).then(|| GeneratedLocation {
                url: url.clone(),
                line,
                column,
            })
        })
    }

    fn generated_to_authored(&self, url: &str, line: u64, column: u64) -> Option<AuthoredLocation> {
        self.mappings
            .get(url)
            .and_then(|authored| authored.first())
            .map(|path| AuthoredLocation {
                path: path.clone(),
                line,
                column,
            })
    }

    fn authored_sources(&self, url: &str) -> Vec<String> {
        self.mappings.get(url).cloned().unwrap_or_default()
    }

    fn source_details(&self, url: &str) -> Vec<SourceDetail> {
        self.details.get(url).cloned().unwrap_or_default()
    }

    fn generated_url_for(&self, authored_path: &str) -> Option<String> {
        self.mappings.iter().find_map(|(url, authored)| {
            authored.iter().any(|a| a == authored_path).then(|| url.clone())
        })
    }

    fn source_content(&self, authored_path: &str) -> Option<String> {
        self.contents.get(authored_path).cloned()
    }
}

pub struct TestSession {
    pub adapter: DebugAdapter,
    pub events: Arc<Mutex<Vec<ClientEvent>>>,
    pub trace: Trace,
    pub responses: Responses,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_sourcemaps(Box::new(NoSourceMaps))
    }

    pub fn with_sourcemaps(sourcemaps: Box<dyn SourceMapTransformer>) -> Self {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let responses: Responses = Arc::new(Mutex::new(HashMap::new()));
        let events = Arc::new(Mutex::new(Vec::new()));

        let connection = ScriptedCdp {
            trace: trace.clone(),
            responses: responses.clone(),
            next_breakpoint: 0,
        };
        let adapter = DebugAdapter::new(
            CdpClient::new(Box::new(connection)),
            Box::new(RecordingSink {
                events: events.clone(),
            }),
            Box::new(TestPaths::default()),
            sourcemaps,
        );

        TestSession {
            adapter,
            events,
            trace,
            responses,
        }
    }

    pub fn launch(&mut self) {
        self.launch_with(LaunchArguments::default());
    }

    pub fn launch_with(&mut self, args: LaunchArguments) {
        self.adapter
            .initialize(Default::default())
            .expect("initialize");
        self.adapter.launch(args).expect("launch");
        self.adapter.configuration_done().expect("configurationDone");
        self.clear_trace();
        self.clear_events();
    }

    /// Queue the next response for a CDP method.
    pub fn respond(&self, method: &'static str, response: Value) {
        self.responses
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(response);
    }

    pub fn methods(&self) -> Vec<String> {
        self.trace.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.trace
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn clear_trace(&self) {
        self.trace.lock().unwrap().clear();
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn stopped_reasons(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|ev| match ev {
                ClientEvent::Stopped { reason, .. } => Some(reason),
                _ => None,
            })
            .collect()
    }

    // ---------------------------------- CDP event injection ----------------------------------

    pub fn cdp_event(&mut self, method: &str, params: Value) {
        let event = CdpEvent::from_message(method, params).expect("known CDP event");
        self.adapter.on_cdp_event(event);
    }

    pub fn script_parsed(&mut self, script_id: &str, url: &str) {
        self.cdp_event(
            "Debugger.scriptParsed",
            json!({ "scriptId": script_id, "url": url }),
        );
    }

    pub fn resumed(&mut self) {
        self.cdp_event("Debugger.resumed", json!({}));
    }

    pub fn paused(&mut self, params: Value) {
        self.cdp_event("Debugger.paused", params);
    }

    /// A minimal paused payload with a single call frame.
    pub fn paused_params(script_id: &str, line: u64) -> Value {
        json!({
            "reason": "other",
            "callFrames": [Self::call_frame("cf0", script_id, line)],
        })
    }

    pub fn call_frame(call_frame_id: &str, script_id: &str, line: u64) -> Value {
        json!({
            "callFrameId": call_frame_id,
            "functionName": "main",
            "location": { "scriptId": script_id, "lineNumber": line, "columnNumber": 0 },
            "scopeChain": [
                { "type": "local", "object": { "type": "object", "objectId": "scope:local" } },
                { "type": "global", "object": { "type": "object", "objectId": "scope:global" } },
            ],
            "this": { "type": "object", "objectId": "this:0" },
        })
    }

    // ---------------------------------- request helpers ----------------------------------

    pub fn breakpoints_args(path: &str, lines: &[u64]) -> SetBreakpointsArguments {
        SetBreakpointsArguments {
            source: SetBreakpointsSource {
                name: None,
                path: Some(path.to_string()),
                source_reference: None,
            },
            breakpoints: lines
                .iter()
                .map(|&line| SourceBreakpoint {
                    line,
                    column: None,
                    condition: None,
                    hit_condition: None,
                })
                .collect(),
        }
    }
}
