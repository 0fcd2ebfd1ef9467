//! The debug adapter core: a state machine translating DAP requests into CDP
//! commands and CDP events into DAP events.

pub mod breakpoints;
pub mod evaluate;
pub mod handles;
pub mod pause;
pub mod scripts;
pub mod skipfiles;
pub mod variables;

use crate::cdp::types::{
    BreakpointResolvedEvent, CallFrame, ConsoleMessage, PausedEvent, RemoteObject,
    ScriptParsedEvent,
};
use crate::cdp::{CdpClient, CdpEvent, PauseOnExceptionsState};
use crate::dap::requests::{
    AttachArguments, CompletionsArguments, ContinueResponseBody, EvaluateArguments,
    EvaluateResponseBody, InitializeArguments, LaunchArguments, RestartFrameArguments,
    ScopesArguments, ScopesResponseBody, SetBreakpointsArguments, SetBreakpointsResponseBody,
    SetExceptionBreakpointsArguments, SetVariableArguments, SetVariableResponseBody,
    SourceArguments, SourceResponseBody, StackTraceArguments, StackTraceResponseBody,
    ThreadsResponseBody, ToggleSkipFileStatusArguments, VariablesArguments,
    VariablesResponseBody,
};
use crate::dap::types::{Breakpoint, Capabilities, CompletionItem, Thread};
use crate::error::Error;
use crate::transform::{LineNumbering, PathTransformer, SourceMapTransformer};
use crate::weak_error;
use breakpoints::BreakpointManager;
use evaluate::SCRIPTS_COMMAND;
use handles::HandleTable;
use itertools::Itertools;
use pause::{PauseCoordinator, StopReason, StoppedPayload, THREAD_ID};
use scripts::ScriptRegistry;
use skipfiles::SkipFileManager;
use variables::{PropertyFilter, SourceContainer, StackBuildCx, VariableContainer};

/// Events the adapter pushes towards the DAP client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Initialized,
    Stopped {
        reason: String,
        description: String,
        text: Option<String>,
        hit_breakpoint_ids: Vec<i64>,
    },
    Continued,
    Terminated,
    Breakpoint {
        reason: &'static str,
        breakpoint: Breakpoint,
    },
    Output {
        category: &'static str,
        output: String,
        variables_reference: Option<i64>,
    },
}

/// Outgoing event channel, implemented by the session layer (and by test
/// recorders).
pub trait EventSink {
    fn dispatch(&mut self, event: ClientEvent);
}

/// Disjoint borrows of the adapter handed to the managers.
pub struct TargetCx<'a> {
    pub client: &'a mut CdpClient,
    pub paths: &'a dyn PathTransformer,
    pub sourcemaps: &'a dyn SourceMapTransformer,
    pub lines: LineNumbering,
    pub scripts: &'a ScriptRegistry,
}

#[derive(Debug, Clone, Copy)]
struct AdapterConfig {
    source_maps: bool,
    smart_step: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            source_maps: true,
            smart_step: false,
        }
    }
}

/// The adapter state machine. One instance per debug session, driven from a
/// single thread: DAP requests and CDP events interleave only between CDP
/// round-trips.
pub struct DebugAdapter {
    client: CdpClient,
    sink: Box<dyn EventSink>,
    paths: Box<dyn PathTransformer>,
    sourcemaps: Box<dyn SourceMapTransformer>,
    lines: LineNumbering,
    config: AdapterConfig,

    scripts: ScriptRegistry,
    breakpoints: BreakpointManager,
    skip: SkipFileManager,
    pause: PauseCoordinator,

    frames: HandleTable<CallFrame>,
    variables: HandleTable<VariableContainer>,
    sources: HandleTable<SourceContainer>,

    current_stack: Option<Vec<CallFrame>>,
    exception: Option<RemoteObject>,
    last_paused: Option<PausedEvent>,

    attached: bool,
    configured: bool,
    has_terminated: bool,
}

impl DebugAdapter {
    pub fn new(
        client: CdpClient,
        sink: Box<dyn EventSink>,
        paths: Box<dyn PathTransformer>,
        sourcemaps: Box<dyn SourceMapTransformer>,
    ) -> Self {
        DebugAdapter {
            client,
            sink,
            paths,
            sourcemaps,
            lines: LineNumbering::default(),
            config: AdapterConfig::default(),
            scripts: ScriptRegistry::default(),
            breakpoints: BreakpointManager::default(),
            skip: SkipFileManager::default(),
            pause: PauseCoordinator::default(),
            frames: HandleTable::new(1000),
            variables: HandleTable::new(1000),
            sources: HandleTable::new(1),
            current_stack: None,
            exception: None,
            last_paused: None,
            attached: false,
            configured: false,
            has_terminated: false,
        }
    }

    // ---------------------------------- DAP requests ----------------------------------

    pub fn initialize(&mut self, args: InitializeArguments) -> Result<Capabilities, Error> {
        if let Some(format) = &args.path_format {
            if format != "path" {
                return Err(Error::PathFormatUnsupported(format.clone()));
            }
        }

        self.lines = LineNumbering {
            client_lines_start_at1: args.lines_start_at1.unwrap_or(true),
            client_columns_start_at1: args.columns_start_at1.unwrap_or(true),
        };

        Ok(Capabilities::advertised())
    }

    pub fn launch(&mut self, args: LaunchArguments) -> Result<(), Error> {
        self.apply_options(&args.options);
        self.connect_runtime()
    }

    pub fn attach(&mut self, args: AttachArguments) -> Result<(), Error> {
        if args.port.is_none() {
            return Err(Error::MissingAttachPort);
        }
        self.apply_options(&args.options);
        self.connect_runtime()
    }

    fn apply_options(&mut self, options: &crate::dap::requests::SessionOptions) {
        self.config = AdapterConfig {
            source_maps: options.source_maps.unwrap_or(true),
            smart_step: options.smart_step.unwrap_or(false),
        };
        self.skip = SkipFileManager::new(
            options.skip_files.as_deref().unwrap_or_default(),
            options.skip_file_reg_exps.as_deref().unwrap_or_default(),
        );
    }

    fn connect_runtime(&mut self) -> Result<(), Error> {
        self.client.enable_domains()?;
        self.skip.push_patterns(&mut self.client);
        weak_error!(self.client.set_pause_on_exceptions(PauseOnExceptionsState::Uncaught));
        self.attached = true;
        Ok(())
    }

    pub fn configuration_done(&mut self) -> Result<(), Error> {
        self.configured = true;
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), Error> {
        self.terminate();
        Ok(())
    }

    pub fn set_breakpoints(
        &mut self,
        args: &SetBreakpointsArguments,
        request_seq: i64,
    ) -> Result<SetBreakpointsResponseBody, Error> {
        let mut cx = TargetCx {
            client: &mut self.client,
            paths: self.paths.as_ref(),
            sourcemaps: self.sourcemaps.as_ref(),
            lines: self.lines,
            scripts: &self.scripts,
        };
        self.breakpoints.set_breakpoints(&mut cx, args, request_seq, None)
    }

    pub fn set_exception_breakpoints(
        &mut self,
        args: &SetExceptionBreakpointsArguments,
    ) -> Result<(), Error> {
        let state = if args.filters.iter().any(|f| f == "all") {
            PauseOnExceptionsState::All
        } else if args.filters.iter().any(|f| f == "uncaught") {
            PauseOnExceptionsState::Uncaught
        } else {
            PauseOnExceptionsState::None
        };
        self.client.set_pause_on_exceptions(state)?;
        Ok(())
    }

    pub fn continue_request(&mut self) -> Result<ContinueResponseBody, Error> {
        self.require_attached()?;
        self.pause.begin_continue();
        self.client.resume()?;
        Ok(ContinueResponseBody {
            all_threads_continued: true,
        })
    }

    pub fn next(&mut self) -> Result<(), Error> {
        self.require_attached()?;
        self.pause.begin_step(StopReason::Step);
        self.client.step_over()?;
        Ok(())
    }

    pub fn step_in(&mut self) -> Result<(), Error> {
        self.require_attached()?;
        self.pause.begin_step(StopReason::Step);
        self.client.step_into()?;
        Ok(())
    }

    pub fn step_out(&mut self) -> Result<(), Error> {
        self.require_attached()?;
        self.pause.begin_step(StopReason::Step);
        self.client.step_out()?;
        Ok(())
    }

    pub fn pause_request(&mut self) -> Result<(), Error> {
        self.require_attached()?;
        self.pause.begin_pause();
        self.client.pause()?;
        Ok(())
    }

    pub fn threads(&mut self) -> ThreadsResponseBody {
        ThreadsResponseBody {
            threads: vec![Thread {
                id: THREAD_ID,
                name: format!("Thread {THREAD_ID}"),
            }],
        }
    }

    pub fn stack_trace(&mut self, args: &StackTraceArguments) -> Result<StackTraceResponseBody, Error> {
        if self.current_stack.is_none() {
            return Err(Error::StackFrameNotValid);
        }

        let registered = self.frames.iter().map(|(h, f)| (h, f.clone())).collect_vec();
        let stack_frames = if registered.is_empty() {
            vec![variables::unknown_frame()]
        } else {
            let cx = StackBuildCx {
                scripts: &self.scripts,
                paths: self.paths.as_ref(),
                sourcemaps: self.sourcemaps.as_ref(),
                lines: self.lines,
                skip: &self.skip,
                source_maps_enabled: self.config.source_maps,
                smart_step_enabled: self.config.smart_step,
            };
            variables::build_stack_frames(&cx, &mut self.sources, &registered, args.levels)
        };

        Ok(StackTraceResponseBody {
            total_frames: stack_frames.len() as i64,
            stack_frames,
        })
    }

    pub fn scopes(&mut self, args: &ScopesArguments) -> Result<ScopesResponseBody, Error> {
        let is_top = self
            .frames
            .iter()
            .next()
            .is_some_and(|(handle, _)| handle == args.frame_id);
        let frame = self
            .frames
            .get(args.frame_id)
            .cloned()
            .ok_or(Error::StackFrameNotValid)?;

        let exception = if is_top { self.exception.as_ref() } else { None };
        let scopes = variables::scopes_for_frame(&frame, exception, &mut self.variables);
        Ok(ScopesResponseBody { scopes })
    }

    pub fn variables(&mut self, args: &VariablesArguments) -> Result<VariablesResponseBody, Error> {
        let Some(container) = self.variables.get(args.variables_reference).cloned() else {
            // stale handle from a previous pause
            log::debug!(target: "adapter", "unknown variables reference {}", args.variables_reference);
            return Ok(VariablesResponseBody::default());
        };

        let filter = PropertyFilter::from_request(args.filter.as_deref());
        let variables = variables::expand_container(
            &mut self.client,
            &mut self.variables,
            &container,
            filter,
            args.start,
            args.count,
        )?;
        Ok(VariablesResponseBody { variables })
    }

    pub fn source(&mut self, args: &SourceArguments) -> Result<SourceResponseBody, Error> {
        let container = self
            .sources
            .get(args.source_reference)
            .cloned()
            .ok_or(Error::SourceRequestIllegalHandle(args.source_reference))?;

        let content = match container {
            SourceContainer::Inlined { contents, .. } => contents,
            SourceContainer::Script { script_id } => self.client.get_script_source(&script_id)?,
        };
        Ok(SourceResponseBody { content })
    }

    pub fn evaluate(&mut self, args: &EvaluateArguments) -> Result<EvaluateResponseBody, Error> {
        if args.expression.starts_with(SCRIPTS_COMMAND) {
            return self.scripts_meta_command(args);
        }

        self.require_attached()?;
        self.pause.settle_before_evaluate();

        let result = match args.frame_id {
            Some(frame_id) => {
                let frame = self.frames.get(frame_id).ok_or(Error::StackFrameNotValid)?;
                let call_frame_id = frame.call_frame_id.clone();
                self.client
                    .evaluate_on_call_frame(&call_frame_id, &args.expression, false)?
            }
            None => self.client.evaluate(&args.expression, false)?,
        };

        let repl = args.context.as_deref() == Some("repl");
        if let Some(details) = result.exception_details {
            let mut message = details.message();
            if !repl && message.starts_with("ReferenceError: ") {
                message = "not available".to_string();
            }
            return Err(Error::EvaluateFailed(message));
        }

        let variable = variables::remote_object_to_variable(
            &mut self.client,
            &mut self.variables,
            "",
            &args.expression,
            &result.result,
            !repl,
        );
        Ok(EvaluateResponseBody {
            result: variable.value,
            variables_reference: variable.variables_reference,
        })
    }

    fn scripts_meta_command(&mut self, args: &EvaluateArguments) -> Result<EvaluateResponseBody, Error> {
        let arg = args.expression[SCRIPTS_COMMAND.len()..].trim();

        let output = if arg.is_empty() {
            evaluate::format_scripts_listing(
                self.scripts.all(),
                self.paths.as_ref(),
                self.sourcemaps.as_ref(),
            )
        } else {
            match self.scripts.get_by_url(arg) {
                Some(script) => {
                    let script_id = script.script_id.clone();
                    evaluate::truncate_source(&self.client.get_script_source(&script_id)?)
                }
                None => format!("No known script with url {arg}\n"),
            }
        };

        self.sink.dispatch(ClientEvent::Output {
            category: "stdout",
            output,
            variables_reference: None,
        });
        Ok(EvaluateResponseBody::default())
    }

    pub fn set_variable(&mut self, args: &SetVariableArguments) -> Result<SetVariableResponseBody, Error> {
        let container = self
            .variables
            .get(args.variables_reference)
            .cloned()
            .ok_or(Error::SetValueNotSupported)?;

        let value =
            variables::set_container_value(&mut self.client, &container, &args.name, &args.value)?;
        Ok(SetVariableResponseBody { value })
    }

    pub fn completions(&mut self, args: &CompletionsArguments) -> Result<Vec<CompletionItem>, Error> {
        let (expr, _partial) = evaluate::split_completion_prefix(&args.text, args.column);

        let labels = match expr {
            Some(expr) => {
                let walk = evaluate::proto_walk_expression(&expr);
                let result = match args.frame_id {
                    Some(frame_id) => {
                        let frame = self.frames.get(frame_id).ok_or(Error::StackFrameNotValid)?;
                        let call_frame_id = frame.call_frame_id.clone();
                        self.client.evaluate_on_call_frame(&call_frame_id, &walk, true)?
                    }
                    None => self.client.evaluate(&walk, true)?,
                };

                if result.exception_details.is_some() {
                    Vec::new()
                } else {
                    evaluate::flatten_completion_names(
                        result.result.value.as_ref().unwrap_or(&serde_json::Value::Null),
                    )
                }
            }
            None => {
                let frame = args
                    .frame_id
                    .and_then(|id| self.frames.get(id))
                    .or_else(|| self.frames.iter().next().map(|(_, f)| f))
                    .cloned();
                match frame {
                    Some(frame) => variables::scope_variable_names(&mut self.client, &frame)?,
                    None => Vec::new(),
                }
            }
        };

        Ok(labels
            .into_iter()
            .map(|label| CompletionItem {
                label,
                r#type: Some("property"),
            })
            .collect())
    }

    pub fn restart_frame(&mut self, args: &RestartFrameArguments) -> Result<(), Error> {
        let frame = self
            .frames
            .get(args.frame_id)
            .ok_or(Error::StackFrameNotValid)?;
        let call_frame_id = frame.call_frame_id.clone();

        self.client.restart_frame(&call_frame_id)?;
        self.pause.begin_step(StopReason::FrameEntry);
        self.client.step_into()?;
        Ok(())
    }

    pub fn toggle_skip_file_status(&mut self, args: &ToggleSkipFileStatusArguments) -> Result<(), Error> {
        let Some(path) = args.path.as_deref() else {
            return Ok(());
        };

        if !self.path_in_stack(path) {
            log::info!(target: "adapter", "can't toggle skip status, {path} is not in the current stack");
            return Ok(());
        }

        // only authored sources of a mapped script are toggleable
        if self.scripts.get_by_url(path).is_some()
            && !self.sourcemaps.authored_sources(path).is_empty()
        {
            log::info!(target: "adapter", "can't toggle skip status of {path}, toggle its authored sources instead");
            return Ok(());
        }

        if self.skip.is_skipped(path) {
            self.skip.disable_skip(path);
        } else {
            self.skip.enable_skip(path);
        }

        let generated_url = self
            .sourcemaps
            .generated_url_for(path)
            .unwrap_or_else(|| path.to_string());
        if let Some(script) = self.scripts.get_by_url(&generated_url) {
            let script_id = script.script_id.clone();
            let details = self.sourcemaps.source_details(&generated_url);
            let parent_skipped = self.skip.is_skipped(&generated_url);
            let positions = self.skip.library_positions(&details, parent_skipped);
            self.skip.push_ranges(&mut self.client, &script_id, &positions);
        }
        self.skip.push_patterns(&mut self.client);

        // replay the stop so the client re-fetches the deemphasized stack
        if let Some(ev) = self.last_paused.clone() {
            self.handle_paused(ev, true)?;
        }
        Ok(())
    }

    fn path_in_stack(&self, path: &str) -> bool {
        let wanted = ScriptRegistry::normalize_url(path);
        let Some(stack) = &self.current_stack else {
            return false;
        };

        stack.iter().any(|frame| {
            let Some(script) = self.scripts.get_by_id(&frame.location.script_id) else {
                return false;
            };
            if ScriptRegistry::normalize_url(&script.url) == wanted {
                return true;
            }
            if let Some(client_path) = self.paths.target_url_to_client_path(&script.url) {
                if ScriptRegistry::normalize_url(&client_path) == wanted {
                    return true;
                }
            }
            self.sourcemaps
                .authored_sources(&script.url)
                .iter()
                .any(|authored| ScriptRegistry::normalize_url(authored) == wanted)
        })
    }

    fn require_attached(&self) -> Result<(), Error> {
        if !self.attached || self.has_terminated {
            return Err(Error::RuntimeNotConnected);
        }
        Ok(())
    }

    // ---------------------------------- CDP events ----------------------------------

    pub fn on_cdp_event(&mut self, event: CdpEvent) {
        match event {
            CdpEvent::ScriptParsed(ev) => self.on_script_parsed(ev),
            CdpEvent::Paused(ev) => {
                weak_error!(self.handle_paused(ev, false));
            }
            CdpEvent::Resumed => self.on_resumed(),
            CdpEvent::BreakpointResolved(ev) => self.on_breakpoint_resolved(&ev),
            CdpEvent::ExecutionContextsCleared => self.on_contexts_cleared(),
            CdpEvent::ConsoleMessage(msg) => self.on_console_message(msg),
            CdpEvent::Detached { reason } => {
                log::info!(target: "adapter", "runtime detached: {reason}");
                self.terminate();
            }
        }
    }

    fn on_script_parsed(&mut self, ev: ScriptParsedEvent) {
        if ScriptRegistry::is_extension_url(&ev.url) {
            log::debug!(target: "adapter", "ignoring extension script {}", ev.url);
            return;
        }

        let url = if ev.url.is_empty() {
            ScriptRegistry::placeholder_url(&ev.script_id)
        } else {
            ev.url.clone()
        };
        let url = self.paths.script_parsed(&url);

        self.scripts
            .register(ev.script_id.clone(), url.clone(), ev.source_map_url.clone());

        // pending breakpoints may be keyed by an authored source, by the raw
        // URL or by the client path of this script
        let mut candidates = self
            .sourcemaps
            .script_parsed(&url, ev.source_map_url.as_deref());
        if let Some(client_path) = self.paths.target_url_to_client_path(&url) {
            candidates.push(client_path);
        }
        candidates.push(url);

        self.resolve_pending_breakpoints(&candidates);
    }

    fn resolve_pending_breakpoints(&mut self, candidates: &[String]) {
        while let Some(pending) = self.breakpoints.take_pending(candidates) {
            let mut cx = TargetCx {
                client: &mut self.client,
                paths: self.paths.as_ref(),
                sourcemaps: self.sourcemaps.as_ref(),
                lines: self.lines,
                scripts: &self.scripts,
            };
            match self.breakpoints.set_breakpoints(
                &mut cx,
                &pending.args,
                pending.request_seq,
                Some(pending.ids),
            ) {
                Ok(body) => {
                    for breakpoint in body.breakpoints {
                        self.sink.dispatch(ClientEvent::Breakpoint {
                            reason: "changed",
                            breakpoint,
                        });
                    }
                }
                Err(e) => log::warn!(target: "adapter", "pending breakpoints resolution: {e:#}"),
            }
        }
    }

    fn handle_paused(&mut self, ev: PausedEvent, replay: bool) -> Result<(), Error> {
        // every pause opens a fresh handle window
        self.frames.reset();
        self.variables.reset();
        self.exception = None;
        self.current_stack = None;

        let call_frames: Vec<CallFrame> = match serde_json::from_value(ev.call_frames.clone()) {
            Ok(frames) => frames,
            Err(e) => {
                log::warn!(target: "adapter", "malformed call frames in paused event: {e}");
                Vec::new()
            }
        };

        let expected = self.pause.take_expected_stop();
        let mut hit_breakpoint_ids = Vec::new();
        let mut text = None;

        let reason = if ev.reason == "exception" {
            let exception: Option<RemoteObject> =
                ev.data.clone().and_then(|data| serde_json::from_value(data).ok());
            text = exception
                .as_ref()
                .and_then(|e| e.description.clone().or_else(|| e.value.as_ref().map(|v| v.to_string())));
            self.exception = exception;
            StopReason::Exception
        } else if let Some(hit) = ev.hit_breakpoints.as_ref().filter(|h| !h.is_empty()) {
            let user_induced = expected.is_some();
            if !replay && self.breakpoints.filter_hit_breakpoints(hit, user_induced) {
                // the hit conditions voted no: stay silent and keep running
                self.pause.begin_internal_resume();
                weak_error!(self.client.resume());
                return Ok(());
            }
            hit_breakpoint_ids = self.breakpoints.client_ids(hit);
            StopReason::Breakpoint
        } else if let Some(expected) = expected {
            expected
        } else if !self.configured {
            StopReason::Entry
        } else {
            StopReason::DebuggerStatement
        };

        if !replay
            && self.config.source_maps
            && self.config.smart_step
            && PauseCoordinator::smart_step_candidate(&reason)
            && !self.top_frame_mapped(&call_frames)
        {
            self.pause.count_smart_step();
            self.pause.expect_stop(StopReason::Step);
            self.pause.begin_internal_resume();
            self.client.step_into()?;
            return Ok(());
        }

        let skipped = self.pause.take_smart_step_count();
        if skipped > 0 {
            log::info!(target: "adapter", "Skipped {skipped} steps");
        }

        for frame in &call_frames {
            self.frames.create(frame.clone());
        }
        self.current_stack = Some(call_frames);
        self.last_paused = Some(ev);

        let payload = StoppedPayload {
            reason,
            text,
            hit_breakpoint_ids,
        };
        if let Some(payload) = self.pause.gate(payload) {
            self.emit_stopped(payload);
        }
        Ok(())
    }

    fn top_frame_mapped(&self, call_frames: &[CallFrame]) -> bool {
        let Some(top) = call_frames.first() else {
            return true;
        };
        let Some(script) = self.scripts.get_by_id(&top.location.script_id) else {
            return false;
        };
        self.sourcemaps
            .generated_to_authored(
                &script.url,
                top.location.line_number,
                top.location.column_number.unwrap_or(0),
            )
            .is_some()
    }

    fn on_resumed(&mut self) {
        self.current_stack = None;
        if self.pause.on_resumed() {
            self.sink.dispatch(ClientEvent::Continued);
        }
    }

    fn on_breakpoint_resolved(&mut self, ev: &BreakpointResolvedEvent) {
        let cx = TargetCx {
            client: &mut self.client,
            paths: self.paths.as_ref(),
            sourcemaps: self.sourcemaps.as_ref(),
            lines: self.lines,
            scripts: &self.scripts,
        };
        if let Some(breakpoint) = self.breakpoints.on_breakpoint_resolved(&cx, ev) {
            self.sink.dispatch(ClientEvent::Breakpoint {
                reason: "changed",
                breakpoint,
            });
        }
    }

    fn on_contexts_cleared(&mut self) {
        log::debug!(target: "adapter", "execution contexts cleared, dropping scripts and breakpoints");
        self.scripts.clear();
        self.breakpoints.reset_committed();
    }

    fn on_console_message(&mut self, msg: ConsoleMessage) {
        let category = match msg.level.as_str() {
            "error" => "stderr",
            "warning" => "console",
            _ => "stdout",
        };

        let params = msg.parameters.unwrap_or_default();
        let variables_reference = (params.len() > 1)
            .then(|| self.variables.create(VariableContainer::LoggedObjects { args: params }));

        let mut output = msg.text;
        if !output.ends_with('\n') {
            output.push('\n');
        }

        self.sink.dispatch(ClientEvent::Output {
            category,
            output,
            variables_reference,
        });
    }

    // ---------------------------------- coordination ----------------------------------

    /// The session wrote the response of the request that induced the pending
    /// stop; release it.
    pub fn notify_response_sent(&mut self) {
        if let Some(payload) = self.pause.acknowledge_response() {
            self.emit_stopped(payload);
        }
    }

    /// Periodic tick: release a deferred stop whose gate expired.
    pub fn flush_expired_stop(&mut self) {
        if let Some(payload) = self.pause.flush_expired() {
            self.emit_stopped(payload);
        }
    }

    fn emit_stopped(&mut self, payload: StoppedPayload) {
        self.sink.dispatch(ClientEvent::Stopped {
            reason: payload.reason.token().to_string(),
            description: payload.reason.description(),
            text: payload.text,
            hit_breakpoint_ids: payload.hit_breakpoint_ids,
        });
    }

    /// Whether the `initialized` event may be emitted (all initial source-map
    /// work settled).
    pub fn initialized_ready(&self) -> bool {
        self.sourcemaps.outstanding_work() == 0
    }

    pub fn emit_initialized(&mut self) {
        self.sink.dispatch(ClientEvent::Initialized);
    }

    /// Idempotent session teardown.
    pub fn terminate(&mut self) {
        if !self.has_terminated {
            self.has_terminated = true;
            self.sink.dispatch(ClientEvent::Terminated);
        }
    }

    pub fn has_terminated(&self) -> bool {
        self.has_terminated
    }
}
