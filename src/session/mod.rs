//! Session pump: merges DAP requests and CDP events into the single-threaded
//! adapter and writes responses/events back over the framed transport.

mod logger;

pub use logger::DapLogger;

use crate::adapter::pause::THREAD_ID;
use crate::adapter::{ClientEvent, DebugAdapter, EventSink};
use crate::cdp::CdpEvent;
use crate::dap::io::{DapReader, DapWriter};
use crate::dap::protocol::{DapEvent, DapRequest, DapResponse};
use crate::dap::requests::*;
use serde::Serialize;
use serde_json::{Value, json};
use std::io::{BufRead, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything that can wake the session loop.
pub enum SessionInput {
    Request(DapRequest),
    CdpEvent(CdpEvent),
    CdpClosed,
    DapClosed,
}

pub fn session_channel() -> (Sender<SessionInput>, Receiver<SessionInput>) {
    channel()
}

/// Read framed DAP requests off `reader` into the session channel. Runs until
/// the stream closes.
pub fn spawn_dap_reader<R: BufRead + Send + 'static>(
    reader: R,
    tx: Sender<SessionInput>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut reader = DapReader::new(reader);
        loop {
            let message = match reader.read_message() {
                Ok(message) => message,
                Err(e) => {
                    log::debug!(target: "session", "DAP stream closed: {e:#}");
                    _ = tx.send(SessionInput::DapClosed);
                    break;
                }
            };
            match serde_json::from_value::<DapRequest>(message) {
                Ok(request) => {
                    if tx.send(SessionInput::Request(request)).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!(target: "session", "malformed DAP request: {e}"),
            }
        }
    })
}

struct WriterInner<W: Write> {
    writer: DapWriter<W>,
    seq: i64,
}

/// Shared, sequence-stamping writer half of the DAP connection. Events can be
/// emitted from the logger while a response is being produced, hence the lock.
pub struct SharedWriter<W: Write> {
    inner: Arc<Mutex<WriterInner<W>>>,
}

impl<W: Write> Clone for SharedWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<W: Write> SharedWriter<W> {
    pub fn new(stream: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WriterInner {
                writer: DapWriter::new(stream),
                seq: 1,
            })),
        }
    }

    fn send<T: Serialize>(&self, build: impl FnOnce(i64) -> T) {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.seq;
        inner.seq += 1;
        let message = build(seq);
        if let Err(e) = inner.writer.write_message(&message) {
            log::debug!(target: "session", "write failed: {e:#}");
        }
    }

    pub fn send_event(&self, event: &'static str, body: Option<Value>) {
        self.send(|seq| DapEvent {
            seq,
            r#type: "event",
            event,
            body,
        });
    }

    pub fn respond_success(&self, request_seq: i64, command: &str, body: Option<Value>) {
        log::debug!(target: "session", "success {request_seq}: {command}");
        self.send(|seq| DapResponse {
            seq,
            r#type: "response",
            request_seq,
            success: true,
            command: command.to_string(),
            message: None,
            body,
        });
    }

    pub fn respond_error(&self, request_seq: i64, command: &str, error: impl Into<String>) {
        let error = error.into();
        log::debug!(target: "session", "error {request_seq}: {error}");
        self.send(|seq| DapResponse {
            seq,
            r#type: "response",
            request_seq,
            success: false,
            command: command.to_string(),
            message: Some(error),
            body: None,
        });
    }
}

/// Event sink mapping adapter events onto DAP event envelopes.
pub struct WriterSink<W: Write> {
    out: SharedWriter<W>,
}

impl<W: Write> WriterSink<W> {
    pub fn new(out: SharedWriter<W>) -> Self {
        Self { out }
    }
}

impl<W: Write> EventSink for WriterSink<W> {
    fn dispatch(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Initialized => self.out.send_event("initialized", None),
            ClientEvent::Stopped {
                reason,
                description,
                text,
                hit_breakpoint_ids,
            } => {
                let mut body = json!({
                    "reason": reason,
                    "description": description,
                    "threadId": THREAD_ID,
                    "allThreadsStopped": true,
                    "hitBreakpointIds": hit_breakpoint_ids,
                });
                if let Some(text) = text {
                    body["text"] = json!(text);
                }
                self.out.send_event("stopped", Some(body));
            }
            ClientEvent::Continued => self.out.send_event(
                "continued",
                Some(json!({ "threadId": THREAD_ID, "allThreadsContinued": true })),
            ),
            ClientEvent::Terminated => self.out.send_event("terminated", None),
            ClientEvent::Breakpoint { reason, breakpoint } => self.out.send_event(
                "breakpoint",
                Some(json!({ "reason": reason, "breakpoint": breakpoint })),
            ),
            ClientEvent::Output {
                category,
                output,
                variables_reference,
            } => {
                let mut body = json!({ "category": category, "output": output });
                if let Some(reference) = variables_reference {
                    body["variablesReference"] = json!(reference);
                }
                self.out.send_event("output", Some(body));
            }
        }
    }
}

/// One DAP session over one adapter.
pub struct DapSession<W: Write + Send + 'static> {
    adapter: DebugAdapter,
    out: SharedWriter<W>,
    inputs: Receiver<SessionInput>,
    want_initialized: bool,
}

impl<W: Write + Send + 'static> DapSession<W> {
    pub fn new(adapter: DebugAdapter, out: SharedWriter<W>, inputs: Receiver<SessionInput>) -> Self {
        Self {
            adapter,
            out,
            inputs,
            want_initialized: false,
        }
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        let logger = DapLogger::new(self.out.clone());
        let filter = logger.filter();
        crate::log::switch(logger, filter);

        loop {
            match self.inputs.recv_timeout(Duration::from_millis(50)) {
                Ok(SessionInput::Request(request)) => {
                    if !self.handle_request(request) {
                        break;
                    }
                }
                Ok(SessionInput::CdpEvent(event)) => self.adapter.on_cdp_event(event),
                Ok(SessionInput::CdpClosed) => self.adapter.terminate(),
                Ok(SessionInput::DapClosed) => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            self.adapter.flush_expired_stop();

            if self.want_initialized && self.adapter.initialized_ready() {
                self.want_initialized = false;
                self.adapter.emit_initialized();
            }
        }

        log::debug!(target: "session", "session loop exiting");
        Ok(())
    }

    /// Route one request; returns `false` when the session must end.
    fn handle_request(&mut self, request: DapRequest) -> bool {
        let seq = request.seq;
        let command = request.command.clone();
        log::debug!(target: "session", "{seq}: {command}");

        macro_rules! args_or_fail {
            ($ty: ty) => {
                match serde_json::from_value::<$ty>(request.arguments) {
                    Ok(args) => args,
                    Err(e) => {
                        self.out
                            .respond_error(seq, &command, format!("invalid arguments: {e}"));
                        return true;
                    }
                }
            };
        }

        match command.as_str() {
            "initialize" => {
                let args = args_or_fail!(InitializeArguments);
                let result = self.adapter.initialize(args);
                self.simple(seq, &command, result.map(|caps| Some(json!(caps))));
            }
            "launch" => {
                let args = args_or_fail!(LaunchArguments);
                let result = self.adapter.launch(args);
                let launched = result.is_ok();
                self.simple(seq, &command, result.map(|()| None));
                if launched {
                    self.want_initialized = true;
                }
            }
            "attach" => {
                let args = args_or_fail!(AttachArguments);
                let result = self.adapter.attach(args);
                let attached = result.is_ok();
                self.simple(seq, &command, result.map(|()| None));
                if attached {
                    self.want_initialized = true;
                }
            }
            "configurationDone" => {
                let result = self.adapter.configuration_done();
                self.simple(seq, &command, result.map(|()| None));
            }
            "disconnect" => {
                _ = self.adapter.disconnect();
                self.out.respond_success(seq, &command, None);
                return false;
            }
            "setBreakpoints" => {
                let args = args_or_fail!(SetBreakpointsArguments);
                let result = self.adapter.set_breakpoints(&args, seq);
                self.simple(seq, &command, result.map(|body| Some(json!(body))));
            }
            "setExceptionBreakpoints" => {
                let args = args_or_fail!(SetExceptionBreakpointsArguments);
                let result = self.adapter.set_exception_breakpoints(&args);
                self.simple(seq, &command, result.map(|()| None));
            }
            "continue" => {
                let result = self.adapter.continue_request();
                self.simple(seq, &command, result.map(|body| Some(json!(body))));
                self.adapter.notify_response_sent();
            }
            "next" => {
                let result = self.adapter.next();
                self.simple(seq, &command, result.map(|()| None));
                self.adapter.notify_response_sent();
            }
            "stepIn" => {
                let result = self.adapter.step_in();
                self.simple(seq, &command, result.map(|()| None));
                self.adapter.notify_response_sent();
            }
            "stepOut" => {
                let result = self.adapter.step_out();
                self.simple(seq, &command, result.map(|()| None));
                self.adapter.notify_response_sent();
            }
            "pause" => {
                let result = self.adapter.pause_request();
                self.simple(seq, &command, result.map(|()| None));
                self.adapter.notify_response_sent();
            }
            "stackTrace" => {
                let args = args_or_fail!(StackTraceArguments);
                let result = self.adapter.stack_trace(&args);
                self.simple(seq, &command, result.map(|body| Some(json!(body))));
            }
            "scopes" => {
                let args = args_or_fail!(ScopesArguments);
                let result = self.adapter.scopes(&args);
                self.simple(seq, &command, result.map(|body| Some(json!(body))));
            }
            "variables" => {
                let args = args_or_fail!(VariablesArguments);
                let result = self.adapter.variables(&args);
                self.simple(seq, &command, result.map(|body| Some(json!(body))));
            }
            "source" => {
                let args = args_or_fail!(SourceArguments);
                let result = self.adapter.source(&args);
                self.simple(seq, &command, result.map(|body| Some(json!(body))));
            }
            "threads" => {
                let body = self.adapter.threads();
                self.out.respond_success(seq, &command, Some(json!(body)));
            }
            "evaluate" => {
                let args = args_or_fail!(EvaluateArguments);
                let result = self.adapter.evaluate(&args);
                self.simple(seq, &command, result.map(|body| Some(json!(body))));
            }
            "setVariable" => {
                let args = args_or_fail!(SetVariableArguments);
                let result = self.adapter.set_variable(&args);
                self.simple(seq, &command, result.map(|body| Some(json!(body))));
            }
            "completions" => {
                let args = args_or_fail!(CompletionsArguments);
                let result = self.adapter.completions(&args);
                self.simple(
                    seq,
                    &command,
                    result.map(|targets| Some(json!(CompletionsResponseBody { targets }))),
                );
            }
            "restartFrame" => {
                let args = args_or_fail!(RestartFrameArguments);
                let result = self.adapter.restart_frame(&args);
                self.simple(seq, &command, result.map(|()| None));
                self.adapter.notify_response_sent();
            }
            "toggleSkipFileStatus" => {
                let args = args_or_fail!(ToggleSkipFileStatusArguments);
                let result = self.adapter.toggle_skip_file_status(&args);
                self.simple(seq, &command, result.map(|()| None));
            }
            _ => {
                log::warn!(target: "session", "unknown command: {command}");
                self.out
                    .respond_error(seq, &command, format!("unsupported command {command}"));
            }
        }

        true
    }

    fn simple(&self, seq: i64, command: &str, result: Result<Option<Value>, crate::Error>) {
        match result {
            Ok(body) => self.out.respond_success(seq, command, body),
            Err(e) => self.out.respond_error(seq, command, e.to_string()),
        }
    }
}
