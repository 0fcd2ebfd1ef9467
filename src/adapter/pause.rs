//! Pause/resume/step coordination.
//!
//! The debuggee is monothreaded, one fixed DAP thread id is reported. The
//! coordinator classifies CDP pause reasons, counts smart-step skips and owns
//! the two timing disciplines around stops: a stopped event caused by a
//! step/continue/pause request is not emitted before that request's response
//! (bounded by 300 ms), and evaluations right after a step resume wait out a
//! 50 ms settle delay.

use std::time::{Duration, Instant};

/// The only thread id this adapter reports.
pub const THREAD_ID: i64 = 1;

/// How long a stopped event waits for its inducing request's response.
pub const STOPPED_GATE_TIMEOUT: Duration = Duration::from_millis(300);

/// Settle delay between a step resume and the next evaluation.
pub const POST_RESUME_SETTLE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Exception,
    Breakpoint,
    DebuggerStatement,
    FrameEntry,
    Step,
    UserRequest,
    Other(String),
}

impl StopReason {
    /// The DAP `reason` token.
    pub fn token(&self) -> &str {
        match self {
            StopReason::Entry => "entry",
            StopReason::Exception => "exception",
            StopReason::Breakpoint => "breakpoint",
            StopReason::DebuggerStatement => "debugger",
            StopReason::FrameEntry => "frame_entry",
            StopReason::Step => "step",
            StopReason::UserRequest => "user_request",
            StopReason::Other(raw) => raw,
        }
    }

    /// Human readable form shown by clients that display the description.
    pub fn description(&self) -> String {
        match self {
            StopReason::Entry => "entry".to_string(),
            StopReason::Exception => "exception".to_string(),
            StopReason::Breakpoint => "breakpoint".to_string(),
            StopReason::DebuggerStatement => "debugger statement".to_string(),
            StopReason::FrameEntry => "frame entry".to_string(),
            StopReason::Step => "step".to_string(),
            StopReason::UserRequest => "user request".to_string(),
            StopReason::Other(raw) => raw.clone(),
        }
    }

    fn is_step(&self) -> bool {
        matches!(self, StopReason::Step | StopReason::FrameEntry)
    }
}

/// A classified stop ready to be sent to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct StoppedPayload {
    pub reason: StopReason,
    pub text: Option<String>,
    pub hit_breakpoint_ids: Vec<i64>,
}

struct DeferredStop {
    payload: StoppedPayload,
    deadline: Instant,
}

#[derive(Default)]
pub struct PauseCoordinator {
    expected_stop: Option<StopReason>,
    expecting_resumed: bool,
    response_pending: bool,
    deferred: Option<DeferredStop>,
    last_step_resume: Option<Instant>,
    smart_step_count: u64,
}

impl PauseCoordinator {
    /// A step request is about to be issued; the next pause carries its
    /// reason and the stopped event is gated on the request's response.
    pub fn begin_step(&mut self, reason: StopReason) {
        self.expected_stop = Some(reason);
        self.expecting_resumed = true;
        self.response_pending = true;
    }

    /// A continue request is about to be issued.
    pub fn begin_continue(&mut self) {
        self.expected_stop = None;
        self.expecting_resumed = true;
        self.response_pending = true;
    }

    /// A pause request is about to be issued. No resumed event will follow,
    /// only the stop.
    pub fn begin_pause(&mut self) {
        self.expected_stop = Some(StopReason::UserRequest);
        self.response_pending = true;
    }

    /// The adapter resumes the debuggee on its own (hit-condition filtering,
    /// smart step); the matching resumed event must stay silent.
    pub fn begin_internal_resume(&mut self) {
        self.expecting_resumed = true;
    }

    /// Whether the in-flight pause was induced by a user action.
    pub fn user_induced(&self) -> bool {
        self.expected_stop.is_some()
    }

    pub fn take_expected_stop(&mut self) -> Option<StopReason> {
        self.expected_stop.take()
    }

    /// Re-arm the expected reason (smart step keeps stepping).
    pub fn expect_stop(&mut self, reason: StopReason) {
        self.expected_stop = Some(reason);
    }

    /// Consume a CDP resumed event. Returns `true` when the client must be
    /// told via a continued event (the debuggee resumed on its own).
    pub fn on_resumed(&mut self) -> bool {
        if self.expecting_resumed {
            self.expecting_resumed = false;
            self.last_step_resume = Some(Instant::now());
            return false;
        }
        true
    }

    /// Gate a stopped payload on the inducing request's response. Returns the
    /// payload when it can be emitted right away.
    pub fn gate(&mut self, payload: StoppedPayload) -> Option<StoppedPayload> {
        if self.response_pending {
            self.deferred = Some(DeferredStop {
                payload,
                deadline: Instant::now() + STOPPED_GATE_TIMEOUT,
            });
            return None;
        }
        Some(payload)
    }

    /// The response of the inducing request reached the wire, release a
    /// deferred stop if one is waiting.
    pub fn acknowledge_response(&mut self) -> Option<StoppedPayload> {
        self.response_pending = false;
        self.deferred.take().map(|d| d.payload)
    }

    /// Release a deferred stop whose 300 ms gate expired.
    pub fn flush_expired(&mut self) -> Option<StoppedPayload> {
        match &self.deferred {
            Some(d) if Instant::now() >= d.deadline => self.deferred.take().map(|d| d.payload),
            _ => None,
        }
    }

    /// Sleep out the remainder of the post-resume settle window.
    pub fn settle_before_evaluate(&mut self) {
        if let Some(resumed_at) = self.last_step_resume {
            let elapsed = resumed_at.elapsed();
            if elapsed < POST_RESUME_SETTLE {
                std::thread::sleep(POST_RESUME_SETTLE - elapsed);
            }
            self.last_step_resume = None;
        }
    }

    pub fn count_smart_step(&mut self) {
        self.smart_step_count += 1;
    }

    /// Number of frames auto-stepped since the last surfaced stop.
    pub fn take_smart_step_count(&mut self) -> u64 {
        std::mem::take(&mut self.smart_step_count)
    }

    /// Whether a freshly classified stop reason allows smart stepping.
    pub fn smart_step_candidate(reason: &StopReason) -> bool {
        reason.is_step()
    }
}
