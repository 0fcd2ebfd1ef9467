use crate::common::{TestSession, TestSourceMaps};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use webdbg::adapter::ClientEvent;
use webdbg::dap::requests::{LaunchArguments, RestartFrameArguments, SessionOptions};

#[test]
fn test_stopped_waits_for_step_response() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");

    session.adapter.next().unwrap();
    assert_eq!(session.calls("Debugger.stepOver").len(), 1);

    session.resumed();
    session.paused(TestSession::paused_params("1", 3));

    // the step response is still in flight: no stopped event yet
    assert!(session.stopped_reasons().is_empty());

    session.adapter.notify_response_sent();
    assert_eq!(session.stopped_reasons(), vec!["step"]);
}

#[test]
fn test_gate_expires_after_300ms() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");

    session.adapter.next().unwrap();
    session.resumed();
    session.paused(TestSession::paused_params("1", 3));
    assert!(session.stopped_reasons().is_empty());

    std::thread::sleep(Duration::from_millis(320));
    session.adapter.flush_expired_stop();
    assert_eq!(session.stopped_reasons(), vec!["step"]);
}

#[test]
fn test_smart_step_over_unmapped_frame() {
    let mut sourcemaps = TestSourceMaps::default();
    sourcemaps.mappings = HashMap::from([(
        "file:///a/app.js".to_string(),
        vec!["/src/app.ts".to_string()],
    )]);

    let mut session = TestSession::with_sourcemaps(Box::new(sourcemaps));
    session.launch_with(LaunchArguments {
        options: SessionOptions {
            source_maps: Some(true),
            smart_step: Some(true),
            ..Default::default()
        },
        ..Default::default()
    });
    session.script_parsed("1", "file:///a/app.js");
    session.script_parsed("2", "file:///a/lib.js");

    session.adapter.next().unwrap();
    session.adapter.notify_response_sent();
    session.resumed();

    // the step lands in a frame with no authored mapping: auto step-in
    session.paused(TestSession::paused_params("2", 7));
    assert_eq!(session.calls("Debugger.stepInto").len(), 1);
    assert!(session.stopped_reasons().is_empty());

    session.resumed();
    session.paused(TestSession::paused_params("1", 4));
    assert_eq!(session.stopped_reasons(), vec!["step"]);
    assert_eq!(session.calls("Debugger.stepInto").len(), 1);
}

#[test]
fn test_spontaneous_resume_emits_continued() {
    let mut session = TestSession::new();
    session.launch();

    session.resumed();
    assert!(session.events().contains(&ClientEvent::Continued));
}

#[test]
fn test_adapter_initiated_resume_is_silent() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");

    session.adapter.continue_request().unwrap();
    session.adapter.notify_response_sent();
    session.resumed();
    assert!(!session.events().contains(&ClientEvent::Continued));
}

#[test]
fn test_pause_request_classifies_user_request() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");

    session.adapter.pause_request().unwrap();
    session.adapter.notify_response_sent();
    session.paused(TestSession::paused_params("1", 3));

    assert_eq!(session.stopped_reasons(), vec!["user_request"]);
}

#[test]
fn test_first_stop_before_configuration_is_entry() {
    let mut session = TestSession::new();
    session.adapter.initialize(Default::default()).unwrap();
    session.adapter.launch(Default::default()).unwrap();
    session.script_parsed("1", "file:///a/b.js");

    session.paused(TestSession::paused_params("1", 0));
    assert_eq!(session.stopped_reasons(), vec!["entry"]);
}

#[test]
fn test_restart_frame_tags_frame_entry() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");

    session.paused(TestSession::paused_params("1", 3));
    assert_eq!(session.stopped_reasons(), vec!["debugger"]);
    session.clear_events();

    session
        .adapter
        .restart_frame(&RestartFrameArguments { frame_id: 1000 })
        .unwrap();
    assert_eq!(session.calls("Debugger.restartFrame").len(), 1);
    assert_eq!(session.calls("Debugger.stepInto").len(), 1);
    session.adapter.notify_response_sent();

    session.resumed();
    session.paused(TestSession::paused_params("1", 3));
    assert_eq!(session.stopped_reasons(), vec!["frame_entry"]);
}

#[test]
fn test_malformed_call_frames_recover_as_unknown() {
    let mut session = TestSession::new();
    session.launch();

    session.paused(json!({ "reason": "other", "callFrames": "garbage" }));
    let body = session
        .adapter
        .stack_trace(&Default::default())
        .unwrap();
    assert_eq!(body.stack_frames.len(), 1);
    assert_eq!(body.stack_frames[0].name, "Unknown");
}

#[test]
fn test_terminated_is_idempotent() {
    let mut session = TestSession::new();
    session.launch();

    session.cdp_event("Inspector.detached", json!({ "reason": "target_closed" }));
    session.cdp_event("Inspector.detached", json!({ "reason": "target_closed" }));
    session.adapter.terminate();

    let terminated = session
        .events()
        .into_iter()
        .filter(|ev| *ev == ClientEvent::Terminated)
        .count();
    assert_eq!(terminated, 1);
}
