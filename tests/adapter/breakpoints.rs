use crate::common::TestSession;
use serde_json::json;
use webdbg::adapter::ClientEvent;
use webdbg::dap::requests::{SetBreakpointsArguments, SetBreakpointsSource, SourceBreakpoint};

fn args_with(path: &str, breakpoints: Vec<SourceBreakpoint>) -> SetBreakpointsArguments {
    SetBreakpointsArguments {
        source: SetBreakpointsSource {
            name: None,
            path: Some(path.to_string()),
            source_reference: None,
        },
        breakpoints,
    }
}

#[test]
fn test_pending_breakpoint_resolves_on_script_parsed() {
    let mut session = TestSession::new();
    session.launch();

    // the script is not parsed yet: the response must be unverified
    let args = TestSession::breakpoints_args("/a/b.js", &[10]);
    let response = session.adapter.set_breakpoints(&args, 2).unwrap();
    assert_eq!(response.breakpoints.len(), 1);
    assert!(!response.breakpoints[0].verified);
    let unbound_id = response.breakpoints[0].id.unwrap();
    assert!(session.calls("Debugger.setBreakpointByUrl").is_empty());

    session.respond(
        "Debugger.setBreakpointByUrl",
        json!({
            "breakpointId": "bp1",
            "locations": [{ "scriptId": "1", "lineNumber": 9, "columnNumber": 0 }],
        }),
    );
    session.script_parsed("1", "file:///a/b.js");

    // resolution reuses the id minted at unverified time
    let breakpoint_events: Vec<_> = session
        .events()
        .into_iter()
        .filter_map(|ev| match ev {
            ClientEvent::Breakpoint { breakpoint, .. } => Some(breakpoint),
            _ => None,
        })
        .collect();
    assert_eq!(breakpoint_events.len(), 1);
    assert_eq!(breakpoint_events[0].id, Some(unbound_id));
    assert!(breakpoint_events[0].verified);
    assert_eq!(breakpoint_events[0].line, Some(10));

    // consumed exactly once: parsing another matching script resolves nothing
    session.clear_events();
    session.script_parsed("2", "file:///a/b.js");
    assert!(session.events().is_empty());
}

#[test]
fn test_hit_condition_every_third_hit() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");

    session.respond(
        "Debugger.setBreakpointByUrl",
        json!({ "breakpointId": "bp-hit", "locations": [] }),
    );
    let args = args_with(
        "/a/b.js",
        vec![SourceBreakpoint {
            line: 5,
            column: None,
            condition: None,
            hit_condition: Some("% 3".to_string()),
        }],
    );
    let response = session.adapter.set_breakpoints(&args, 2).unwrap();
    assert!(response.breakpoints[0].verified);
    let client_id = response.breakpoints[0].id.unwrap();
    session.clear_trace();

    let hit = json!({
        "reason": "other",
        "callFrames": [TestSession::call_frame("cf0", "1", 5)],
        "hitBreakpoints": ["bp-hit"],
    });

    // hits 1 and 2: silently resumed, no stopped event
    session.paused(hit.clone());
    session.resumed();
    session.paused(hit.clone());
    session.resumed();
    assert_eq!(session.calls("Debugger.resume").len(), 2);
    assert!(session.stopped_reasons().is_empty());

    // hit 3: 3 % 3 == 0, the stop surfaces
    session.paused(hit);
    assert_eq!(session.stopped_reasons(), vec!["breakpoint"]);
    let stopped_ids = session
        .events()
        .into_iter()
        .find_map(|ev| match ev {
            ClientEvent::Stopped {
                hit_breakpoint_ids, ..
            } => Some(hit_breakpoint_ids),
            _ => None,
        })
        .unwrap();
    assert_eq!(stopped_ids, vec![client_id]);
    assert_eq!(session.calls("Debugger.resume").len(), 2);
}

#[test]
fn test_breakpoints_removed_one_at_a_time() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");

    let lines = [1, 2, 3, 4, 5, 6];
    let args = TestSession::breakpoints_args("/a/b.js", &lines);
    session.adapter.set_breakpoints(&args, 2).unwrap();
    assert_eq!(session.calls("Debugger.setBreakpointByUrl").len(), 6);
    session.clear_trace();

    // re-set: six distinct sequential removals, never a batch
    session.adapter.set_breakpoints(&args, 3).unwrap();
    let methods = session.methods();
    assert_eq!(
        methods[..6],
        vec!["Debugger.removeBreakpoint"; 6],
        "all removals must precede the first add"
    );
    let removed: Vec<_> = session
        .calls("Debugger.removeBreakpoint")
        .into_iter()
        .map(|params| params["breakpointId"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(removed, vec!["bp1", "bp2", "bp3", "bp4", "bp5", "bp6"]);
}

#[test]
fn test_invalid_hit_condition_fails_entry() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");

    let args = args_with(
        "/a/b.js",
        vec![
            SourceBreakpoint {
                line: 1,
                column: None,
                condition: None,
                hit_condition: Some("oops".to_string()),
            },
            SourceBreakpoint {
                line: 2,
                column: None,
                condition: None,
                hit_condition: None,
            },
        ],
    );
    let response = session.adapter.set_breakpoints(&args, 2).unwrap();

    assert!(!response.breakpoints[0].verified);
    assert!(
        response.breakpoints[0]
            .message
            .as_deref()
            .unwrap()
            .contains("hit condition")
    );
    assert!(response.breakpoints[1].verified);
    // only the valid entry reached the target
    assert_eq!(session.calls("Debugger.setBreakpointByUrl").len(), 1);
}

#[test]
fn test_condition_forwarded_to_target() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");

    let args = args_with(
        "/a/b.js",
        vec![SourceBreakpoint {
            line: 3,
            column: None,
            condition: Some("x > 3".to_string()),
            hit_condition: None,
        }],
    );
    session.adapter.set_breakpoints(&args, 2).unwrap();

    let calls = session.calls("Debugger.setBreakpointByUrl");
    assert_eq!(calls[0]["condition"], json!("x > 3"));
    // 1-based client line 3 -> 0-based target line 2
    assert_eq!(calls[0]["lineNumber"], json!(2));
}

#[test]
fn test_breakpoint_resolved_event() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");

    let args = TestSession::breakpoints_args("/a/b.js", &[10]);
    let response = session.adapter.set_breakpoints(&args, 2).unwrap();
    let client_id = response.breakpoints[0].id.unwrap();
    session.clear_events();

    session.cdp_event(
        "Debugger.breakpointResolved",
        json!({
            "breakpointId": "bp1",
            "location": { "scriptId": "1", "lineNumber": 9, "columnNumber": 4 },
        }),
    );

    let events = session.events();
    let ClientEvent::Breakpoint { breakpoint, .. } = &events[0] else {
        panic!("expected a breakpoint event, got {events:?}");
    };
    assert_eq!(breakpoint.id, Some(client_id));
    assert!(breakpoint.verified);
    assert_eq!(breakpoint.line, Some(10));
    assert_eq!(breakpoint.column, Some(5));
}

#[test]
fn test_eval_breakpoint_set_by_script_id() {
    let mut session = TestSession::new();
    session.launch();
    // a script without a URL gets the placeholder
    session.script_parsed("77", "");

    let args = TestSession::breakpoints_args("eval://77", &[2]);
    let response = session.adapter.set_breakpoints(&args, 2).unwrap();

    assert!(response.breakpoints[0].verified);
    let calls = session.calls("Debugger.setBreakpoint");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["location"]["scriptId"], json!("77"));
    assert!(session.calls("Debugger.setBreakpointByUrl").is_empty());
}
