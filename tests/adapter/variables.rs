use crate::common::TestSession;
use serde_json::json;
use webdbg::adapter::ClientEvent;
use webdbg::dap::requests::{ScopesArguments, SetVariableArguments, VariablesArguments};

fn variables_args(reference: i64) -> VariablesArguments {
    VariablesArguments {
        variables_reference: reference,
        filter: None,
        start: None,
        count: None,
    }
}

#[test]
fn test_exception_pause_adds_synthetic_scope() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");

    session.paused(json!({
        "reason": "exception",
        "callFrames": [TestSession::call_frame("cf0", "1", 3)],
        "data": { "type": "object", "objectId": "ex1", "description": "Error: boom" },
    }));

    assert_eq!(session.stopped_reasons(), vec!["exception"]);
    let text = session
        .events()
        .into_iter()
        .find_map(|ev| match ev {
            ClientEvent::Stopped { text, .. } => Some(text),
            _ => None,
        })
        .unwrap();
    assert_eq!(text.as_deref(), Some("Error: boom"));

    let scopes = session
        .adapter
        .scopes(&ScopesArguments { frame_id: 1000 })
        .unwrap()
        .scopes;
    assert_eq!(scopes[0].name, "Exception");
    assert_eq!(scopes[1].name, "Local");
    assert_eq!(scopes[2].name, "Global");
    assert!(scopes[2].expensive);

    // the exception scope expands to the thrown object's properties
    session.respond("Runtime.getProperties", json!({ "result": [] }));
    session.respond(
        "Runtime.getProperties",
        json!({ "result": [
            { "name": "message", "value": { "type": "string", "value": "boom" } },
        ]}),
    );
    let variables = session
        .adapter
        .variables(&variables_args(scopes[0].variables_reference))
        .unwrap()
        .variables;
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0].name, "message");
    assert_eq!(variables[0].value, "\"boom\"");

    let props = session.calls("Runtime.getProperties");
    assert!(props.iter().any(|p| p["objectId"] == json!("ex1")));
}

#[test]
fn test_large_array_pagination() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");
    session.paused(TestSession::paused_params("1", 3));

    let scopes = session
        .adapter
        .scopes(&ScopesArguments { frame_id: 1000 })
        .unwrap()
        .scopes;
    let local_ref = scopes[0].variables_reference;

    // scope expansion surfaces a 10000-element array
    session.respond("Runtime.getProperties", json!({ "result": [] }));
    session.respond(
        "Runtime.getProperties",
        json!({ "result": [{
            "name": "arr",
            "value": {
                "type": "object",
                "subtype": "array",
                "className": "Array",
                "description": "Array(10000)",
                "objectId": "arr1",
            },
        }]}),
    );
    session.respond(
        "Runtime.callFunctionOn",
        json!({ "result": { "type": "object", "value": [10000, 2] } }),
    );
    let variables = session
        .adapter
        .variables(&variables_args(local_ref))
        .unwrap()
        .variables;
    let arr = variables.iter().find(|v| v.name == "arr").unwrap();
    assert_eq!(arr.indexed_variables, Some(10000));
    assert!(arr.variables_reference > 0);

    // request the [100, 150) window
    session.clear_trace();
    session.respond(
        "Runtime.callFunctionOn",
        json!({ "result": { "type": "object", "objectId": "chunk1" } }),
    );
    let chunk: Vec<_> = (100..150)
        .map(|i| json!({ "name": i.to_string(), "value": { "type": "number", "description": i.to_string() } }))
        .collect();
    session.respond("Runtime.getProperties", json!({ "result": chunk }));

    let variables = session
        .adapter
        .variables(&VariablesArguments {
            variables_reference: arr.variables_reference,
            filter: Some("indexed".to_string()),
            start: Some(100),
            count: Some(50),
        })
        .unwrap()
        .variables;

    assert_eq!(variables.len(), 50);
    assert!(variables.iter().all(|v| {
        let index: u64 = v.name.parse().unwrap();
        (100..150).contains(&index)
    }));
    assert_eq!(variables[0].evaluate_name.as_deref(), Some("arr[100]"));

    let slice_calls = session.calls("Runtime.callFunctionOn");
    assert_eq!(slice_calls.len(), 1);
    assert_eq!(slice_calls[0]["objectId"], json!("arr1"));
    assert_eq!(slice_calls[0]["arguments"], json!([{ "value": 100 }, { "value": 50 }]));

    let props_calls = session.calls("Runtime.getProperties");
    assert_eq!(props_calls.len(), 1);
    assert_eq!(props_calls[0]["objectId"], json!("chunk1"));
}

#[test]
fn test_getters_are_invoked() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");
    session.paused(TestSession::paused_params("1", 3));

    let scopes = session
        .adapter
        .scopes(&ScopesArguments { frame_id: 1000 })
        .unwrap()
        .scopes;

    session.respond("Runtime.getProperties", json!({ "result": [] }));
    session.respond(
        "Runtime.getProperties",
        json!({ "result": [
            { "name": "lazy", "get": { "type": "function", "objectId": "g1" } },
            { "name": "angry", "get": { "type": "function", "objectId": "g2" } },
            { "name": "writeOnly", "set": { "type": "function", "objectId": "s1" } },
        ]}),
    );
    session.respond(
        "Runtime.callFunctionOn",
        json!({ "result": { "type": "number", "description": "42" } }),
    );
    session.respond(
        "Runtime.callFunctionOn",
        json!({
            "result": { "type": "object", "subtype": "error" },
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": { "type": "object", "description": "Error: nope" },
            },
        }),
    );

    let variables = session
        .adapter
        .variables(&variables_args(scopes[0].variables_reference))
        .unwrap()
        .variables;

    let by_name = |name: &str| variables.iter().find(|v| v.name == name).unwrap();
    assert_eq!(by_name("lazy").value, "42");
    // a throwing getter renders its exception as the value
    assert_eq!(by_name("angry").value, "Error: nope");
    assert_eq!(by_name("writeOnly").value, "setter");

    let getter_calls = session.calls("Runtime.callFunctionOn");
    assert_eq!(getter_calls.len(), 2);
    assert_eq!(
        getter_calls[0]["functionDeclaration"],
        json!("function(p){return this[p]}")
    );
    assert_eq!(getter_calls[0]["arguments"], json!([{ "value": "lazy" }]));
}

#[test]
fn test_set_variable_on_scope() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");
    session.paused(TestSession::paused_params("1", 3));

    let scopes = session
        .adapter
        .scopes(&ScopesArguments { frame_id: 1000 })
        .unwrap()
        .scopes;

    session.respond(
        "Debugger.evaluateOnCallFrame",
        json!({ "result": { "type": "number", "description": "5", "value": 5 } }),
    );
    let body = session
        .adapter
        .set_variable(&SetVariableArguments {
            variables_reference: scopes[0].variables_reference,
            name: "x".to_string(),
            value: "5".to_string(),
        })
        .unwrap();
    assert_eq!(body.value, "5");

    let calls = session.calls("Debugger.setVariableValue");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["callFrameId"], json!("cf0"));
    assert_eq!(calls[0]["scopeNumber"], json!(0));
    assert_eq!(calls[0]["variableName"], json!("x"));
    assert_eq!(calls[0]["newValue"], json!({ "value": 5 }));
}

#[test]
fn test_set_variable_on_property() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");
    session.paused(TestSession::paused_params("1", 3));

    let scopes = session
        .adapter
        .scopes(&ScopesArguments { frame_id: 1000 })
        .unwrap()
        .scopes;

    session.respond("Runtime.getProperties", json!({ "result": [] }));
    session.respond(
        "Runtime.getProperties",
        json!({ "result": [{
            "name": "obj",
            "value": { "type": "object", "className": "Object", "objectId": "obj1" },
        }]}),
    );
    let variables = session
        .adapter
        .variables(&variables_args(scopes[0].variables_reference))
        .unwrap()
        .variables;
    let obj = variables.iter().find(|v| v.name == "obj").unwrap();

    session.respond(
        "Runtime.callFunctionOn",
        json!({ "result": { "type": "number", "description": "7" } }),
    );
    let body = session
        .adapter
        .set_variable(&SetVariableArguments {
            variables_reference: obj.variables_reference,
            name: "field".to_string(),
            value: "7".to_string(),
        })
        .unwrap();
    assert_eq!(body.value, "7");

    let calls = session.calls("Runtime.callFunctionOn");
    let decl = calls.last().unwrap()["functionDeclaration"].as_str().unwrap();
    assert!(decl.contains("this[\"field\"] = 7"));
}

#[test]
fn test_stale_variable_reference_is_empty() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");
    session.paused(TestSession::paused_params("1", 3));

    let scopes = session
        .adapter
        .scopes(&ScopesArguments { frame_id: 1000 })
        .unwrap()
        .scopes;
    let stale = scopes[0].variables_reference;

    // the next pause invalidates every handle of the previous one
    session.resumed();
    session.paused(TestSession::paused_params("1", 9));

    let body = session.adapter.variables(&variables_args(stale)).unwrap();
    assert!(body.variables.is_empty());
    assert!(session.calls("Runtime.getProperties").is_empty());
}

#[test]
fn test_stack_frames_resolve_paths_and_placeholders() {
    let mut session = TestSession::new();
    session.launch();
    session.script_parsed("1", "file:///a/b.js");
    session.script_parsed("9", "");

    session.paused(json!({
        "reason": "other",
        "callFrames": [
            TestSession::call_frame("cf0", "1", 3),
            TestSession::call_frame("cf1", "9", 0),
        ],
    }));
    session.adapter.notify_response_sent();

    let body = session.adapter.stack_trace(&Default::default()).unwrap();
    assert_eq!(body.total_frames, 2);

    let first = &body.stack_frames[0];
    let source = first.source.as_ref().unwrap();
    assert_eq!(source.path.as_deref(), Some("/a/b.js"));
    assert_eq!(source.name.as_deref(), Some("b.js"));
    assert_eq!(first.line, 4);

    // the eval script keeps no path, only a display name and a reference
    let second = &body.stack_frames[1];
    let source = second.source.as_ref().unwrap();
    assert_eq!(source.path, None);
    assert_eq!(source.name.as_deref(), Some("VM9"));
    assert!(source.source_reference.is_some());
}
