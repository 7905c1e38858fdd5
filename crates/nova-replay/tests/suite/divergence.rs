use serde_json::json;

use nova_replay::{ChannelError, Completion, ObjectRef, ReplayError, Request, Value};

use super::{at_break, debugger, pause, Debugger};

fn paused_with_frame() -> Debugger {
    let mut dbg = debugger();
    dbg.channel_mut()
        .push_frame(json!({"index": 0, "script": 7, "offset": 3}));
    pause(&mut dbg, at_break(1, 7, 3));
    dbg
}

#[test]
fn evaluation_falls_back_to_a_thrown_message() {
    let mut dbg = paused_with_frame();
    dbg.channel_mut().set_diverges(true);
    let frame = dbg.get_newest_frame().unwrap().unwrap();

    let completion = dbg.evaluate(&frame, "window.open()").unwrap().unwrap();
    assert!(completion.is_throw());
    assert_eq!(
        completion.value().as_str(),
        Some("Recording divergence in evaluating")
    );
    assert_eq!(dbg.channel().ensure_replaying_calls, 1);
}

#[test]
fn replaying_subject_answers_instead_of_the_fallback() {
    let mut dbg = paused_with_frame();
    dbg.channel_mut().set_diverges(true);
    dbg.channel_mut().set_replaying_available(true);
    dbg.channel_mut()
        .set_evaluation(0, "1 + 1", json!({"return": 2}));
    let frame = dbg.get_newest_frame().unwrap().unwrap();

    let completion = dbg.evaluate(&frame, "1 + 1").unwrap().unwrap();
    assert_eq!(completion, Completion::Return(Value::Number(2.0)));
}

#[test]
fn divergence_without_fallback_is_fatal() {
    let mut dbg = paused_with_frame();
    dbg.channel_mut().set_diverges(true);
    let frame = dbg.get_newest_frame().unwrap().unwrap();

    let err = dbg.evaluate_with_fallback(&frame, "x", None).unwrap_err();
    assert!(matches!(err, ReplayError::Divergence { request: "frameEvaluate", .. }));
    assert!(err.is_fatal());
}

#[test]
fn custom_fallback_is_returned_verbatim() {
    let mut dbg = paused_with_frame();
    dbg.channel_mut().set_diverges(true);
    let frame = dbg.get_newest_frame().unwrap().unwrap();

    let fallback = Completion::Return(Value::from("unavailable"));
    let completion = dbg
        .evaluate_with_fallback(&frame, "x", Some(fallback.clone()))
        .unwrap();
    assert_eq!(completion, Some(fallback));
}

#[test]
fn raw_json_fallbacks_are_not_reinterpreted() {
    let mut dbg = paused_with_frame();
    dbg.channel_mut().set_diverges(true);
    let frame = dbg.get_newest_frame().unwrap().unwrap();

    for raw in [json!({"special": "bogus"}), json!({"object": 404})] {
        let fallback = Completion::throw(Value::Json(raw));
        let completion = dbg
            .evaluate_with_fallback(&frame, "x", Some(fallback.clone()))
            .unwrap();
        assert_eq!(completion, Some(fallback));
    }
    assert_eq!(dbg.channel().request_count("getObject"), 0);
}

#[test]
fn diverging_property_fetch_yields_an_empty_list_once() {
    let mut dbg = debugger();
    dbg.channel_mut()
        .insert_object(5, json!({"kind": "Object", "id": 5, "class": "Object"}));
    dbg.channel_mut()
        .set_properties(5, json!([{"name": "a", "desc": {"value": 1}}]));
    pause(&mut dbg, at_break(1, 7, 3));
    let obj = dbg
        .object(ObjectRef {
            epoch: dbg.current_epoch(),
            id: 5,
        })
        .unwrap()
        .unwrap();

    dbg.channel_mut().set_diverges(true);
    assert!(dbg.own_property_names(&obj).unwrap().is_empty());
    dbg.channel_mut().set_diverges(false);
    // The fallback is the answer for this pause.
    assert!(dbg.own_property_names(&obj).unwrap().is_empty());
    assert_eq!(dbg.channel().request_count("getObjectProperties"), 1);
    assert!(dbg.container_contents(&obj).unwrap().is_empty());
}

#[test]
fn function_call_falls_back_and_rejects_stale_arguments() {
    let mut dbg = debugger();
    dbg.channel_mut().insert_object(
        12,
        json!({"kind": "Object", "id": 12, "class": "Function", "callable": true}),
    );
    dbg.channel_mut()
        .insert_object(5, json!({"kind": "Object", "id": 5, "class": "Object"}));
    pause(&mut dbg, at_break(1, 7, 3));
    let old = ObjectRef {
        epoch: dbg.current_epoch(),
        id: 5,
    };
    dbg.object(old).unwrap().unwrap();

    dbg.channel_mut().set_diverges(true);
    let function = dbg
        .object(ObjectRef {
            epoch: dbg.current_epoch(),
            id: 12,
        })
        .unwrap()
        .unwrap();
    let completion = dbg
        .call(&function, &Value::Undefined, [Value::from(1.0), Value::Object(old)])
        .unwrap()
        .unwrap();
    assert_eq!(
        completion.value().as_str(),
        Some("Recording divergence in callFunction")
    );

    dbg.replay_resume_forward().unwrap();
    dbg.run_until_idle().unwrap();
    assert_eq!(
        dbg.apply(&function, &Value::Undefined, &[]).unwrap(),
        None,
        "stale function mirrors never reach the subject"
    );

    let function = dbg
        .object(ObjectRef {
            epoch: dbg.current_epoch(),
            id: 12,
        })
        .unwrap()
        .unwrap();
    let before = dbg.channel().requests.len();
    let err = dbg
        .apply(&function, &Value::Undefined, &[Value::Object(old)])
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("pool cross-reference"));
    assert_eq!(dbg.channel().requests.len(), before);
}

#[test]
fn plain_requests_may_not_diverge() {
    let mut dbg = paused_with_frame();
    dbg.channel_mut()
        .set_divergence_for(&Request::FindSources);
    let err = dbg.find_sources().unwrap_err();
    assert!(matches!(err, ReplayError::Protocol { .. }));
}

#[test]
fn rejected_requests_surface_as_channel_errors() {
    let mut dbg = paused_with_frame();
    dbg.channel_mut()
        .reject(&Request::FindSources, "sources are not indexed yet");
    let err = dbg.find_sources().unwrap_err();
    assert!(
        matches!(
            &err,
            ReplayError::Channel(ChannelError::Rejected {
                request: "findSources",
                ..
            })
        ),
        "{err}"
    );
    assert!(err.is_fatal());
    assert!(err.to_string().contains("sources are not indexed yet"));
}
