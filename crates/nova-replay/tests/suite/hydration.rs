use serde_json::json;

use nova_replay::{
    MockControlChannel, ObjectRef, PreviewLevel, ProxyConfig, ReplayDebugger, Value,
};

use super::{at_break, debugger, init_tracing, pause};

fn pause_data() -> serde_json::Value {
    json!({
        "frames": [
            {"index": 0, "script": 1, "offset": 0, "this": {"object": 2}},
            {
                "index": 1,
                "script": 7,
                "offset": 3,
                "environment": 9,
                "arguments": [{"object": 2}, 5]
            }
        ],
        "objects": [
            {
                "data": {"id": 2, "class": "Window"},
                "preview": {
                    "level": "full",
                    "ownPropertyNamesCount": 1,
                    "enumerableOwnProperties": [
                        {"name": "document", "desc": {"enumerable": true, "value": {"object": 3}}}
                    ]
                }
            },
            {"data": {"id": 3, "class": "HTMLDocument"}}
        ],
        "environments": [
            {"data": {"id": 9, "type": "function"}, "names": [{"name": "x", "value": 1}]}
        ]
    })
}

#[test]
fn thread_pause_hydrates_the_pool_without_round_trips() {
    let mut dbg = debugger();
    dbg.channel_mut().set_pause_data(pause_data());
    pause(&mut dbg, at_break(1, 7, 3));

    dbg.replay_push_thread_pause().unwrap();
    assert_eq!(dbg.channel().pause_data_calls, 1);
    let requests = dbg.channel().requests.len();

    let frames = dbg.frames().unwrap();
    assert_eq!(
        frames.iter().map(|frame| frame.index()).collect::<Vec<_>>(),
        [1, 0]
    );
    let epoch = dbg.current_epoch();
    let window = ObjectRef { epoch, id: 2 };
    assert_eq!(frames[0].arguments(), [Value::Object(window), Value::Number(5.0)]);
    assert_eq!(frames[1].this(), &Value::Object(window));

    let env = dbg.frame_environment(&frames[0]).unwrap().unwrap();
    assert_eq!(env.env_type(), "function");
    assert_eq!(
        dbg.environment_variable(&env, "x").unwrap(),
        Some(Value::Number(1.0))
    );

    let object = dbg.object(window).unwrap().unwrap();
    assert_eq!(object.preview_level(), PreviewLevel::Full);
    assert_eq!(dbg.own_property_names(&object).unwrap(), ["document"]);
    assert_eq!(dbg.own_property_names_count(&object).unwrap(), 1);
    let desc = dbg
        .own_property_descriptor(&object, "document")
        .unwrap()
        .unwrap();
    assert_eq!(desc.value, Some(Value::Object(ObjectRef { epoch, id: 3 })));

    assert_eq!(dbg.channel().requests.len(), requests);
}

#[test]
fn hydration_is_idempotent_within_a_pause() {
    let mut dbg = debugger();
    dbg.channel_mut().set_pause_data(pause_data());
    pause(&mut dbg, at_break(1, 7, 3));

    dbg.replay_push_thread_pause().unwrap();
    let newest = dbg.get_newest_frame().unwrap().unwrap();
    dbg.replay_push_thread_pause().unwrap();
    assert!(!dbg.hydrate().unwrap());
    assert_eq!(dbg.channel().pause_data_calls, 1);
    assert_eq!(dbg.pool().object_count(), 3);

    let again = dbg.get_newest_frame().unwrap().unwrap();
    assert!(std::rc::Rc::ptr_eq(&newest, &again));

    dbg.replay_pop_thread_pause().unwrap();
    dbg.replay_pop_thread_pause().unwrap();
    dbg.replay_resume_forward().unwrap();
    dbg.run_until_idle().unwrap();

    // A new pause starts with an empty pool.
    assert!(!dbg.pool().has_frames());
    assert!(dbg.hydrate().unwrap());
    assert_eq!(dbg.channel().pause_data_calls, 2);
}

#[test]
fn hydration_on_thread_pause_can_be_disabled() {
    init_tracing();
    let config = ProxyConfig {
        hydrate_on_thread_pause: false,
        ..ProxyConfig::default()
    };
    let mut dbg = ReplayDebugger::with_config(MockControlChannel::new(), config);
    dbg.channel_mut().set_pause_data(pause_data());
    pause(&mut dbg, at_break(1, 7, 3));

    dbg.replay_push_thread_pause().unwrap();
    assert_eq!(dbg.channel().pause_data_calls, 0);
    assert_eq!(dbg.pool().object_count(), 0);
}
