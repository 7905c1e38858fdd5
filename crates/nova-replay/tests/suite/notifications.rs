use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use nova_replay::wire::{ConsoleMessageData, ScriptData, SourceData};
use nova_replay::{
    ConsoleMessage, ConsoleMessageHook, EventBreakpointHook, MockControlChannel, NewScriptHook,
    ScriptQuery, Value,
};

use super::{at_break, debugger, pause};

fn console_message(text: &str) -> ConsoleMessageData {
    serde_json::from_value(json!({
        "messageType": "ConsoleAPI",
        "level": "log",
        "text": text,
        "executionPoint": {"checkpoint": 1, "progress": 4},
        "arguments": [text, {"object": 3}],
        "pauseData": {
            "objects": [{"data": {"id": 3, "class": "Object"}}]
        }
    }))
    .unwrap()
}

fn script(id: u64, url: &str) -> ScriptData {
    serde_json::from_value(json!({"id": id, "url": url, "sourceId": id + 100, "lineCount": 12}))
        .unwrap()
}

#[test]
fn console_messages_carry_their_own_snapshot() {
    let mut dbg = debugger();
    pause(&mut dbg, at_break(1, 7, 3));
    let seen: Rc<RefCell<Vec<ConsoleMessage>>> = Rc::default();
    let sink = seen.clone();
    let hook: ConsoleMessageHook<MockControlChannel> = Rc::new(move |_, message| {
        sink.borrow_mut().push(message);
        Ok(())
    });
    dbg.set_on_console_message(Some(hook));

    dbg.channel_mut().push_console_message(console_message("hello"));
    assert!(seen.borrow().is_empty());
    dbg.run_until_idle().unwrap();

    let seen = seen.borrow();
    let message = &seen[0];
    assert_eq!(message.text(), Some("hello"));
    assert_eq!(message.execution_point().map(|point| point.progress), Some(4));
    assert_eq!(message.arguments()[0], Value::from("hello"));
    let obj = message.arguments()[1].as_object().unwrap();
    assert_eq!(message.object(obj).unwrap().class(), "Object");

    // The snapshot is never the debugger's active pool.
    assert!(!dbg.is_current(message.epoch()));
    let before = dbg.channel().requests.len();
    assert!(dbg.object(obj).unwrap().is_none());
    assert_eq!(dbg.channel().requests.len(), before);
}

#[test]
fn console_messages_without_a_hook_are_dropped() {
    let mut dbg = debugger();
    dbg.channel_mut().push_console_message(console_message("ignored"));
    assert_eq!(dbg.run_until_idle().unwrap(), 0);

    let found = dbg.find_all_console_messages().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].text(), Some("ignored"));
}

#[test]
fn found_console_messages_get_distinct_epochs() {
    let mut dbg = debugger();
    dbg.channel_mut().push_console_message(console_message("a"));
    dbg.channel_mut().push_console_message(console_message("b"));
    let found = dbg.find_all_console_messages().unwrap();
    assert_eq!(found.len(), 2);
    assert_ne!(found[0].epoch(), found[1].epoch());
    assert!(found.iter().all(|message| !dbg.is_current(message.epoch())));
}

#[test]
fn announced_scripts_are_registered_before_the_hook_runs() {
    let mut dbg = debugger();
    let seen: Rc<RefCell<Vec<u64>>> = Rc::default();
    let sink = seen.clone();
    let hook: NewScriptHook<MockControlChannel> = Rc::new(move |_, script| {
        sink.borrow_mut().push(script.id());
        Ok(())
    });
    dbg.set_on_new_script(Some(hook));

    dbg.channel_mut().announce_script(script(4, "https://example.com/app.js"));
    dbg.run_until_idle().unwrap();
    assert_eq!(*seen.borrow(), [4]);

    let app = dbg.script(4).unwrap().unwrap();
    assert_eq!(app.url(), Some("https://example.com/app.js"));
    assert_eq!(app.line_count(), 12);
    assert_eq!(dbg.channel().request_count("getScript"), 0);
}

#[test]
fn scripts_and_sources_are_cached_for_the_session() {
    let mut dbg = debugger();
    dbg.channel_mut().add_script(script(4, "https://example.com/app.js"));
    dbg.channel_mut().add_script(script(5, "https://example.com/lib.js"));
    let source: SourceData = serde_json::from_value(json!({
        "id": 104,
        "text": "debugger;",
        "url": "https://example.com/app.js",
        "introductionType": "scriptElement",
        "sourceMapURL": "app.js.map"
    }))
    .unwrap();
    dbg.channel_mut().add_source(source);
    pause(&mut dbg, at_break(1, 4, 0));

    let app = dbg.script(4).unwrap().unwrap();
    dbg.replay_resume_forward().unwrap();
    dbg.run_until_idle().unwrap();
    let again = dbg.script(4).unwrap().unwrap();
    assert!(Rc::ptr_eq(&app, &again));
    assert_eq!(dbg.channel().request_count("getScript"), 1);
    assert!(dbg.script(99).unwrap().is_none());

    let text = dbg.script_source(&app).unwrap().unwrap();
    assert_eq!(text.text(), Some("debugger;"));
    assert_eq!(text.source_map_url(), Some("app.js.map"));
    assert!(dbg.source_introduction_script(&text).unwrap().is_none());

    let found = dbg
        .find_scripts(ScriptQuery::url("https://example.com/lib.js"))
        .unwrap();
    assert_eq!(found.iter().map(|script| script.id()).collect::<Vec<_>>(), [5]);
    assert_eq!(dbg.find_sources().unwrap().len(), 1);

    assert_eq!(dbg.offset_metadata(&app, 0).unwrap(), json!({}));
    dbg.offset_metadata(&app, 0).unwrap();
    assert_eq!(dbg.channel().request_count("getOffsetMetadata"), 1);
}

#[test]
fn event_breakpoints_are_forwarded() {
    let mut dbg = debugger();
    let seen: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = seen.clone();
    let hook: EventBreakpointHook<MockControlChannel> = Rc::new(move |_, event| {
        sink.borrow_mut().push(event.to_string());
        Ok(())
    });
    dbg.set_active_event_breakpoints(vec!["click".into(), "keydown".into()], Some(hook))
        .unwrap();
    assert_eq!(dbg.channel().active_event_breakpoints, ["click", "keydown"]);

    dbg.channel_mut().trigger_event_breakpoint("click");
    dbg.run_until_idle().unwrap();
    assert_eq!(*seen.borrow(), ["click"]);
}

#[test]
fn shutdown_stops_observing_the_channel() {
    let mut dbg = debugger();
    let seen: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = seen.clone();
    let hook: EventBreakpointHook<MockControlChannel> = Rc::new(move |_, event| {
        sink.borrow_mut().push(event.to_string());
        Ok(())
    });
    dbg.set_active_event_breakpoints(vec!["click".into()], Some(hook))
        .unwrap();

    dbg.channel_mut().trigger_event_breakpoint("click");
    dbg.shutdown();
    assert!(dbg.is_shut_down());
    dbg.channel_mut().trigger_event_breakpoint("click");
    dbg.channel_mut().pause_at(at_break(1, 7, 3));
    assert_eq!(dbg.run_until_idle().unwrap(), 0);
    assert!(seen.borrow().is_empty());
    assert!(!dbg.is_paused());
}
