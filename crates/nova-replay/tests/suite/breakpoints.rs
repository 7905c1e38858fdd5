use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;

use nova_replay::{
    Direction, ExecutionPoint, ExecutionPosition, FrameHandler, HookId, MockControlChannel,
    ReplayError,
};

use super::{at_break, debugger, pause};

fn recorder(
    log: &Rc<RefCell<Vec<&'static str>>>,
    name: &'static str,
    resume: bool,
) -> FrameHandler<MockControlChannel> {
    let log = log.clone();
    Rc::new(move |dbg, _| {
        log.borrow_mut().push(name);
        if resume {
            dbg.replay_resume_forward()?;
        }
        Ok(())
    })
}

#[test]
fn handlers_run_in_order_until_one_resumes() {
    let mut dbg = debugger();
    let log = Rc::new(RefCell::new(Vec::new()));
    dbg.set_script_breakpoint(7, 3, HookId(1), recorder(&log, "a", false))
        .unwrap();
    dbg.set_script_breakpoint(7, 3, HookId(2), recorder(&log, "b", true))
        .unwrap();
    dbg.set_script_breakpoint(7, 3, HookId(3), recorder(&log, "c", false))
        .unwrap();
    dbg.channel_mut()
        .queue_stop(Direction::Forward, at_break(2, 7, 8));

    pause(&mut dbg, at_break(1, 7, 3));

    assert_eq!(*log.borrow(), ["a", "b"]);
    // The stop at (7, 8) has no handlers, so the debugger kept going forward.
    assert_eq!(dbg.channel().resumes, [Direction::Forward, Direction::Forward]);
    assert_eq!(
        dbg.current_execution_point(),
        Some(ExecutionPoint::checkpoint(MockControlChannel::RECORDING_END))
    );
}

#[test]
fn handlers_are_deferred_to_the_run_loop() {
    let mut dbg = debugger();
    let resumed_inside = Rc::new(Cell::new(None));
    let seen = resumed_inside.clone();
    let handler: FrameHandler<MockControlChannel> = Rc::new(move |dbg, _| {
        dbg.replay_resume_backward()?;
        seen.set(Some(dbg.channel().resumes.len()));
        Ok(())
    });
    dbg.set_script_breakpoint(7, 3, HookId(1), handler).unwrap();

    dbg.channel_mut().pause_at(at_break(1, 7, 3));
    assert_eq!(resumed_inside.get(), None);
    assert!(!dbg.is_paused());

    // First turn: drain the notification and dispatch.
    assert!(dbg.run_one_turn().unwrap());
    assert_eq!(resumed_inside.get(), Some(0));
    assert!(dbg.channel().resumes.is_empty());

    // Second turn: the resume itself.
    assert!(dbg.run_one_turn().unwrap());
    assert_eq!(dbg.channel().resumes, [Direction::Backward]);
}

#[test]
fn stops_reached_inside_a_resume_dispatch_on_a_later_turn() {
    let mut dbg = debugger();
    let hits = Rc::new(Cell::new(0));
    let counter = hits.clone();
    let handler: FrameHandler<MockControlChannel> = Rc::new(move |_, _| {
        counter.set(counter.get() + 1);
        Ok(())
    });
    dbg.set_script_breakpoint(7, 3, HookId(1), handler).unwrap();
    pause(&mut dbg, at_break(1, 7, 8));
    dbg.channel_mut()
        .queue_stop(Direction::Forward, at_break(2, 7, 3));

    dbg.replay_resume_forward().unwrap();
    // The resume itself. The mock stops at (7, 3) before returning.
    assert!(dbg.run_one_turn().unwrap());
    assert_eq!(dbg.channel().resumes, [Direction::Forward]);
    assert_eq!(dbg.current_execution_point(), Some(at_break(2, 7, 3)));
    assert_eq!(hits.get(), 0);

    assert!(dbg.run_one_turn().unwrap());
    assert_eq!(hits.get(), 1);
}

#[test]
fn installed_set_tracks_the_registry() {
    let mut dbg = debugger();
    let noop: FrameHandler<MockControlChannel> = Rc::new(|_, _| Ok(()));
    dbg.set_script_breakpoint(7, 3, HookId(1), noop.clone()).unwrap();
    dbg.set_script_breakpoint(7, 4, HookId(2), noop.clone()).unwrap();
    dbg.set_script_breakpoint(8, 1, HookId(1), noop).unwrap();
    assert_eq!(dbg.channel().installed_breakpoints.len(), 3);

    assert_eq!(dbg.clear_script_breakpoint(7, HookId(1)).unwrap(), 1);
    assert_eq!(
        dbg.channel().installed_breakpoints,
        [
            json!({"kind": "Break", "script": 7, "offset": 4}),
            json!({"kind": "Break", "script": 8, "offset": 1}),
        ]
    );
    assert_eq!(dbg.script_breakpoints(7), [(4, HookId(2))]);
    assert_eq!(dbg.breakpoints().count(), 2);

    assert_eq!(dbg.clear_script_breakpoint(7, HookId(9)).unwrap(), 0);
    assert_eq!(dbg.channel().request_count("clearBreakpoints"), 1);
}

#[test]
fn enter_frame_hook_matches_any_script() {
    let mut dbg = debugger();
    let hits = Rc::new(Cell::new(0));
    let counter = hits.clone();
    let handler: FrameHandler<MockControlChannel> = Rc::new(move |_, _| {
        counter.set(counter.get() + 1);
        Ok(())
    });
    dbg.set_on_enter_frame(Some((HookId(1), handler))).unwrap();

    pause(
        &mut dbg,
        ExecutionPoint::at(1, 1, ExecutionPosition::enter_frame(3, 0)),
    );
    pause(
        &mut dbg,
        ExecutionPoint::at(1, 2, ExecutionPosition::enter_frame(9, 4)),
    );
    // A plain breakpoint position is a different kind.
    pause(&mut dbg, at_break(3, 3, 0));
    assert_eq!(hits.get(), 2);
}

#[test]
fn handler_errors_surface_from_the_run_loop() {
    let mut dbg = debugger();
    // Popping a thread-wide pause nobody pushed is an invariant violation.
    let handler: FrameHandler<MockControlChannel> =
        Rc::new(|dbg, _| dbg.replay_pop_thread_pause());
    dbg.set_script_breakpoint(7, 3, HookId(1), handler).unwrap();
    dbg.channel_mut().pause_at(at_break(1, 7, 3));

    let err = dbg.run_until_idle().unwrap_err();
    assert!(matches!(err, ReplayError::Invariant { .. }));
    assert!(err.is_fatal());
}
