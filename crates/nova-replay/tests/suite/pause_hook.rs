use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use nova_replay::{Direction, ExecutionPoint, FrameHandler, HookId, MockControlChannel, PauseHook};

use super::{at_break, debugger, pause};

fn point_recorder(
    seen: &Rc<RefCell<Vec<Option<ExecutionPoint>>>>,
) -> PauseHook<MockControlChannel> {
    let seen = seen.clone();
    Rc::new(move |dbg, _| {
        seen.borrow_mut().push(dbg.current_execution_point());
        Ok(())
    })
}

#[test]
fn replay_pause_reports_the_stop_once() {
    let mut dbg = debugger();
    let offsets = Rc::new(RefCell::new(Vec::new()));
    let sink = offsets.clone();
    let hook: PauseHook<MockControlChannel> = Rc::new(move |_, frame| {
        sink.borrow_mut().push(frame.map(|frame| frame.offset()));
        Ok(())
    });
    dbg.set_on_pause(Some(hook));
    dbg.channel_mut()
        .push_frame(json!({"index": 0, "script": 7, "offset": 3}));

    dbg.replay_pause().unwrap();
    assert!(offsets.borrow().is_empty());
    dbg.run_until_idle().unwrap();
    assert_eq!(*offsets.borrow(), [Some(3)]);

    // Still at the same point: nothing new to report.
    dbg.replay_pause().unwrap();
    dbg.run_until_idle().unwrap();
    assert_eq!(offsets.borrow().len(), 1);
}

#[test]
fn only_settled_pauses_are_reported() {
    let mut dbg = debugger();
    let seen = Rc::new(RefCell::new(Vec::new()));
    dbg.set_on_pause(Some(point_recorder(&seen)));
    let noop: FrameHandler<MockControlChannel> = Rc::new(|_, _| Ok(()));
    dbg.set_script_breakpoint(7, 3, HookId(1), noop).unwrap();
    dbg.channel_mut()
        .queue_stop(Direction::Forward, at_break(2, 7, 3));

    pause(&mut dbg, at_break(1, 7, 8));
    assert_eq!(*seen.borrow(), [Some(at_break(1, 7, 8))]);

    // The breakpoint at (7, 3) does not resume, so the debugger keeps going
    // forward and settles at the end of the recording.
    dbg.replay_resume_forward().unwrap();
    dbg.run_until_idle().unwrap();
    assert_eq!(dbg.channel().resumes, [Direction::Forward, Direction::Forward]);
    assert_eq!(
        seen.borrow().last().cloned().flatten(),
        Some(ExecutionPoint::checkpoint(MockControlChannel::RECORDING_END))
    );
    assert_eq!(seen.borrow().len(), 2);

    dbg.replay_time_warp(at_break(3, 7, 8)).unwrap();
    dbg.run_until_idle().unwrap();
    assert_eq!(seen.borrow().len(), 3);
    assert_eq!(seen.borrow()[2], Some(at_break(3, 7, 8)));
}

#[test]
fn handler_resumes_are_not_reported() {
    let mut dbg = debugger();
    let seen = Rc::new(RefCell::new(Vec::new()));
    dbg.set_on_pause(Some(point_recorder(&seen)));
    let rewind: FrameHandler<MockControlChannel> =
        Rc::new(|dbg, _| dbg.replay_resume_backward());
    dbg.set_script_breakpoint(7, 3, HookId(1), rewind).unwrap();

    pause(&mut dbg, at_break(1, 7, 3));
    assert_eq!(dbg.channel().resumes, [Direction::Backward]);
    assert_eq!(*seen.borrow(), [Some(ExecutionPoint::checkpoint(0))]);
}
