use std::cell::Cell;
use std::rc::Rc;

use serde_json::json;

use nova_replay::{
    ChannelError, ControllerState, Direction, ExecutionPoint, FrameHandler, HookId,
    MockControlChannel, ReplayError,
};

use super::{at_break, debugger, init_tracing, pause};

#[test]
fn nested_thread_pauses_hold_the_last_resume_request() {
    let mut dbg = debugger();
    pause(&mut dbg, at_break(1, 7, 3));

    for _ in 0..3 {
        dbg.replay_push_thread_pause().unwrap();
    }
    assert_eq!(dbg.state(), ControllerState::Paused { thread_pauses: 3 });

    dbg.replay_resume_forward().unwrap();
    dbg.replay_resume_backward().unwrap();
    dbg.run_until_idle().unwrap();
    assert!(dbg.channel().resumes.is_empty());

    dbg.replay_pop_thread_pause().unwrap();
    dbg.replay_pop_thread_pause().unwrap();
    dbg.run_until_idle().unwrap();
    assert!(dbg.channel().resumes.is_empty());
    assert_eq!(dbg.thread_pause_depth(), 1);

    dbg.replay_pop_thread_pause().unwrap();
    dbg.run_until_idle().unwrap();
    assert_eq!(dbg.channel().resumes, [Direction::Backward]);
    assert_eq!(
        dbg.current_execution_point(),
        Some(ExecutionPoint::checkpoint(0))
    );
    assert_eq!(dbg.state(), ControllerState::Paused { thread_pauses: 0 });
}

#[test]
fn thread_pause_cancels_the_queued_handler_dispatch() {
    let mut dbg = debugger();
    let hits = Rc::new(Cell::new(0));
    let counter = hits.clone();
    let handler: FrameHandler<MockControlChannel> = Rc::new(move |_, _| {
        counter.set(counter.get() + 1);
        Ok(())
    });
    dbg.set_script_breakpoint(7, 3, HookId(1), handler).unwrap();

    dbg.channel_mut().pause_at(at_break(1, 7, 3));
    // Drain the notification without running the queued dispatch.
    dbg.replay_pause().unwrap();
    assert_eq!(dbg.pending_tasks(), 1);

    dbg.replay_push_thread_pause().unwrap();
    dbg.run_until_idle().unwrap();
    dbg.replay_pop_thread_pause().unwrap();
    dbg.run_until_idle().unwrap();
    assert_eq!(hits.get(), 0);
    assert!(dbg.channel().resumes.is_empty());

    // The next pause dispatches normally.
    pause(&mut dbg, at_break(2, 7, 3));
    assert_eq!(hits.get(), 1);
}

#[test]
fn thread_pause_clears_the_preferred_direction() {
    let mut dbg = debugger();
    dbg.channel_mut()
        .queue_stop(Direction::Forward, at_break(2, 7, 9));
    pause(&mut dbg, at_break(1, 7, 3));
    dbg.replay_resume_forward().unwrap();
    dbg.run_one_turn().unwrap();
    assert_eq!(dbg.preferred_direction(), Some(Direction::Forward));

    // The dispatch for the new pause is queued but has not run yet.
    dbg.replay_push_thread_pause().unwrap();
    assert_eq!(dbg.preferred_direction(), None);
    dbg.replay_pop_thread_pause().unwrap();
    dbg.run_until_idle().unwrap();
    assert_eq!(dbg.channel().resumes, [Direction::Forward]);
    assert_eq!(dbg.current_execution_point(), Some(at_break(2, 7, 9)));
}

#[test]
fn unbalanced_thread_pauses_are_invariant_violations() {
    let mut dbg = debugger();
    let err = dbg.replay_push_thread_pause().unwrap_err();
    assert!(err.is_fatal());

    pause(&mut dbg, at_break(1, 7, 3));
    let err = dbg.replay_pop_thread_pause().unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn failed_hydration_does_not_hold_the_subject() {
    let mut dbg = debugger();
    pause(&mut dbg, at_break(1, 7, 3));
    dbg.channel_mut().set_pause_data(json!({"frames": "garbage"}));

    let err = dbg.replay_push_thread_pause().unwrap_err();
    assert!(matches!(err, ReplayError::Protocol { .. }), "{err}");
    assert_eq!(dbg.thread_pause_depth(), 0);

    dbg.replay_resume_forward().unwrap();
    dbg.run_until_idle().unwrap();
    assert_eq!(dbg.channel().resumes, [Direction::Forward]);
}

#[test]
fn only_the_outermost_thread_pause_hydrates() {
    let mut dbg = debugger();
    dbg.channel_mut().set_pause_data(json!({"frames": []}));
    pause(&mut dbg, at_break(1, 7, 3));

    for _ in 0..3 {
        dbg.replay_push_thread_pause().unwrap();
    }
    assert_eq!(dbg.channel().pause_data_calls, 1);
    for _ in 0..3 {
        dbg.replay_pop_thread_pause().unwrap();
    }

    // A new outermost level hydrates again.
    dbg.replay_push_thread_pause().unwrap();
    assert_eq!(dbg.channel().pause_data_calls, 2);
}

#[test]
fn failed_resume_leaves_the_subject_paused() {
    let mut dbg = debugger();
    pause(&mut dbg, at_break(1, 7, 3));
    dbg.channel_mut().disconnect();

    dbg.replay_resume_forward().unwrap();
    let err = dbg.run_until_idle().unwrap_err();
    assert!(
        matches!(err, ReplayError::Channel(ChannelError::Disconnected)),
        "{err}"
    );
    assert_eq!(dbg.state(), ControllerState::Paused { thread_pauses: 0 });
    assert_eq!(dbg.preferred_direction(), None);
    assert_eq!(dbg.pending_tasks(), 0);
    let logs = init_tracing().last_lines(2_000);
    assert!(logs.iter().any(|line| line.contains("resume failed")));

    // Further resume requests are accepted rather than rejected as invariant
    // violations.
    dbg.replay_resume_backward().unwrap();
    assert_eq!(dbg.pending_tasks(), 1);
}
