use std::sync::Arc;

use nova_replay::{
    ExecutionPoint, ExecutionPosition, MockControlChannel, ReplayDebugger, ScriptId,
};
use nova_replay_config::{LogBuffer, LoggingConfig};

mod breakpoints;
mod divergence;
mod hydration;
mod notifications;
mod pause_hook;
mod thread_pause;

pub(crate) type Debugger = ReplayDebugger<MockControlChannel>;

/// Install the process-wide subscriber once and hand back its line buffer.
pub(crate) fn init_tracing() -> Arc<LogBuffer> {
    nova_replay_config::init_tracing(&LoggingConfig::default())
}

pub(crate) fn debugger() -> Debugger {
    init_tracing();
    ReplayDebugger::new(MockControlChannel::new())
}

pub(crate) fn at_break(progress: u64, script: ScriptId, offset: u32) -> ExecutionPoint {
    ExecutionPoint::at(1, progress, ExecutionPosition::breakpoint(script, offset))
}

/// Stop the subject at `point` and let the debugger settle.
pub(crate) fn pause(dbg: &mut Debugger, point: ExecutionPoint) {
    dbg.channel_mut().pause_at(point);
    dbg.run_until_idle().unwrap();
}
