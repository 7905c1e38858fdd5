//! Replay-debugging proxy for Nova.
//!
//! [`ReplayDebugger`] presents a debugger object model (frames, objects,
//! environments, scripts, breakpoints) describing a subject process that lives
//! behind a [`ControlChannel`] and can be paused, resumed in either direction,
//! and warped to arbitrary execution points.
//!
//! Mirrors of frames, objects and environments belong to a [`Pool`] that is
//! valid for exactly one pause. Every resume swaps in a fresh pool, so a mirror
//! obtained before a resume reports itself stale: it keeps answering from data
//! it already cached but never issues new round trips. Scripts and sources are
//! immutable and cached for the lifetime of the debugger.
//!
//! Everything runs on a single thread. Pause notifications from the channel
//! only update bookkeeping when they are drained; breakpoint handlers and
//! resume actions always run on a later turn of the debugger's run loop
//! (see [`ReplayDebugger::run_one_turn`] and [`ReplayDebugger::run_until_idle`]).

mod bridge;
mod breakpoints;
mod channel;
mod console;
mod controller;
mod debugger;
mod error;
mod mirror;
mod mock;
mod pool;
mod run_loop;
mod scripts;
mod value;
pub mod wire;

pub use bridge::RequestBridge;
pub use breakpoints::{BreakpointEntry, BreakpointPosition, BreakpointRegistry, HookId, PositionKind};
pub use channel::{
    ChannelEvent, ControlChannel, Direction, ExecutionPoint, ExecutionPosition, FrameIndex,
    Request, Response, ScriptQuery,
};
pub use console::ConsoleMessage;
pub use controller::{ControllerState, PauseController, ResumeAction};
pub use debugger::{
    ConsoleMessageHook, EventBreakpointHook, FrameHandler, NewScriptHook, PauseHook, PopHandler,
    ReplayDebugger,
};
pub use error::{ChannelError, ReplayError, Result};
pub use mirror::{
    EnvironmentMirror, FrameMirror, Mirror, ObjectMirror, ObjectPreview, PreviewLevel,
    PropertyDescriptor,
};
pub use mock::MockControlChannel;
pub use pool::Pool;
pub use scripts::{ScriptMirror, ScriptRegistry, SourceMirror};
pub use value::{Completion, Epoch, ObjectRef, Value};

pub use nova_replay_config::ProxyConfig;

pub type ObjectId = u64;
pub type ScriptId = u64;
pub type SourceId = u64;

/// Decode a wire completion record without a live subject.
///
/// Objects referenced by the record resolve to [`Value::Null`] because the
/// scratch pool used here is never the active one.
#[cfg(feature = "fuzzing")]
pub fn decode_completion_bytes(bytes: &[u8]) -> Result<Completion> {
    let wire: serde_json::Value = serde_json::from_slice(bytes)?;
    let mut pool = Pool::snapshot(Epoch::first());
    pool.convert_completion(&mut pool::Offline, &wire)
}
