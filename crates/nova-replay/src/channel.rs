//! Boundary with the external control channel.
//!
//! The channel owns the subject process: it pauses, resumes and rewinds it,
//! and answers data queries about whatever state the subject is stopped in.
//! Nothing here fixes a transport; [`crate::MockControlChannel`] is an
//! in-memory implementation.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as Json;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::breakpoints::{BreakpointPosition, PositionKind};
use crate::wire::{ConsoleMessageData, ScriptData};
use crate::{ChannelError, ObjectId, ScriptId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        })
    }
}

/// Where the subject is stopped, as reported by the channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPoint {
    pub checkpoint: u64,
    #[serde(default)]
    pub progress: u64,
    /// `None` for internal checkpoints that correspond to no source position.
    #[serde(default)]
    pub position: Option<ExecutionPosition>,
}

impl ExecutionPoint {
    pub fn checkpoint(checkpoint: u64) -> Self {
        Self {
            checkpoint,
            progress: 0,
            position: None,
        }
    }

    pub fn at(checkpoint: u64, progress: u64, position: ExecutionPosition) -> Self {
        Self {
            checkpoint,
            progress,
            position: Some(position),
        }
    }
}

/// The concrete position of an execution point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPosition {
    pub kind: PositionKind,
    #[serde(default)]
    pub script: Option<ScriptId>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub frame_index: Option<u32>,
}

impl ExecutionPosition {
    fn new(kind: PositionKind) -> Self {
        Self {
            kind,
            script: None,
            offset: None,
            frame_index: None,
        }
    }

    pub fn breakpoint(script: ScriptId, offset: u32) -> Self {
        Self {
            script: Some(script),
            offset: Some(offset),
            ..Self::new(PositionKind::Break)
        }
    }

    pub fn step(script: ScriptId, offset: u32, frame_index: u32) -> Self {
        Self {
            script: Some(script),
            offset: Some(offset),
            frame_index: Some(frame_index),
            ..Self::new(PositionKind::OnStep)
        }
    }

    pub fn pop(script: ScriptId, frame_index: u32) -> Self {
        Self {
            script: Some(script),
            frame_index: Some(frame_index),
            ..Self::new(PositionKind::OnPop)
        }
    }

    pub fn enter_frame(script: ScriptId, frame_index: u32) -> Self {
        Self {
            script: Some(script),
            frame_index: Some(frame_index),
            ..Self::new(PositionKind::EnterFrame)
        }
    }

    pub fn debugger_statement(script: ScriptId, offset: u32) -> Self {
        Self {
            script: Some(script),
            offset: Some(offset),
            ..Self::new(PositionKind::DebuggerStatement)
        }
    }

    pub fn with_frame_index(mut self, frame_index: u32) -> Self {
        self.frame_index = Some(frame_index);
        self
    }
}

/// Frame selector for `getFrame`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameIndex {
    /// Whatever frame is topmost at the current pause.
    Newest,
    /// Depth from the oldest frame (0).
    Depth(u32),
}

impl Serialize for FrameIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FrameIndex::Newest => serializer.serialize_str("newest"),
            FrameIndex::Depth(index) => serializer.serialize_u32(*index),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ScriptQuery {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// A query or command for the control channel.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    GetFrame {
        index: FrameIndex,
    },
    GetObject {
        id: ObjectId,
    },
    GetObjectProperties {
        id: ObjectId,
    },
    GetObjectContainerContents {
        id: ObjectId,
    },
    GetEnvironmentNames {
        id: ObjectId,
    },
    GetScript {
        id: ScriptId,
    },
    GetSource {
        id: crate::SourceId,
    },
    FindScripts {
        query: ScriptQuery,
    },
    FindSources,
    FindConsoleMessages,
    FrameEvaluate {
        #[serde(rename = "frameIndex")]
        frame_index: u32,
        text: String,
    },
    ObjectApply {
        id: ObjectId,
        this: Json,
        args: Vec<Json>,
    },
    AddBreakpoint {
        position: BreakpointPosition,
    },
    ClearBreakpoints,
    PopFrameResult,
    GetLineOffsets {
        script: ScriptId,
        line: u32,
    },
    GetOffsetLocation {
        script: ScriptId,
        offset: u32,
    },
    GetPossibleBreakpoints {
        script: ScriptId,
    },
    GetOffsetMetadata {
        script: ScriptId,
        offset: u32,
    },
    SetActiveEventBreakpoints {
        events: Vec<String>,
    },
}

impl Request {
    /// Wire name of the request kind, used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Request::GetFrame { .. } => "getFrame",
            Request::GetObject { .. } => "getObject",
            Request::GetObjectProperties { .. } => "getObjectProperties",
            Request::GetObjectContainerContents { .. } => "getObjectContainerContents",
            Request::GetEnvironmentNames { .. } => "getEnvironmentNames",
            Request::GetScript { .. } => "getScript",
            Request::GetSource { .. } => "getSource",
            Request::FindScripts { .. } => "findScripts",
            Request::FindSources => "findSources",
            Request::FindConsoleMessages => "findConsoleMessages",
            Request::FrameEvaluate { .. } => "frameEvaluate",
            Request::ObjectApply { .. } => "objectApply",
            Request::AddBreakpoint { .. } => "addBreakpoint",
            Request::ClearBreakpoints => "clearBreakpoints",
            Request::PopFrameResult => "popFrameResult",
            Request::GetLineOffsets { .. } => "getLineOffsets",
            Request::GetOffsetLocation { .. } => "getOffsetLocation",
            Request::GetPossibleBreakpoints { .. } => "getPossibleBreakpoints",
            Request::GetOffsetMetadata { .. } => "getOffsetMetadata",
            Request::SetActiveEventBreakpoints { .. } => "setActiveEventBreakpoints",
        }
    }

    /// Requests that make the subject execute speculatively.
    ///
    /// These cannot be answered by a pure recording.
    pub fn may_diverge(&self) -> bool {
        matches!(
            self,
            Request::FrameEvaluate { .. }
                | Request::ObjectApply { .. }
                | Request::GetObjectProperties { .. }
                | Request::GetObjectContainerContents { .. }
                | Request::GetEnvironmentNames { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Value(Json),
    /// The subject could not perform the request without leaving the recording.
    UnhandledDivergence,
}

impl Response {
    /// Classify a raw response record.
    pub fn from_json(raw: Json) -> Self {
        if raw.get("unhandledDivergence").and_then(Json::as_bool) == Some(true) {
            Response::UnhandledDivergence
        } else {
            Response::Value(raw)
        }
    }
}

/// Asynchronous notifications from the channel.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// The subject stopped; [`ControlChannel::pause_point`] describes where.
    Paused,
    NewScript(ScriptData),
    ConsoleMessage(ConsoleMessageData),
    EventBreakpoint { event: String },
}

/// Control-channel interface consumed by the replay proxy.
///
/// Calls are blocking round trips. A channel may emit [`ChannelEvent`]s while a
/// call is outstanding (for example a `Paused` event from inside
/// [`ControlChannel::resume`]); the debugger only looks at them once the call
/// has returned.
pub trait ControlChannel {
    fn send_request(&mut self, request: &Request) -> Result<Response, ChannelError>;

    /// Switch to a subject able to execute speculatively, if one exists.
    fn ensure_replaying(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn resume(&mut self, direction: Direction) -> Result<(), ChannelError>;

    /// Blocks until the subject has stopped at `target`.
    fn time_warp(&mut self, target: &ExecutionPoint) -> Result<(), ChannelError>;

    /// Blocks until the subject has stopped.
    fn wait_until_paused(&mut self) -> Result<(), ChannelError>;

    /// `None` while the subject is running.
    fn pause_point(&self) -> Option<ExecutionPoint>;

    /// Bulk description of the current pause, see [`crate::wire::PauseData`].
    fn pause_data_and_repaint(&mut self) -> Result<Json, ChannelError>;

    /// Start receiving notifications. Only the most recent subscriber is fed.
    fn subscribe(&mut self) -> UnboundedReceiver<ChannelEvent>;
}
