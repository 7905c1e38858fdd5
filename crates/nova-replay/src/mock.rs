use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;
use serde_json::{json, Value as Json};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::wire::{ConsoleMessageData, ScriptData, SourceData};
use crate::{
    ChannelError, ChannelEvent, ControlChannel, Direction, ExecutionPoint, FrameIndex, ObjectId,
    Request, Response, ScriptId, SourceId,
};

/// Deterministic, in-memory control channel.
///
/// Requests are answered from canned data. Resumes stop at the next queued
/// stop for their direction, or at the start/end of the recording, and
/// announce the pause synchronously from inside the call.
#[derive(Default)]
pub struct MockControlChannel {
    events: Option<UnboundedSender<ChannelEvent>>,
    point: Option<ExecutionPoint>,
    forward_stops: VecDeque<ExecutionPoint>,
    backward_stops: VecDeque<ExecutionPoint>,
    frames: Vec<Json>,
    mirrors: HashMap<ObjectId, Json>,
    properties: HashMap<ObjectId, Json>,
    container_contents: HashMap<ObjectId, Json>,
    environment_names: HashMap<ObjectId, Json>,
    scripts: BTreeMap<ScriptId, ScriptData>,
    sources: BTreeMap<SourceId, SourceData>,
    console_messages: Vec<ConsoleMessageData>,
    pause_data: Option<Json>,
    overrides: HashMap<String, Json>,
    rejections: HashMap<String, String>,
    evaluations: HashMap<(u32, String), Json>,
    apply_results: HashMap<ObjectId, Json>,
    pop_frame_result: Option<Json>,
    diverges: bool,
    replaying_available: bool,
    disconnected: bool,
    pub requests: Vec<Request>,
    pub installed_breakpoints: Vec<Json>,
    pub resumes: Vec<Direction>,
    pub time_warps: Vec<ExecutionPoint>,
    pub ensure_replaying_calls: usize,
    pub pause_data_calls: usize,
    pub active_event_breakpoints: Vec<String>,
}

impl MockControlChannel {
    /// Checkpoint a forward resume stops at when no other stop is queued.
    pub const RECORDING_END: u64 = 1_000_000;

    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, event: ChannelEvent) {
        if let Some(events) = &self.events {
            // The debugger may have shut down.
            let _ = events.send(event);
        }
    }

    /// Stop the subject at `point` and announce it.
    pub fn pause_at(&mut self, point: ExecutionPoint) {
        self.point = Some(point);
        self.emit(ChannelEvent::Paused);
    }

    /// The next resume in `direction` stops at `point`.
    pub fn queue_stop(&mut self, direction: Direction, point: ExecutionPoint) {
        match direction {
            Direction::Forward => self.forward_stops.push_back(point),
            Direction::Backward => self.backward_stops.push_back(point),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.point.is_some()
    }

    /// Frames are answered by `index`; the last one pushed is the newest.
    pub fn push_frame(&mut self, frame: Json) {
        self.frames.push(frame);
    }

    pub fn clear_frames(&mut self) {
        self.frames.clear();
    }

    /// `data` is a `MirrorData` record (`{"kind": "Object", "id": ..}`).
    pub fn insert_object(&mut self, id: ObjectId, data: Json) {
        self.mirrors.insert(id, data);
    }

    pub fn set_properties(&mut self, id: ObjectId, props: Json) {
        self.properties.insert(id, props);
    }

    pub fn set_container_contents(&mut self, id: ObjectId, contents: Json) {
        self.container_contents.insert(id, contents);
    }

    pub fn set_environment_names(&mut self, id: ObjectId, names: Json) {
        self.environment_names.insert(id, names);
    }

    pub fn add_script(&mut self, script: ScriptData) {
        self.scripts.insert(script.id, script);
    }

    pub fn add_source(&mut self, source: SourceData) {
        self.sources.insert(source.id, source);
    }

    /// Register a script and notify the debugger about it.
    pub fn announce_script(&mut self, script: ScriptData) {
        self.add_script(script.clone());
        self.emit(ChannelEvent::NewScript(script));
    }

    /// Record a console message and notify the debugger about it.
    pub fn push_console_message(&mut self, message: ConsoleMessageData) {
        self.console_messages.push(message.clone());
        self.emit(ChannelEvent::ConsoleMessage(message));
    }

    pub fn trigger_event_breakpoint(&mut self, event: impl Into<String>) {
        self.emit(ChannelEvent::EventBreakpoint {
            event: event.into(),
        });
    }

    pub fn set_pause_data(&mut self, data: Json) {
        self.pause_data = Some(data);
    }

    /// Answer `request` with the raw record `response`, bypassing the canned
    /// data.
    pub fn set_response(&mut self, request: &Request, response: Json) {
        self.overrides.insert(request_key(request), response);
    }

    /// Answer `request` with an unhandled divergence.
    pub fn set_divergence_for(&mut self, request: &Request) {
        self.set_response(request, json!({ "unhandledDivergence": true }));
    }

    /// Fail `request` at the channel level.
    pub fn reject(&mut self, request: &Request, message: impl Into<String>) {
        self.rejections
            .insert(request_key(request), message.into());
    }

    pub fn set_evaluation(&mut self, frame_index: u32, text: impl Into<String>, completion: Json) {
        self.evaluations
            .insert((frame_index, text.into()), completion);
    }

    pub fn set_apply_result(&mut self, function: ObjectId, completion: Json) {
        self.apply_results.insert(function, completion);
    }

    pub fn set_pop_frame_result(&mut self, completion: Json) {
        self.pop_frame_result = Some(completion);
    }

    /// Make every diverging request report a divergence.
    pub fn set_diverges(&mut self, diverges: bool) {
        self.diverges = diverges;
    }

    /// Whether `ensure_replaying` can switch to a subject that does not diverge.
    pub fn set_replaying_available(&mut self, available: bool) {
        self.replaying_available = available;
    }

    pub fn disconnect(&mut self) {
        self.disconnected = true;
    }

    pub fn request_count(&self, name: &str) -> usize {
        self.requests
            .iter()
            .filter(|request| request.name() == name)
            .count()
    }

    fn check_connected(&self) -> Result<(), ChannelError> {
        if self.disconnected {
            return Err(ChannelError::Disconnected);
        }
        Ok(())
    }

    fn answer(&mut self, request: &Request) -> Result<Json, ChannelError> {
        Ok(match request {
            Request::GetFrame { index } => {
                let frame = match index {
                    FrameIndex::Newest => self.frames.last(),
                    FrameIndex::Depth(depth) => self
                        .frames
                        .iter()
                        .find(|frame| frame["index"].as_u64() == Some(u64::from(*depth))),
                };
                frame.cloned().unwrap_or_else(|| json!({}))
            }
            Request::GetObject { id } => self.mirrors.get(id).cloned().unwrap_or(Json::Null),
            Request::GetObjectProperties { id } => lookup_list(&self.properties, id),
            Request::GetObjectContainerContents { id } => {
                lookup_list(&self.container_contents, id)
            }
            Request::GetEnvironmentNames { id } => lookup_list(&self.environment_names, id),
            Request::GetScript { id } => to_json(self.scripts.get(id))?,
            Request::GetSource { id } => to_json(self.sources.get(id))?,
            Request::FindScripts { query } => {
                let found: Vec<&ScriptData> = self
                    .scripts
                    .values()
                    .filter(|script| query.url.is_none() || script.url == query.url)
                    .filter(|script| {
                        query.display_name.is_none() || script.display_name == query.display_name
                    })
                    .collect();
                to_json(&found)?
            }
            Request::FindSources => to_json(&self.sources.values().collect::<Vec<_>>())?,
            Request::FindConsoleMessages => to_json(&self.console_messages)?,
            Request::FrameEvaluate { frame_index, text } => self
                .evaluations
                .get(&(*frame_index, text.clone()))
                .cloned()
                .unwrap_or_else(undefined_completion),
            Request::ObjectApply { id, .. } => self
                .apply_results
                .get(id)
                .cloned()
                .unwrap_or_else(undefined_completion),
            Request::AddBreakpoint { position } => {
                self.installed_breakpoints.push(to_json(position)?);
                Json::Null
            }
            Request::ClearBreakpoints => {
                self.installed_breakpoints.clear();
                Json::Null
            }
            Request::PopFrameResult => self
                .pop_frame_result
                .clone()
                .unwrap_or_else(undefined_completion),
            Request::GetLineOffsets { .. } | Request::GetPossibleBreakpoints { .. } => json!([]),
            Request::GetOffsetLocation { .. } => Json::Null,
            Request::GetOffsetMetadata { .. } => json!({}),
            Request::SetActiveEventBreakpoints { events } => {
                self.active_event_breakpoints = events.clone();
                Json::Null
            }
        })
    }
}

impl ControlChannel for MockControlChannel {
    fn send_request(&mut self, request: &Request) -> Result<Response, ChannelError> {
        self.check_connected()?;
        self.requests.push(request.clone());
        let key = request_key(request);
        if let Some(message) = self.rejections.get(&key) {
            return Err(ChannelError::Rejected {
                request: request.name(),
                message: message.clone(),
            });
        }
        if let Some(raw) = self.overrides.get(&key) {
            return Ok(Response::from_json(raw.clone()));
        }
        if self.diverges && request.may_diverge() {
            return Ok(Response::UnhandledDivergence);
        }
        self.answer(request).map(Response::from_json)
    }

    fn ensure_replaying(&mut self) -> Result<(), ChannelError> {
        self.check_connected()?;
        self.ensure_replaying_calls += 1;
        if self.replaying_available {
            self.diverges = false;
        }
        Ok(())
    }

    fn resume(&mut self, direction: Direction) -> Result<(), ChannelError> {
        self.check_connected()?;
        self.resumes.push(direction);
        let stop = match direction {
            Direction::Forward => self
                .forward_stops
                .pop_front()
                .unwrap_or_else(|| ExecutionPoint::checkpoint(Self::RECORDING_END)),
            Direction::Backward => self
                .backward_stops
                .pop_front()
                .unwrap_or_else(|| ExecutionPoint::checkpoint(0)),
        };
        self.pause_at(stop);
        Ok(())
    }

    fn time_warp(&mut self, target: &ExecutionPoint) -> Result<(), ChannelError> {
        self.check_connected()?;
        self.time_warps.push(target.clone());
        self.pause_at(target.clone());
        Ok(())
    }

    fn wait_until_paused(&mut self) -> Result<(), ChannelError> {
        self.check_connected()?;
        let point = self
            .point
            .clone()
            .unwrap_or_else(|| ExecutionPoint::checkpoint(0));
        self.pause_at(point);
        Ok(())
    }

    fn pause_point(&self) -> Option<ExecutionPoint> {
        self.point.clone()
    }

    fn pause_data_and_repaint(&mut self) -> Result<Json, ChannelError> {
        self.check_connected()?;
        self.pause_data_calls += 1;
        Ok(self.pause_data.clone().unwrap_or_else(|| json!({})))
    }

    fn subscribe(&mut self) -> UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }
}

fn request_key(request: &Request) -> String {
    serde_json::to_string(request).unwrap_or_else(|_| request.name().to_string())
}

fn lookup_list(map: &HashMap<ObjectId, Json>, id: &ObjectId) -> Json {
    map.get(id).cloned().unwrap_or_else(|| json!([]))
}

fn undefined_completion() -> Json {
    json!({ "return": { "special": "undefined" } })
}

fn to_json<T: Serialize>(value: T) -> Result<Json, ChannelError> {
    serde_json::to_value(value).map_err(|err| ChannelError::Other(err.to_string()))
}
