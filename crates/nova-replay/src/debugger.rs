use std::rc::Rc;

use nova_replay_config::ProxyConfig;
use serde_json::Value as Json;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::breakpoints::{BreakpointEntry, BreakpointPosition, BreakpointRegistry, HookId, PositionKind};
use crate::bridge::substitute_fallback;
use crate::console::ConsoleMessage;
use crate::controller::{ControllerState, PauseController, ResumeAction};
use crate::mirror::{EnvironmentMirror, FrameMirror, Mirror, ObjectMirror, PropertyDescriptor};
use crate::pool::{Offline, Pool};
use crate::run_loop::{RunLoop, Task};
use crate::scripts::{ScriptMirror, ScriptRegistry, SourceMirror};
use crate::wire::{ConsoleMessageData, NameValue, PauseData, WireProperty};
use crate::{
    ChannelEvent, Completion, ControlChannel, Direction, Epoch, ExecutionPoint, FrameIndex,
    ObjectRef, ReplayError, Request, RequestBridge, Result, ScriptId, ScriptQuery, SourceId,
    Value,
};

const EVALUATE_DIVERGENCE: &str = "Recording divergence in evaluating";
const CALL_DIVERGENCE: &str = "Recording divergence in callFunction";

type Handler<C> = Rc<dyn Fn(&mut ReplayDebugger<C>) -> Result<()>>;

/// Breakpoint callback. Receives the newest frame at the pause, if any.
pub type FrameHandler<C> = Rc<dyn Fn(&mut ReplayDebugger<C>, Option<Rc<FrameMirror>>) -> Result<()>>;

/// Frame-pop callback. Receives the popping frame and how it completed.
pub type PopHandler<C> =
    Rc<dyn Fn(&mut ReplayDebugger<C>, Option<Rc<FrameMirror>>, Completion) -> Result<()>>;

pub type NewScriptHook<C> = Rc<dyn Fn(&mut ReplayDebugger<C>, Rc<ScriptMirror>) -> Result<()>>;

pub type ConsoleMessageHook<C> = Rc<dyn Fn(&mut ReplayDebugger<C>, ConsoleMessage) -> Result<()>>;

pub type EventBreakpointHook<C> = Rc<dyn Fn(&mut ReplayDebugger<C>, &str) -> Result<()>>;

/// Called once the subject has settled at a pause, with the newest frame.
pub type PauseHook<C> = Rc<dyn Fn(&mut ReplayDebugger<C>, Option<Rc<FrameMirror>>) -> Result<()>>;

struct Hooks<C> {
    pause: Option<PauseHook<C>>,
    new_script: Option<NewScriptHook<C>>,
    console_message: Option<ConsoleMessageHook<C>>,
    event_breakpoint: Option<EventBreakpointHook<C>>,
}

impl<C> Default for Hooks<C> {
    fn default() -> Self {
        Self {
            pause: None,
            new_script: None,
            console_message: None,
            event_breakpoint: None,
        }
    }
}

/// Debugger object model over a subject behind a [`ControlChannel`].
///
/// One instance per channel. Consumer calls run synchronously; breakpoint
/// handlers, resumes and notification hooks run from [`Self::run_one_turn`].
pub struct ReplayDebugger<C> {
    bridge: RequestBridge<C>,
    notifications: Option<UnboundedReceiver<ChannelEvent>>,
    pool: Pool,
    scripts: ScriptRegistry,
    breakpoints: BreakpointRegistry<Handler<C>>,
    controller: PauseController,
    run_loop: RunLoop,
    hooks: Hooks<C>,
    config: ProxyConfig,
    next_epoch: Epoch,
}

impl<C: ControlChannel + 'static> ReplayDebugger<C> {
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, ProxyConfig::default())
    }

    pub fn with_config(mut channel: C, config: ProxyConfig) -> Self {
        let notifications = channel.subscribe();
        let epoch = Epoch::first();
        tracing::debug!(target: "nova.replay", ?config, "replay debugger attached");
        Self {
            bridge: RequestBridge::new(channel),
            notifications: Some(notifications),
            pool: Pool::new(epoch),
            scripts: ScriptRegistry::new(),
            breakpoints: BreakpointRegistry::new(),
            controller: PauseController::new(),
            run_loop: RunLoop::default(),
            hooks: Hooks::default(),
            config,
            next_epoch: epoch.next(),
        }
    }

    pub fn channel(&self) -> &C {
        self.bridge.channel()
    }

    /// Mutable access to the channel. Mostly useful in tests driving a
    /// [`crate::MockControlChannel`].
    pub fn channel_mut(&mut self) -> &mut C {
        self.bridge.channel_mut()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Stop observing the channel. Later notifications are ignored.
    pub fn shutdown(&mut self) {
        if self.notifications.take().is_some() {
            tracing::info!(target: "nova.replay", "replay debugger detached");
        }
        self.run_loop.clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.notifications.is_none()
    }

    // ---------------------------------------------------------------------
    // Run loop

    /// Drain notifications, then run at most one deferred task.
    ///
    /// Returns whether a task ran.
    pub fn run_one_turn(&mut self) -> Result<bool> {
        self.pump_notifications()?;
        let Some(task) = self.run_loop.next() else {
            return Ok(false);
        };
        match task {
            Task::DispatchPauseHandlers => self.dispatch_pause_handlers()?,
            Task::PerformResume => self.perform_resume()?,
            Task::NewScript(id) => {
                let hook = self.hooks.new_script.clone();
                if let (Some(hook), Some(script)) = (hook, self.scripts.cached_script(id)) {
                    hook(self, script)?;
                }
            }
            Task::ConsoleMessage(data) => {
                if let Some(hook) = self.hooks.console_message.clone() {
                    let message = ConsoleMessage::new(self.allocate_epoch(), *data)?;
                    hook(self, message)?;
                }
            }
            Task::EventBreakpoint(event) => {
                if let Some(hook) = self.hooks.event_breakpoint.clone() {
                    hook(self, &event)?;
                }
            }
        }
        Ok(true)
    }

    /// Run turns until no work is left. Returns the number of tasks run.
    pub fn run_until_idle(&mut self) -> Result<usize> {
        let limit = self.config.max_run_loop_turns;
        for turns in 0..limit {
            if !self.run_one_turn()? {
                return Ok(turns);
            }
        }
        self.pump_notifications()?;
        if self.run_loop.is_empty() {
            return Ok(limit);
        }
        Err(ReplayError::invariant(format!(
            "run loop still busy after {limit} turns ({} tasks queued)",
            self.run_loop.len()
        )))
    }

    pub fn pending_tasks(&self) -> usize {
        self.run_loop.len()
    }

    fn pump_notifications(&mut self) -> Result<()> {
        let mut events = Vec::new();
        if let Some(rx) = self.notifications.as_mut() {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        for event in events {
            self.on_channel_event(event);
        }
        Ok(())
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Paused => self.on_subject_paused(),
            ChannelEvent::NewScript(data) => {
                let script = self.scripts.insert_script(data);
                if self.hooks.new_script.is_some() {
                    self.run_loop.post(Task::NewScript(script.id()));
                }
            }
            ChannelEvent::ConsoleMessage(data) => {
                if self.hooks.console_message.is_some() {
                    self.run_loop.post(Task::ConsoleMessage(Box::new(data)));
                }
            }
            ChannelEvent::EventBreakpoint { event } => {
                if self.hooks.event_breakpoint.is_some() {
                    self.run_loop.post(Task::EventBreakpoint(event));
                }
            }
        }
    }

    fn on_subject_paused(&mut self) {
        let point = self.bridge.channel().pause_point();
        let was_paused = self.controller.is_paused();
        if !self.controller.on_subject_paused(point.clone()) {
            tracing::trace!(target: "nova.replay", ?point, "duplicate pause notification");
            return;
        }
        if was_paused {
            // The subject moved without going through a resume.
            self.swap_pool("pause point changed");
        }
        tracing::debug!(target: "nova.replay", ?point, "subject paused");
        self.run_loop.post(Task::DispatchPauseHandlers);
    }

    /// Run the breakpoint handlers for the current pause, then either keep
    /// going in the preferred direction or tell the pause hook where we are.
    fn dispatch_pause_handlers(&mut self) -> Result<()> {
        if !self.controller.take_dispatch() {
            return Ok(());
        }
        // Checkpoints and the ends of the recording match no breakpoint and
        // always stop.
        let Some(position) = self
            .bridge
            .channel()
            .pause_point()
            .and_then(|point| point.position)
        else {
            return self.notify_paused();
        };

        let handlers = self.breakpoints.matching_handlers(&position);
        tracing::debug!(
            target: "nova.replay",
            ?position,
            handlers = handlers.len(),
            "dispatching pause handlers"
        );
        for handler in handlers {
            handler(self)?;
            if self.controller.pending().is_some() {
                break;
            }
        }

        if self.controller.pending().is_some() {
            return Ok(());
        }
        if let Some(direction) = self.controller.preferred_direction() {
            tracing::debug!(target: "nova.replay", %direction, "auto-resuming");
            return self.request_resume(ResumeAction::Resume(direction));
        }
        self.notify_paused()
    }

    fn notify_paused(&mut self) -> Result<()> {
        let Some(hook) = self.hooks.pause.clone() else {
            return Ok(());
        };
        let frame = self.get_newest_frame()?;
        hook(self, frame)
    }

    fn request_resume(&mut self, action: ResumeAction) -> Result<()> {
        if self.controller.request(action)? {
            self.run_loop.post(Task::PerformResume);
        }
        Ok(())
    }

    fn perform_resume(&mut self) -> Result<()> {
        let point = self.bridge.channel().pause_point();
        let Some(action) = self.controller.take_resume()? else {
            return Ok(());
        };
        self.swap_pool("resume");
        tracing::debug!(target: "nova.replay", ?action, "resuming subject");
        let moved = match &action {
            ResumeAction::Resume(direction) => {
                self.controller.set_preferred_direction(Some(*direction));
                self.bridge.channel_mut().resume(*direction)
            }
            ResumeAction::TimeWarp(target) => {
                self.controller.set_preferred_direction(None);
                self.bridge.channel_mut().time_warp(target)
            }
        };
        if let Err(err) = moved {
            tracing::warn!(target: "nova.replay", ?action, error = %err, "resume failed");
            self.controller.resume_failed(point);
            return Err(err.into());
        }
        self.pump_notifications()
    }

    fn swap_pool(&mut self, reason: &'static str) {
        let epoch = self.allocate_epoch();
        let old = std::mem::replace(&mut self.pool, Pool::new(epoch));
        tracing::debug!(
            target: "nova.replay.pool",
            old = %old.epoch(),
            new = %epoch,
            reason,
            "pool swapped"
        );
    }

    fn allocate_epoch(&mut self) -> Epoch {
        let epoch = self.next_epoch;
        self.next_epoch = epoch.next();
        epoch
    }

    // ---------------------------------------------------------------------
    // Pause / resume

    pub fn replay_resume_forward(&mut self) -> Result<()> {
        self.request_resume(ResumeAction::Resume(Direction::Forward))
    }

    pub fn replay_resume_backward(&mut self) -> Result<()> {
        self.request_resume(ResumeAction::Resume(Direction::Backward))
    }

    pub fn replay_time_warp(&mut self, target: ExecutionPoint) -> Result<()> {
        self.request_resume(ResumeAction::TimeWarp(target))
    }

    /// Stop wherever the subject is and stay there.
    pub fn replay_pause(&mut self) -> Result<()> {
        self.controller.set_preferred_direction(None);
        self.bridge.channel_mut().wait_until_paused()?;
        self.pump_notifications()
    }

    /// Hold the subject while a consumer inspects it.
    ///
    /// The first level hydrates the pool when
    /// [`ProxyConfig::hydrate_on_thread_pause`] is set. It also cancels the
    /// pending handler dispatch and clears the preferred direction. A failed
    /// hydration leaves the nesting level unchanged.
    pub fn replay_push_thread_pause(&mut self) -> Result<()> {
        let first = self.controller.thread_pauses() == 0;
        if first && self.config.hydrate_on_thread_pause && self.controller.is_paused() {
            self.hydrate()?;
        }
        self.controller.push_thread_pause()?;
        tracing::debug!(
            target: "nova.replay",
            depth = self.controller.thread_pauses(),
            "thread-wide pause pushed"
        );
        Ok(())
    }

    pub fn replay_pop_thread_pause(&mut self) -> Result<()> {
        if self.controller.pop_thread_pause()? {
            self.run_loop.post(Task::PerformResume);
        }
        tracing::debug!(
            target: "nova.replay",
            depth = self.controller.thread_pauses(),
            "thread-wide pause popped"
        );
        Ok(())
    }

    /// Fill the current pool from the channel's bulk pause data.
    ///
    /// Returns `false` if the pool already had frames.
    pub fn hydrate(&mut self) -> Result<bool> {
        if self.pool.has_frames() {
            return Ok(false);
        }
        let raw = self.bridge.channel_mut().pause_data_and_repaint()?;
        let data: PauseData = serde_json::from_value(raw)
            .map_err(|err| ReplayError::protocol(format!("malformed pause data: {err}")))?;
        self.pool.hydrate(&mut self.bridge, data)
    }

    pub fn is_paused(&self) -> bool {
        self.controller.is_paused()
    }

    pub fn state(&self) -> ControllerState {
        self.controller.state()
    }

    pub fn preferred_direction(&self) -> Option<Direction> {
        self.controller.preferred_direction()
    }

    pub fn thread_pause_depth(&self) -> u32 {
        self.controller.thread_pauses()
    }

    pub fn current_execution_point(&self) -> Option<ExecutionPoint> {
        self.bridge.channel().pause_point()
    }

    pub fn current_epoch(&self) -> Epoch {
        self.pool.epoch()
    }

    /// Whether mirrors tagged with `epoch` may still issue round trips.
    pub fn is_current(&self, epoch: Epoch) -> bool {
        epoch == self.pool.epoch()
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    // ---------------------------------------------------------------------
    // Frames

    /// `None` when the subject is stopped outside interpreted code.
    pub fn get_newest_frame(&mut self) -> Result<Option<Rc<FrameMirror>>> {
        self.pool.get_frame(&mut self.bridge, FrameIndex::Newest)
    }

    pub fn frame(&mut self, index: u32) -> Result<Rc<FrameMirror>> {
        self.pool
            .get_frame(&mut self.bridge, FrameIndex::Depth(index))?
            .ok_or(ReplayError::InvalidFrameIndex(index))
    }

    pub fn older_frame(&mut self, frame: &FrameMirror) -> Result<Option<Rc<FrameMirror>>> {
        if !self.is_current(frame.epoch()) {
            return Ok(None);
        }
        frame
            .older_index()
            .map(|index| self.frame(index))
            .transpose()
    }

    /// All frames, newest first.
    pub fn frames(&mut self) -> Result<Vec<Rc<FrameMirror>>> {
        let mut out = Vec::new();
        let mut next = self.get_newest_frame()?;
        while let Some(frame) = next {
            next = self.older_frame(&frame)?;
            out.push(frame);
        }
        Ok(out)
    }

    pub fn frame_callee(&mut self, frame: &FrameMirror) -> Result<Option<Rc<ObjectMirror>>> {
        self.follow_object(frame.callee())
    }

    pub fn frame_environment(
        &mut self,
        frame: &FrameMirror,
    ) -> Result<Option<Rc<EnvironmentMirror>>> {
        self.follow_environment(frame.environment())
    }

    pub fn frame_script(&mut self, frame: &FrameMirror) -> Result<Option<Rc<ScriptMirror>>> {
        self.script(frame.script())
    }

    /// Evaluate `text` in `frame`, answering a divergence with a thrown
    /// "Recording divergence in evaluating".
    ///
    /// `None` if the frame is stale.
    pub fn evaluate(&mut self, frame: &FrameMirror, text: &str) -> Result<Option<Completion>> {
        self.evaluate_with_fallback(frame, text, Some(Completion::throw(EVALUATE_DIVERGENCE)))
    }

    /// Like [`Self::evaluate`]; without a fallback a divergence is fatal.
    pub fn evaluate_with_fallback(
        &mut self,
        frame: &FrameMirror,
        text: &str,
        fallback: Option<Completion>,
    ) -> Result<Option<Completion>> {
        if !self.is_current(frame.epoch()) {
            return Ok(None);
        }
        let request = Request::FrameEvaluate {
            frame_index: frame.index(),
            text: text.to_string(),
        };
        self.diverging_completion(request, fallback).map(Some)
    }

    /// A diverged request yields `fallback` exactly as the caller built it.
    fn diverging_completion(
        &mut self,
        request: Request,
        fallback: Option<Completion>,
    ) -> Result<Completion> {
        match self.bridge.try_send_diverging(&request)? {
            Some(raw) => self.pool.convert_completion(&mut self.bridge, &raw),
            None => substitute_fallback(&request, fallback),
        }
    }

    // ---------------------------------------------------------------------
    // Objects

    /// Resolve a reference. `None` if it is stale.
    pub fn mirror(&mut self, obj: ObjectRef) -> Result<Option<Mirror>> {
        if !self.pool.owns(obj) {
            return Ok(None);
        }
        match self.pool.get_object(&mut self.bridge, obj.id)? {
            Some(mirror) => Ok(Some(mirror)),
            None => Err(ReplayError::InvalidObjectId(obj.id)),
        }
    }

    pub fn object(&mut self, obj: ObjectRef) -> Result<Option<Rc<ObjectMirror>>> {
        match self.mirror(obj)? {
            None => Ok(None),
            Some(Mirror::Object(object)) => Ok(Some(object)),
            Some(Mirror::Environment(_)) => Err(ReplayError::InvalidObjectId(obj.id)),
        }
    }

    pub fn environment(&mut self, obj: ObjectRef) -> Result<Option<Rc<EnvironmentMirror>>> {
        match self.mirror(obj)? {
            None => Ok(None),
            Some(Mirror::Environment(env)) => Ok(Some(env)),
            Some(Mirror::Object(_)) => Err(ReplayError::InvalidObjectId(obj.id)),
        }
    }

    fn follow_object(&mut self, obj: Option<ObjectRef>) -> Result<Option<Rc<ObjectMirror>>> {
        match obj {
            Some(obj) => self.object(obj),
            None => Ok(None),
        }
    }

    fn follow_environment(
        &mut self,
        obj: Option<ObjectRef>,
    ) -> Result<Option<Rc<EnvironmentMirror>>> {
        match obj {
            Some(obj) => self.environment(obj),
            None => Ok(None),
        }
    }

    pub fn proto(&mut self, object: &ObjectMirror) -> Result<Option<Rc<ObjectMirror>>> {
        self.follow_object(object.proto())
    }

    pub fn bound_target_function(
        &mut self,
        object: &ObjectMirror,
    ) -> Result<Option<Rc<ObjectMirror>>> {
        self.follow_object(object.bound_target_function())
    }

    pub fn proxy_target(&mut self, object: &ObjectMirror) -> Result<Option<Rc<ObjectMirror>>> {
        self.follow_object(object.proxy_target())
    }

    pub fn proxy_handler(&mut self, object: &ObjectMirror) -> Result<Option<Rc<ObjectMirror>>> {
        self.follow_object(object.proxy_handler())
    }

    pub fn object_environment(
        &mut self,
        object: &ObjectMirror,
    ) -> Result<Option<Rc<EnvironmentMirror>>> {
        self.follow_environment(object.environment())
    }

    pub fn object_script(&mut self, object: &ObjectMirror) -> Result<Option<Rc<ScriptMirror>>> {
        match object.script() {
            Some(id) => self.script(id),
            None => Ok(None),
        }
    }

    pub fn bound_this(&mut self, object: &ObjectMirror) -> Result<Option<Value>> {
        let Some(raw) = object.data().bound_this.clone() else {
            return Ok(None);
        };
        self.convert_for(object.epoch(), &raw).map(Some)
    }

    pub fn bound_arguments(&mut self, object: &ObjectMirror) -> Result<Vec<Value>> {
        let raw = object.data().bound_arguments.clone();
        raw.iter()
            .map(|value| self.convert_for(object.epoch(), value))
            .collect()
    }

    pub fn own_property_names(&mut self, object: &ObjectMirror) -> Result<Vec<String>> {
        Ok(self
            .own_properties(object)?
            .into_iter()
            .map(|prop| prop.name)
            .collect())
    }

    /// Answered from the preview when there is one.
    pub fn own_property_names_count(&mut self, object: &ObjectMirror) -> Result<usize> {
        if let Some(preview) = object.preview() {
            return Ok(preview.own_property_names_count);
        }
        Ok(self.own_properties(object)?.len())
    }

    pub fn enumerable_own_property_names_for_preview(
        &mut self,
        object: &ObjectMirror,
    ) -> Result<Vec<String>> {
        if let Some(preview) = object.preview() {
            return Ok(preview
                .enumerable_own_properties
                .into_iter()
                .map(|prop| prop.name)
                .collect());
        }
        Ok(self
            .own_properties(object)?
            .into_iter()
            .filter(|prop| prop.desc.enumerable)
            .map(|prop| prop.name)
            .collect())
    }

    pub fn own_property_descriptor(
        &mut self,
        object: &ObjectMirror,
        name: &str,
    ) -> Result<Option<PropertyDescriptor>> {
        let Some(prop) = self
            .own_properties(object)?
            .into_iter()
            .find(|prop| prop.name == name)
        else {
            return Ok(None);
        };
        if self.is_current(object.epoch()) {
            self.pool
                .convert_descriptor(&mut self.bridge, &prop.desc)
                .map(Some)
        } else {
            Pool::snapshot(object.epoch())
                .convert_descriptor(&mut Offline, &prop.desc)
                .map(Some)
        }
    }

    /// Elements of a Map, Set or similar container.
    pub fn container_contents(&mut self, object: &ObjectMirror) -> Result<Vec<Value>> {
        let raw = match object.known_container_contents() {
            Some(contents) => contents,
            None if !self.is_current(object.epoch()) => return Ok(Vec::new()),
            None => {
                let fetched: Vec<Json> = self.bridge.send_diverging(
                    Request::GetObjectContainerContents { id: object.id() },
                    Some(Vec::new()),
                )?;
                object.cache_container_contents(fetched).to_vec()
            }
        };
        raw.iter()
            .map(|value| self.convert_for(object.epoch(), value))
            .collect()
    }

    /// Result of a getter call cached in the preview.
    pub fn getter_value(&mut self, object: &ObjectMirror, name: &str) -> Result<Option<Value>> {
        let Some(raw) = object
            .preview()
            .and_then(|preview| preview.getter_value(name).cloned())
        else {
            return Ok(None);
        };
        self.convert_for(object.epoch(), &raw).map(Some)
    }

    fn own_properties(&mut self, object: &ObjectMirror) -> Result<Vec<WireProperty>> {
        if let Some(props) = object.known_properties() {
            return Ok(props);
        }
        if !self.is_current(object.epoch()) {
            return Ok(Vec::new());
        }
        let fetched: Vec<WireProperty> = self.bridge.send_diverging(
            Request::GetObjectProperties { id: object.id() },
            Some(Vec::new()),
        )?;
        Ok(object.cache_properties(fetched).to_vec())
    }

    /// Call `function`, answering a divergence with a thrown
    /// "Recording divergence in callFunction".
    ///
    /// `None` if the function mirror is stale.
    pub fn apply(
        &mut self,
        function: &ObjectMirror,
        this: &Value,
        args: &[Value],
    ) -> Result<Option<Completion>> {
        self.apply_with_fallback(function, this, args, Some(Completion::throw(CALL_DIVERGENCE)))
    }

    pub fn call(
        &mut self,
        function: &ObjectMirror,
        this: &Value,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Option<Completion>> {
        let args: Vec<Value> = args.into_iter().collect();
        self.apply(function, this, &args)
    }

    /// Like [`Self::apply`]; without a fallback a divergence is fatal.
    pub fn apply_with_fallback(
        &mut self,
        function: &ObjectMirror,
        this: &Value,
        args: &[Value],
        fallback: Option<Completion>,
    ) -> Result<Option<Completion>> {
        if !self.is_current(function.epoch()) {
            return Ok(None);
        }
        let epoch = self.pool.epoch();
        let this = this.to_wire(epoch)?;
        let args = args
            .iter()
            .map(|arg| arg.to_wire(epoch))
            .collect::<Result<Vec<_>>>()?;
        let request = Request::ObjectApply {
            id: function.id(),
            this,
            args,
        };
        self.diverging_completion(request, fallback).map(Some)
    }

    pub fn freeze(&mut self, _object: &ObjectMirror) -> Result<()> {
        Err(ReplayError::NotAllowed("freeze"))
    }

    pub fn seal(&mut self, _object: &ObjectMirror) -> Result<()> {
        Err(ReplayError::NotAllowed("seal"))
    }

    pub fn prevent_extensions(&mut self, _object: &ObjectMirror) -> Result<()> {
        Err(ReplayError::NotAllowed("preventExtensions"))
    }

    pub fn define_property(
        &mut self,
        _object: &ObjectMirror,
        _name: &str,
        _desc: PropertyDescriptor,
    ) -> Result<()> {
        Err(ReplayError::NotAllowed("defineProperty"))
    }

    pub fn delete_property(&mut self, _object: &ObjectMirror, _name: &str) -> Result<()> {
        Err(ReplayError::NotAllowed("deleteProperty"))
    }

    pub fn set_property(&mut self, _object: &ObjectMirror, _name: &str, _value: Value) -> Result<()> {
        Err(ReplayError::NotAllowed("setProperty"))
    }

    pub fn unwrap(&mut self, _object: &ObjectMirror) -> Result<Option<Rc<ObjectMirror>>> {
        Err(ReplayError::NotImplemented("unwrap"))
    }

    pub fn make_debuggee_value(&mut self, _value: Value) -> Result<Value> {
        Err(ReplayError::NotImplemented("makeDebuggeeValue"))
    }

    // ---------------------------------------------------------------------
    // Environments

    pub fn environment_names(&mut self, env: &EnvironmentMirror) -> Result<Vec<String>> {
        Ok(self
            .environment_bindings(env)?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    pub fn environment_variable(
        &mut self,
        env: &EnvironmentMirror,
        name: &str,
    ) -> Result<Option<Value>> {
        self.environment_bindings(env)?;
        let Some(raw) = env.known_variable(name).cloned() else {
            return Ok(None);
        };
        self.convert_for(env.epoch(), &raw).map(Some)
    }

    pub fn environment_parent(
        &mut self,
        env: &EnvironmentMirror,
    ) -> Result<Option<Rc<EnvironmentMirror>>> {
        self.follow_environment(env.parent())
    }

    pub fn environment_object(
        &mut self,
        env: &EnvironmentMirror,
    ) -> Result<Option<Rc<ObjectMirror>>> {
        self.follow_object(env.object())
    }

    pub fn environment_callee(
        &mut self,
        env: &EnvironmentMirror,
    ) -> Result<Option<Rc<ObjectMirror>>> {
        self.follow_object(env.callee())
    }

    pub fn set_variable(&mut self, _env: &EnvironmentMirror, _name: &str, _value: Value) -> Result<()> {
        Err(ReplayError::NotAllowed("setVariable"))
    }

    fn environment_bindings(&mut self, env: &EnvironmentMirror) -> Result<Vec<NameValue>> {
        if let Some(names) = env.known_names() {
            return Ok(names.to_vec());
        }
        if !self.is_current(env.epoch()) {
            return Ok(Vec::new());
        }
        let fetched: Vec<NameValue> = self.bridge.send_diverging(
            Request::GetEnvironmentNames { id: env.id() },
            Some(Vec::new()),
        )?;
        Ok(env.cache_names(fetched).to_vec())
    }

    fn convert_for(&mut self, epoch: Epoch, raw: &Json) -> Result<Value> {
        if self.is_current(epoch) {
            self.pool.convert_value(&mut self.bridge, raw)
        } else {
            // Stale: only a snapshot view, so references resolve to null.
            Pool::snapshot(epoch).convert_value(&mut Offline, raw)
        }
    }

    // ---------------------------------------------------------------------
    // Scripts and sources

    pub fn script(&mut self, id: ScriptId) -> Result<Option<Rc<ScriptMirror>>> {
        self.scripts.script(&mut self.bridge, id)
    }

    pub fn source(&mut self, id: SourceId) -> Result<Option<Rc<SourceMirror>>> {
        self.scripts.source(&mut self.bridge, id)
    }

    pub fn find_scripts(&mut self, query: ScriptQuery) -> Result<Vec<Rc<ScriptMirror>>> {
        self.scripts.find_scripts(&mut self.bridge, query)
    }

    pub fn find_sources(&mut self) -> Result<Vec<Rc<SourceMirror>>> {
        self.scripts.find_sources(&mut self.bridge)
    }

    pub fn script_source(&mut self, script: &ScriptMirror) -> Result<Option<Rc<SourceMirror>>> {
        match script.source_id() {
            Some(id) => self.source(id),
            None => Ok(None),
        }
    }

    pub fn source_introduction_script(
        &mut self,
        source: &SourceMirror,
    ) -> Result<Option<Rc<ScriptMirror>>> {
        match source.introduction_script_id() {
            Some(id) => self.script(id),
            None => Ok(None),
        }
    }

    pub fn line_offsets(&mut self, script: &ScriptMirror, line: u32) -> Result<Vec<u32>> {
        self.bridge.send(Request::GetLineOffsets {
            script: script.id(),
            line,
        })
    }

    pub fn offset_location(&mut self, script: &ScriptMirror, offset: u32) -> Result<Json> {
        self.bridge.send(Request::GetOffsetLocation {
            script: script.id(),
            offset,
        })
    }

    pub fn possible_breakpoints(&mut self, script: &ScriptMirror) -> Result<Vec<Json>> {
        self.bridge.send(Request::GetPossibleBreakpoints {
            script: script.id(),
        })
    }

    pub fn offset_metadata(&mut self, script: &ScriptMirror, offset: u32) -> Result<Json> {
        self.scripts.offset_metadata(&mut self.bridge, script, offset)
    }

    // ---------------------------------------------------------------------
    // Breakpoints and hooks

    pub fn breakpoints(&self) -> impl Iterator<Item = &BreakpointPosition> {
        self.breakpoints.iter().map(|entry| &entry.position)
    }

    fn frame_handler(handler: FrameHandler<C>) -> Handler<C> {
        Rc::new(move |dbg: &mut ReplayDebugger<C>| {
            let frame = dbg.get_newest_frame()?;
            handler(dbg, frame)
        })
    }

    fn kind_data(&self, kind: PositionKind) -> Option<HookId> {
        self.breakpoints
            .find_first(|entry| entry.position.kind() == kind)
            .map(|entry| entry.data)
    }

    fn set_kind_handler(
        &mut self,
        position: BreakpointPosition,
        hook: Option<(HookId, FrameHandler<C>)>,
    ) -> Result<()> {
        let kind = position.kind();
        self.breakpoints
            .remove_where(&mut self.bridge, |entry| entry.position.kind() == kind)?;
        if let Some((data, handler)) = hook {
            self.breakpoints.add(
                &mut self.bridge,
                position,
                Self::frame_handler(handler),
                data,
            )?;
        }
        Ok(())
    }

    pub fn on_enter_frame(&self) -> Option<HookId> {
        self.kind_data(PositionKind::EnterFrame)
    }

    pub fn set_on_enter_frame(&mut self, hook: Option<(HookId, FrameHandler<C>)>) -> Result<()> {
        self.set_kind_handler(BreakpointPosition::EnterFrame, hook)
    }

    pub fn on_debugger_statement(&self) -> Option<HookId> {
        self.kind_data(PositionKind::DebuggerStatement)
    }

    pub fn set_on_debugger_statement(
        &mut self,
        hook: Option<(HookId, FrameHandler<C>)>,
    ) -> Result<()> {
        self.set_kind_handler(BreakpointPosition::DebuggerStatement, hook)
    }

    pub fn set_script_breakpoint(
        &mut self,
        script: ScriptId,
        offset: u32,
        data: HookId,
        handler: FrameHandler<C>,
    ) -> Result<()> {
        self.breakpoints.add(
            &mut self.bridge,
            BreakpointPosition::Break { script, offset },
            Self::frame_handler(handler),
            data,
        )
    }

    /// Remove the `Break` entries on `script` installed with `data`.
    pub fn clear_script_breakpoint(&mut self, script: ScriptId, data: HookId) -> Result<usize> {
        self.breakpoints.remove_where(&mut self.bridge, |entry| {
            is_script_break(entry, script) && entry.data == data
        })
    }

    pub fn script_breakpoints(&self, script: ScriptId) -> Vec<(u32, HookId)> {
        self.breakpoints
            .iter()
            .filter(|entry| is_script_break(entry, script))
            .filter_map(|entry| Some((entry.position.offset()?, entry.data)))
            .collect()
    }

    fn frame_scoped_data(&self, kind: PositionKind, frame: &FrameMirror) -> Option<HookId> {
        self.breakpoints
            .find_first(|entry| {
                entry.position.kind() == kind && entry.position.frame_index() == Some(frame.index())
            })
            .map(|entry| entry.data)
    }

    fn clear_frame_hooks(&mut self, kind: PositionKind, frame_index: u32) -> Result<usize> {
        self.breakpoints.remove_where(&mut self.bridge, |entry| {
            entry.position.kind() == kind && entry.position.frame_index() == Some(frame_index)
        })
    }

    pub fn frame_on_step(&self, frame: &FrameMirror) -> Option<HookId> {
        self.frame_scoped_data(PositionKind::OnStep, frame)
    }

    /// Only clearing is supported here; install step hooks with
    /// [`Self::set_replaying_on_step`].
    pub fn set_frame_on_step(
        &mut self,
        frame: &FrameMirror,
        hook: Option<(HookId, FrameHandler<C>)>,
    ) -> Result<()> {
        if hook.is_some() {
            return Err(ReplayError::NotAllowed(
                "onStep must be installed through setReplayingOnStep",
            ));
        }
        self.clear_frame_hooks(PositionKind::OnStep, frame.index())?;
        Ok(())
    }

    /// Replace the frame's step hooks with one per offset.
    pub fn set_replaying_on_step(
        &mut self,
        frame: &FrameMirror,
        offsets: &[u32],
        data: HookId,
        handler: FrameHandler<C>,
    ) -> Result<()> {
        self.clear_frame_hooks(PositionKind::OnStep, frame.index())?;
        let handler = Self::frame_handler(handler);
        for &offset in offsets {
            self.breakpoints.add(
                &mut self.bridge,
                BreakpointPosition::OnStep {
                    script: frame.script(),
                    offset,
                    frame_index: frame.index(),
                },
                handler.clone(),
                data,
            )?;
        }
        Ok(())
    }

    pub fn frame_on_pop(&self, frame: &FrameMirror) -> Option<HookId> {
        self.frame_scoped_data(PositionKind::OnPop, frame)
    }

    pub fn set_frame_on_pop(
        &mut self,
        frame: &FrameMirror,
        hook: Option<(HookId, PopHandler<C>)>,
    ) -> Result<()> {
        self.clear_frame_hooks(PositionKind::OnPop, frame.index())?;
        let Some((data, handler)) = hook else {
            return Ok(());
        };
        let wrapped: Handler<C> = Rc::new(move |dbg: &mut ReplayDebugger<C>| {
            let raw: Json = dbg.bridge.send(Request::PopFrameResult)?;
            let completion = dbg.pool.convert_completion(&mut dbg.bridge, &raw)?;
            let frame = dbg.get_newest_frame()?;
            handler(dbg, frame, completion)
        });
        self.breakpoints.add(
            &mut self.bridge,
            BreakpointPosition::OnPop {
                script: frame.script(),
                frame_index: frame.index(),
            },
            wrapped,
            data,
        )
    }

    /// Drop every step and pop hook on every frame.
    pub fn clear_stepping_hooks(&mut self) -> Result<()> {
        self.breakpoints
            .clear_frame_scoped(&mut self.bridge, PositionKind::OnStep)?;
        self.breakpoints
            .clear_frame_scoped(&mut self.bridge, PositionKind::OnPop)?;
        Ok(())
    }

    /// Observe pauses the subject stays at.
    ///
    /// Fires on the turn after the subject stops, once breakpoint handlers
    /// have run. Pauses that end in a resume (requested by a handler or in
    /// the preferred direction) are not reported. Neither are pauses whose
    /// dispatch was cancelled by a thread-wide pause.
    pub fn set_on_pause(&mut self, hook: Option<PauseHook<C>>) {
        self.hooks.pause = hook;
    }

    pub fn set_on_new_script(&mut self, hook: Option<NewScriptHook<C>>) {
        self.hooks.new_script = hook;
    }

    pub fn set_on_console_message(&mut self, hook: Option<ConsoleMessageHook<C>>) {
        self.hooks.console_message = hook;
    }

    /// Ask the subject to stop on the named DOM/runtime events.
    pub fn set_active_event_breakpoints(
        &mut self,
        events: Vec<String>,
        hook: Option<EventBreakpointHook<C>>,
    ) -> Result<()> {
        self.bridge
            .send_command(Request::SetActiveEventBreakpoints { events })?;
        self.hooks.event_breakpoint = hook;
        Ok(())
    }

    pub fn find_all_console_messages(&mut self) -> Result<Vec<ConsoleMessage>> {
        let found: Vec<ConsoleMessageData> = self.bridge.send(Request::FindConsoleMessages)?;
        found
            .into_iter()
            .map(|data| ConsoleMessage::new(self.allocate_epoch(), data))
            .collect()
    }
}

fn is_script_break<H>(entry: &BreakpointEntry<H>, script: ScriptId) -> bool {
    matches!(entry.position, BreakpointPosition::Break { script: s, .. } if s == script)
}
