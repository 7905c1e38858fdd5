//! Ordered registry of position-triggered hooks.

use serde::{Deserialize, Serialize};

use crate::{ControlChannel, ExecutionPosition, ReplayError, Request, RequestBridge, Result, ScriptId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionKind {
    EnterFrame,
    DebuggerStatement,
    Break,
    OnStep,
    OnPop,
}

impl PositionKind {
    /// Kinds whose entries only make sense for one particular frame.
    pub fn is_frame_scoped(self) -> bool {
        matches!(self, PositionKind::OnStep | PositionKind::OnPop)
    }
}

/// Where a hook applies. Fields a variant does not carry match anything.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind")]
pub enum BreakpointPosition {
    EnterFrame,
    DebuggerStatement,
    Break {
        script: ScriptId,
        offset: u32,
    },
    OnStep {
        script: ScriptId,
        offset: u32,
        #[serde(rename = "frameIndex")]
        frame_index: u32,
    },
    OnPop {
        script: ScriptId,
        #[serde(rename = "frameIndex")]
        frame_index: u32,
    },
}

impl BreakpointPosition {
    pub fn kind(&self) -> PositionKind {
        match self {
            BreakpointPosition::EnterFrame => PositionKind::EnterFrame,
            BreakpointPosition::DebuggerStatement => PositionKind::DebuggerStatement,
            BreakpointPosition::Break { .. } => PositionKind::Break,
            BreakpointPosition::OnStep { .. } => PositionKind::OnStep,
            BreakpointPosition::OnPop { .. } => PositionKind::OnPop,
        }
    }

    pub fn script(&self) -> Option<ScriptId> {
        match self {
            BreakpointPosition::Break { script, .. }
            | BreakpointPosition::OnStep { script, .. }
            | BreakpointPosition::OnPop { script, .. } => Some(*script),
            BreakpointPosition::EnterFrame | BreakpointPosition::DebuggerStatement => None,
        }
    }

    pub fn offset(&self) -> Option<u32> {
        match self {
            BreakpointPosition::Break { offset, .. } | BreakpointPosition::OnStep { offset, .. } => {
                Some(*offset)
            }
            _ => None,
        }
    }

    pub fn frame_index(&self) -> Option<u32> {
        match self {
            BreakpointPosition::OnStep { frame_index, .. }
            | BreakpointPosition::OnPop { frame_index, .. } => Some(*frame_index),
            _ => None,
        }
    }

    /// Whether this stored position covers the concrete `point`.
    ///
    /// Kinds must agree, and every discriminant this position carries must
    /// equal the point's.
    pub fn subsumes(&self, point: &ExecutionPosition) -> bool {
        fn agrees<T: PartialEq>(stored: Option<T>, actual: Option<T>) -> bool {
            stored.map_or(true, |stored| actual == Some(stored))
        }

        self.kind() == point.kind
            && agrees(self.script(), point.script)
            && agrees(self.offset(), point.offset)
            && agrees(self.frame_index(), point.frame_index)
    }
}

/// Caller-supplied token identifying a hook, so it can be found and removed
/// by whoever installed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(pub u64);

#[derive(Clone)]
pub struct BreakpointEntry<H> {
    pub position: BreakpointPosition,
    pub handler: H,
    pub data: HookId,
}

impl<H> std::fmt::Debug for BreakpointEntry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakpointEntry")
            .field("position", &self.position)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// Installed hooks in registration order.
///
/// The channel is kept in sync: every entry here has been announced with
/// `addBreakpoint`. Removal clears the channel's set and replays the survivors
/// without yielding in between.
pub struct BreakpointRegistry<H> {
    entries: Vec<BreakpointEntry<H>>,
}

impl<H> Default for BreakpointRegistry<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H: Clone> BreakpointRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BreakpointEntry<H>> {
        self.entries.iter()
    }

    pub fn add<C: ControlChannel>(
        &mut self,
        bridge: &mut RequestBridge<C>,
        position: BreakpointPosition,
        handler: H,
        data: HookId,
    ) -> Result<()> {
        bridge.send_command(Request::AddBreakpoint {
            position: position.clone(),
        })?;
        tracing::debug!(
            target: "nova.replay.breakpoints",
            ?position,
            data = data.0,
            "breakpoint added"
        );
        self.entries.push(BreakpointEntry {
            position,
            handler,
            data,
        });
        Ok(())
    }

    /// Remove every entry matching `pred`, returning how many were removed.
    pub fn remove_where<C: ControlChannel>(
        &mut self,
        bridge: &mut RequestBridge<C>,
        mut pred: impl FnMut(&BreakpointEntry<H>) -> bool,
    ) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|entry| !pred(entry));
        let removed = before - self.entries.len();
        if removed == 0 {
            return Ok(0);
        }

        bridge.send_command(Request::ClearBreakpoints)?;
        for entry in &self.entries {
            bridge.send_command(Request::AddBreakpoint {
                position: entry.position.clone(),
            })?;
        }
        tracing::debug!(
            target: "nova.replay.breakpoints",
            removed,
            remaining = self.entries.len(),
            "breakpoints removed"
        );
        Ok(removed)
    }

    pub fn find_first(
        &self,
        mut pred: impl FnMut(&BreakpointEntry<H>) -> bool,
    ) -> Option<&BreakpointEntry<H>> {
        self.entries.iter().find(|entry| pred(entry))
    }

    /// Data of the first entry that subsumes `point`.
    pub fn find_first_matching(&self, point: &ExecutionPosition) -> Option<HookId> {
        self.find_first(|entry| entry.position.subsumes(point))
            .map(|entry| entry.data)
    }

    pub fn for_each_matching(
        &self,
        point: &ExecutionPosition,
        mut f: impl FnMut(&BreakpointEntry<H>),
    ) {
        self.entries
            .iter()
            .filter(|entry| entry.position.subsumes(point))
            .for_each(|entry| f(entry));
    }

    /// Snapshot of the handlers matching `point`, in registration order.
    ///
    /// Handlers may add or remove entries while they run, so dispatch works
    /// from a copy rather than iterating the registry.
    pub fn matching_handlers(&self, point: &ExecutionPosition) -> Vec<H> {
        let mut out = Vec::new();
        self.for_each_matching(point, |entry| out.push(entry.handler.clone()));
        out
    }

    /// Drop every `OnStep` or `OnPop` entry regardless of frame.
    pub fn clear_frame_scoped<C: ControlChannel>(
        &mut self,
        bridge: &mut RequestBridge<C>,
        kind: PositionKind,
    ) -> Result<usize> {
        if !kind.is_frame_scoped() {
            return Err(ReplayError::invariant(format!(
                "{kind:?} breakpoints are not frame scoped"
            )));
        }
        self.remove_where(bridge, |entry| entry.position.kind() == kind)
    }
}
