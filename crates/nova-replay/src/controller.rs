//! Pause/resume bookkeeping.
//!
//! The controller never talks to the channel. It records what should happen
//! and tells the caller when a deferred step (handler dispatch, resume) is due;
//! [`crate::ReplayDebugger`] runs those steps on later run-loop turns.

use crate::{Direction, ExecutionPoint, ReplayError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResumeAction {
    Resume(Direction),
    TimeWarp(ExecutionPoint),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Running,
    Paused { thread_pauses: u32 },
}

#[derive(Debug, Default)]
pub struct PauseController {
    paused: bool,
    preferred: Option<Direction>,
    pending: Option<ResumeAction>,
    thread_pauses: u32,
    cancel_dispatch: bool,
    dispatch_armed: bool,
    last_point: Option<ExecutionPoint>,
}

impl PauseController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ControllerState {
        if self.paused {
            ControllerState::Paused {
                thread_pauses: self.thread_pauses,
            }
        } else {
            ControllerState::Running
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn preferred_direction(&self) -> Option<Direction> {
        self.preferred
    }

    pub fn set_preferred_direction(&mut self, direction: Option<Direction>) {
        self.preferred = direction;
    }

    pub fn thread_pauses(&self) -> u32 {
        self.thread_pauses
    }

    pub fn pending(&self) -> Option<&ResumeAction> {
        self.pending.as_ref()
    }

    /// Record that the subject stopped at `point`.
    ///
    /// Returns whether a handler dispatch should be posted. A repeated
    /// notification for the pause already being handled posts nothing.
    pub fn on_subject_paused(&mut self, point: Option<ExecutionPoint>) -> bool {
        if self.paused && self.last_point == point {
            return false;
        }
        self.paused = true;
        self.cancel_dispatch = false;
        self.last_point = point;
        self.dispatch_armed = true;
        true
    }

    /// Consume a posted dispatch. Returns whether handlers should run.
    pub fn take_dispatch(&mut self) -> bool {
        if !std::mem::take(&mut self.dispatch_armed) {
            return false;
        }
        let cancelled = std::mem::take(&mut self.cancel_dispatch);
        self.paused && !cancelled && self.pending.is_none()
    }

    /// Set the pending resume action, replacing any earlier one.
    ///
    /// Returns whether a resume should be posted now (no thread-wide pause is
    /// holding the subject).
    pub fn request(&mut self, action: ResumeAction) -> Result<bool> {
        if !self.paused {
            return Err(ReplayError::invariant(format!(
                "resume requested while running: {action:?}"
            )));
        }
        if let Some(previous) = self.pending.replace(action) {
            tracing::debug!(target: "nova.replay", ?previous, "pending resume replaced");
        }
        Ok(self.thread_pauses == 0)
    }

    /// Take the pending action if it may run now, marking the subject running.
    pub fn take_resume(&mut self) -> Result<Option<ResumeAction>> {
        if self.pending.is_none() || self.thread_pauses > 0 {
            return Ok(None);
        }
        if !self.paused {
            return Err(ReplayError::invariant(
                "resume pending while the subject is running",
            ));
        }
        self.paused = false;
        self.dispatch_armed = false;
        self.last_point = None;
        Ok(self.pending.take())
    }

    /// Undo [`Self::take_resume`] after the channel failed to move the subject.
    ///
    /// The subject is still stopped at `point`. No dispatch is armed, since
    /// handlers already ran for this pause.
    pub fn resume_failed(&mut self, point: Option<ExecutionPoint>) {
        self.paused = true;
        self.preferred = None;
        self.last_point = point;
    }

    pub fn push_thread_pause(&mut self) -> Result<()> {
        if !self.paused {
            return Err(ReplayError::invariant(
                "thread-wide pause requested while running",
            ));
        }
        self.thread_pauses += 1;
        if self.thread_pauses == 1 {
            self.preferred = None;
            self.cancel_dispatch = true;
        }
        Ok(())
    }

    /// Returns whether a resume should be posted.
    pub fn pop_thread_pause(&mut self) -> Result<bool> {
        if self.thread_pauses == 0 {
            return Err(ReplayError::invariant(
                "thread-wide pause popped without a matching push",
            ));
        }
        self.thread_pauses -= 1;
        Ok(self.thread_pauses == 0 && self.pending.is_some())
    }
}
