use std::collections::VecDeque;

use crate::wire::ConsoleMessageData;
use crate::ScriptId;

/// Work deferred to a later turn of the debugger's run loop.
#[derive(Debug, PartialEq)]
pub(crate) enum Task {
    DispatchPauseHandlers,
    PerformResume,
    NewScript(ScriptId),
    ConsoleMessage(Box<ConsoleMessageData>),
    EventBreakpoint(String),
}

/// Single-consumer FIFO of deferred tasks.
#[derive(Debug, Default)]
pub(crate) struct RunLoop {
    queue: VecDeque<Task>,
}

impl RunLoop {
    pub(crate) fn post(&mut self, task: Task) {
        tracing::trace!(target: "nova.replay", ?task, "task posted");
        self.queue.push_back(task);
    }

    pub(crate) fn next(&mut self) -> Option<Task> {
        self.queue.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}
