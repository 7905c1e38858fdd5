use super::tag;
use crate::wire::FrameData;
use crate::{Epoch, ObjectRef, ScriptId, Value};

/// One stack frame at a pause. Immutable once built.
///
/// Step and pop hooks are not stored here; they live in the breakpoint
/// registry keyed by this frame's index.
#[derive(Debug)]
pub struct FrameMirror {
    epoch: Epoch,
    index: u32,
    kind: String,
    callee: Option<ObjectRef>,
    environment: Option<ObjectRef>,
    this: Value,
    script: ScriptId,
    offset: u32,
    constructing: bool,
    generator: bool,
    arguments: Vec<Value>,
}

impl FrameMirror {
    pub(crate) fn new(epoch: Epoch, data: FrameData, this: Value, arguments: Vec<Value>) -> Self {
        Self {
            epoch,
            index: data.index,
            kind: data.kind,
            callee: tag(epoch, data.callee),
            environment: tag(epoch, data.environment),
            this,
            script: data.script,
            offset: data.offset,
            constructing: data.constructing,
            generator: data.generator,
            arguments,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Depth from the oldest frame.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// `call`, `eval`, `global`, `module`, ...
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn callee(&self) -> Option<ObjectRef> {
        self.callee
    }

    pub fn environment(&self) -> Option<ObjectRef> {
        self.environment
    }

    pub fn this(&self) -> &Value {
        &self.this
    }

    pub fn script(&self) -> ScriptId {
        self.script
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn constructing(&self) -> bool {
        self.constructing
    }

    pub fn generator(&self) -> bool {
        self.generator
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// The next frame toward the bottom of the stack.
    pub fn older_index(&self) -> Option<u32> {
        self.index.checked_sub(1)
    }
}
