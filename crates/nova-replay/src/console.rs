use std::rc::Rc;

use crate::mirror::{ObjectMirror, PropertyDescriptor};
use crate::pool::Offline;
use crate::wire::ConsoleMessageData;
use crate::{Epoch, ExecutionPoint, ObjectRef, Pool, Result, Value};

/// A message logged by the subject.
///
/// Each message carries its own snapshot pool built from the object data
/// captured when it was logged. That pool is never the debugger's active one,
/// so the message stays inspectable after any number of resumes but never
/// triggers a round trip.
#[derive(Debug)]
pub struct ConsoleMessage {
    data: ConsoleMessageData,
    pool: Pool,
    arguments: Vec<Value>,
}

impl ConsoleMessage {
    pub(crate) fn new(epoch: Epoch, mut data: ConsoleMessageData) -> Result<Self> {
        let mut pool = Pool::snapshot(epoch);
        if let Some(pause_data) = data.pause_data.take() {
            pool.hydrate(&mut Offline, pause_data)?;
        }
        let arguments = pool.convert_values(&mut Offline, &data.arguments)?;
        Ok(Self {
            data,
            pool,
            arguments,
        })
    }

    pub fn message_type(&self) -> &str {
        &self.data.message_type
    }

    pub fn level(&self) -> Option<&str> {
        self.data.level.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.data.text.as_deref()
    }

    pub fn filename(&self) -> Option<&str> {
        self.data.filename.as_deref()
    }

    pub fn line_number(&self) -> Option<u32> {
        self.data.line_number
    }

    pub fn column_number(&self) -> Option<u32> {
        self.data.column_number
    }

    pub fn execution_point(&self) -> Option<&ExecutionPoint> {
        self.data.execution_point.as_ref()
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn epoch(&self) -> Epoch {
        self.pool.epoch()
    }

    /// Resolve an object captured with this message.
    pub fn object(&self, obj: ObjectRef) -> Option<Rc<ObjectMirror>> {
        if !self.pool.owns(obj) {
            return None;
        }
        self.pool.cached(obj.id)?.as_object().cloned()
    }

    /// Enumerable own properties recorded in the object's preview.
    pub fn preview_properties(
        &mut self,
        obj: ObjectRef,
    ) -> Result<Vec<(String, PropertyDescriptor)>> {
        let Some(preview) = self.object(obj).and_then(|object| object.preview()) else {
            return Ok(Vec::new());
        };
        preview
            .enumerable_own_properties
            .iter()
            .map(|prop| {
                let desc = self.pool.convert_descriptor(&mut Offline, &prop.desc)?;
                Ok((prop.name.clone(), desc))
            })
            .collect()
    }
}
