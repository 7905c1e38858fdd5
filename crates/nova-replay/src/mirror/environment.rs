use std::cell::OnceCell;

use serde_json::Value as Json;

use super::tag;
use crate::wire::{EnvironmentData, NameValue};
use crate::{Epoch, ObjectId, ObjectRef};

/// A lexical environment (scope) of the subject.
#[derive(Debug)]
pub struct EnvironmentMirror {
    epoch: Epoch,
    data: EnvironmentData,
    names: OnceCell<Vec<NameValue>>,
}

impl EnvironmentMirror {
    pub(crate) fn new(epoch: Epoch, data: EnvironmentData) -> Self {
        Self {
            epoch,
            data,
            names: OnceCell::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.data.id
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn env_type(&self) -> &str {
        &self.data.env_type
    }

    pub fn optimized_out(&self) -> bool {
        self.data.optimized_out
    }

    pub fn parent(&self) -> Option<ObjectRef> {
        tag(self.epoch, self.data.parent)
    }

    /// Binding object of an `object`/`with` environment.
    pub fn object(&self) -> Option<ObjectRef> {
        tag(self.epoch, self.data.object)
    }

    pub fn callee(&self) -> Option<ObjectRef> {
        tag(self.epoch, self.data.callee)
    }

    pub(crate) fn known_names(&self) -> Option<&[NameValue]> {
        self.names.get().map(Vec::as_slice)
    }

    /// Store the bindings unless they were already known. Returns the cached
    /// bindings either way.
    pub(crate) fn cache_names(&self, names: Vec<NameValue>) -> &[NameValue] {
        self.names.get_or_init(|| names)
    }

    pub(crate) fn known_variable(&self, name: &str) -> Option<&Json> {
        self.known_names()?
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.value)
    }
}
