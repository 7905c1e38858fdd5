use std::cell::{OnceCell, RefCell};

use serde_json::Value as Json;

use super::tag;
use crate::wire::{NameValue, ObjectData, PreviewData, WirePreviewLevel, WireProperty};
use crate::{Epoch, ObjectId, ObjectRef, ScriptId, Value};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreviewLevel {
    #[default]
    None,
    Partial,
    /// The preview lists every own property; no round trip is needed.
    Full,
}

impl From<WirePreviewLevel> for PreviewLevel {
    fn from(level: WirePreviewLevel) -> Self {
        match level {
            WirePreviewLevel::None => PreviewLevel::None,
            WirePreviewLevel::Partial => PreviewLevel::Partial,
            WirePreviewLevel::Full => PreviewLevel::Full,
        }
    }
}

/// Snapshot of an object captured with the pause data.
///
/// Values are kept in wire form and converted on access.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectPreview {
    pub level: PreviewLevel,
    pub own_property_names_count: usize,
    pub enumerable_own_properties: Vec<WireProperty>,
    pub container_contents: Option<Vec<Json>>,
    pub container_contents_size: Option<usize>,
    pub getter_values: Vec<NameValue>,
}

impl ObjectPreview {
    pub fn is_full(&self) -> bool {
        self.level == PreviewLevel::Full
    }

    pub fn property(&self, name: &str) -> Option<&WireProperty> {
        self.enumerable_own_properties
            .iter()
            .find(|prop| prop.name == name)
    }

    pub fn getter_value(&self, name: &str) -> Option<&Json> {
        self.getter_values
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.value)
    }
}

impl From<PreviewData> for ObjectPreview {
    fn from(data: PreviewData) -> Self {
        Self {
            level: data.level.into(),
            own_property_names_count: data.own_property_names_count,
            enumerable_own_properties: data.enumerable_own_properties,
            container_contents: data.container_contents,
            container_contents_size: data.container_contents_size,
            getter_values: data.getter_values,
        }
    }
}

/// A property descriptor with its values converted.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDescriptor {
    pub configurable: bool,
    pub enumerable: bool,
    pub writable: Option<bool>,
    pub value: Option<Value>,
    pub get: Option<Value>,
    pub set: Option<Value>,
}

#[derive(Debug)]
pub struct ObjectMirror {
    epoch: Epoch,
    data: ObjectData,
    preview: RefCell<Option<ObjectPreview>>,
    properties: OnceCell<Vec<WireProperty>>,
    container_contents: OnceCell<Vec<Json>>,
}

impl ObjectMirror {
    pub(crate) fn new(epoch: Epoch, data: ObjectData) -> Self {
        Self {
            epoch,
            data,
            preview: RefCell::new(None),
            properties: OnceCell::new(),
            container_contents: OnceCell::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.data.id
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            epoch: self.epoch,
            id: self.data.id,
        }
    }

    /// Raw descriptor as received from the channel.
    pub fn data(&self) -> &ObjectData {
        &self.data
    }

    pub fn class(&self) -> &str {
        &self.data.class
    }

    pub fn name(&self) -> Option<&str> {
        self.data.name.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.data.display_name.as_deref()
    }

    pub fn callable(&self) -> bool {
        self.data.callable
    }

    pub fn is_bound_function(&self) -> bool {
        self.data.is_bound_function
    }

    pub fn is_arrow_function(&self) -> bool {
        self.data.is_arrow_function
    }

    pub fn is_generator_function(&self) -> bool {
        self.data.is_generator_function
    }

    pub fn is_async_function(&self) -> bool {
        self.data.is_async_function
    }

    pub fn is_proxy(&self) -> bool {
        self.data.is_proxy
    }

    pub fn is_extensible(&self) -> bool {
        self.data.is_extensible
    }

    pub fn is_sealed(&self) -> bool {
        self.data.is_sealed
    }

    pub fn is_frozen(&self) -> bool {
        self.data.is_frozen
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.data.parameter_names
    }

    pub fn script(&self) -> Option<ScriptId> {
        self.data.script
    }

    pub fn proto(&self) -> Option<ObjectRef> {
        tag(self.epoch, self.data.proto)
    }

    pub fn environment(&self) -> Option<ObjectRef> {
        tag(self.epoch, self.data.environment)
    }

    pub fn bound_target_function(&self) -> Option<ObjectRef> {
        tag(self.epoch, self.data.bound_target_function)
    }

    pub fn proxy_target(&self) -> Option<ObjectRef> {
        tag(self.epoch, self.data.proxy_target)
    }

    pub fn proxy_handler(&self) -> Option<ObjectRef> {
        tag(self.epoch, self.data.proxy_handler)
    }

    pub fn error_message_name(&self) -> Option<&str> {
        self.data.error_message_name.as_deref()
    }

    pub fn error_line_number(&self) -> Option<u32> {
        self.data.error_line_number
    }

    pub fn error_column_number(&self) -> Option<u32> {
        self.data.error_column_number
    }

    pub fn error_notes(&self) -> &[Json] {
        &self.data.error_notes
    }

    pub fn preview(&self) -> Option<ObjectPreview> {
        self.preview.borrow().clone()
    }

    pub fn preview_level(&self) -> PreviewLevel {
        self.preview
            .borrow()
            .as_ref()
            .map_or(PreviewLevel::None, |preview| preview.level)
    }

    /// Attach `preview` unless one is already present.
    pub(crate) fn attach_preview(&self, preview: ObjectPreview) -> bool {
        let mut slot = self.preview.borrow_mut();
        if slot.is_some() {
            return false;
        }
        *slot = Some(preview);
        true
    }

    /// Own properties, if they are known without a round trip.
    pub(crate) fn known_properties(&self) -> Option<Vec<WireProperty>> {
        if let Some(props) = self.properties.get() {
            return Some(props.clone());
        }
        self.preview
            .borrow()
            .as_ref()
            .filter(|preview| preview.is_full())
            .map(|preview| preview.enumerable_own_properties.clone())
    }

    pub(crate) fn cache_properties(&self, props: Vec<WireProperty>) -> &[WireProperty] {
        self.properties.get_or_init(|| props)
    }

    /// Container contents, if they are known without a round trip.
    pub(crate) fn known_container_contents(&self) -> Option<Vec<Json>> {
        if let Some(contents) = self.container_contents.get() {
            return Some(contents.clone());
        }
        self.preview
            .borrow()
            .as_ref()
            .filter(|preview| preview.is_full())
            .and_then(|preview| preview.container_contents.clone())
    }

    pub(crate) fn cache_container_contents(&self, contents: Vec<Json>) -> &[Json] {
        self.container_contents.get_or_init(|| contents)
    }
}
