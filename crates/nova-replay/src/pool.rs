//! Per-pause cache of frame, object and environment mirrors.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde_json::{json, Value as Json};

use crate::mirror::{
    EnvironmentMirror, FrameMirror, Mirror, ObjectMirror, ObjectPreview, PropertyDescriptor,
};
use crate::value::{self, Decoded, RawCompletion};
use crate::wire::{FrameData, MirrorData, PauseData, WireDescriptor};
use crate::{
    Completion, ControlChannel, Epoch, FrameIndex, ObjectId, ObjectRef, ReplayError, Request,
    RequestBridge, Result, Value,
};

/// Source of data for mirrors missing from a [`Pool`].
pub(crate) trait ObjectFetcher {
    /// `None` when the subject knows no object with this id.
    fn fetch_mirror(&mut self, id: ObjectId) -> Result<Option<MirrorData>>;

    /// `None` when there is no such frame.
    fn fetch_frame(&mut self, index: FrameIndex) -> Result<Option<FrameData>>;
}

impl<C: ControlChannel> ObjectFetcher for RequestBridge<C> {
    fn fetch_mirror(&mut self, id: ObjectId) -> Result<Option<MirrorData>> {
        let raw: Json = self.send(Request::GetObject { id })?;
        if raw.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(raw).map_err(|err| {
            ReplayError::protocol(format!("malformed descriptor for object {id}: {err}"))
        })?))
    }

    fn fetch_frame(&mut self, index: FrameIndex) -> Result<Option<FrameData>> {
        let raw: Json = self.send(Request::GetFrame { index })?;
        Ok(FrameData::from_response(raw)?)
    }
}

/// Fetcher for pools that can never reach the subject.
pub(crate) struct Offline;

impl ObjectFetcher for Offline {
    fn fetch_mirror(&mut self, id: ObjectId) -> Result<Option<MirrorData>> {
        Err(ReplayError::invariant(format!(
            "offline pool asked to fetch object {id}"
        )))
    }

    fn fetch_frame(&mut self, index: FrameIndex) -> Result<Option<FrameData>> {
        Err(ReplayError::invariant(format!(
            "offline pool asked to fetch frame {index:?}"
        )))
    }
}

/// Mirrors valid for a single pause.
///
/// Only the debugger's current pool is live. Snapshot pools (console message
/// data) and superseded epochs answer from their cache and never fetch.
#[derive(Debug)]
pub struct Pool {
    epoch: Epoch,
    live: bool,
    /// Keyed by depth. The wire decides the indices, so this stays sparse.
    frames: BTreeMap<u32, Rc<FrameMirror>>,
    newest: Option<u32>,
    objects: HashMap<ObjectId, Mirror>,
}

impl Pool {
    pub(crate) fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            live: true,
            frames: BTreeMap::new(),
            newest: None,
            objects: HashMap::new(),
        }
    }

    pub(crate) fn snapshot(epoch: Epoch) -> Self {
        Self {
            live: false,
            ..Self::new(epoch)
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn cached_frames(&self) -> impl Iterator<Item = &Rc<FrameMirror>> {
        self.frames.values()
    }

    /// Cached lookup only.
    pub fn cached(&self, id: ObjectId) -> Option<&Mirror> {
        self.objects.get(&id)
    }

    pub(crate) fn get_object(
        &mut self,
        fetcher: &mut impl ObjectFetcher,
        id: ObjectId,
    ) -> Result<Option<Mirror>> {
        if let Some(mirror) = self.objects.get(&id) {
            return Ok(Some(mirror.clone()));
        }
        if !self.live {
            return Ok(None);
        }
        let Some(data) = fetcher.fetch_mirror(id)? else {
            return Ok(None);
        };
        if data.id() != id {
            return Err(ReplayError::protocol(format!(
                "asked for object {id} but the channel described object {}",
                data.id()
            )));
        }
        Ok(Some(self.insert_mirror(data)))
    }

    pub(crate) fn get_frame(
        &mut self,
        fetcher: &mut impl ObjectFetcher,
        index: FrameIndex,
    ) -> Result<Option<Rc<FrameMirror>>> {
        match index {
            FrameIndex::Depth(depth) => {
                if let Some(frame) = self.frame_at(depth) {
                    return Ok(Some(frame));
                }
            }
            FrameIndex::Newest => {
                if let Some(frame) = self.newest.and_then(|depth| self.frame_at(depth)) {
                    return Ok(Some(frame));
                }
            }
        }
        if !self.live {
            return Ok(None);
        }

        let Some(data) = fetcher.fetch_frame(index)? else {
            return match index {
                // The subject is stopped outside interpreted code.
                FrameIndex::Newest => Ok(None),
                FrameIndex::Depth(depth) => Err(ReplayError::InvalidFrameIndex(depth)),
            };
        };
        if let FrameIndex::Depth(depth) = index {
            if data.index != depth {
                return Err(ReplayError::protocol(format!(
                    "asked for frame {depth} but the channel described frame {}",
                    data.index
                )));
            }
        }
        let depth = data.index;
        if index == FrameIndex::Newest {
            self.newest = Some(depth);
        }
        match self.frame_at(depth) {
            Some(frame) => Ok(Some(frame)),
            None => self.insert_frame(fetcher, data).map(Some),
        }
    }

    /// Bulk-populate from one pause-data payload.
    ///
    /// Returns `false` without touching anything if frames are already cached.
    pub(crate) fn hydrate(
        &mut self,
        fetcher: &mut impl ObjectFetcher,
        data: PauseData,
    ) -> Result<bool> {
        if self.has_frames() {
            return Ok(false);
        }

        for object in data.objects {
            let mirror = match self.objects.get(&object.data.id) {
                Some(mirror) => mirror.clone(),
                None => self.insert_mirror(MirrorData::Object(object.data)),
            };
            if let (Some(preview), Mirror::Object(mirror)) = (object.preview, &mirror) {
                mirror.attach_preview(ObjectPreview::from(preview));
            }
        }
        for env in data.environments {
            let mirror = match self.objects.get(&env.data.id) {
                Some(mirror) => mirror.clone(),
                None => self.insert_mirror(MirrorData::Environment(env.data)),
            };
            if let Mirror::Environment(mirror) = &mirror {
                mirror.cache_names(env.names);
            }
        }

        let newest = data.frames.iter().map(|frame| frame.index).max();
        for frame in data.frames {
            if self.frame_at(frame.index).is_none() {
                self.insert_frame(fetcher, frame)?;
            }
        }
        if self.newest.is_none() {
            self.newest = newest;
        }

        tracing::debug!(
            target: "nova.replay.pool",
            epoch = %self.epoch,
            frames = self.frames.len(),
            objects = self.objects.len(),
            "pool hydrated"
        );
        Ok(true)
    }

    /// Convert a wire value, materializing referenced objects.
    ///
    /// A reference this pool cannot resolve (stale or unknown) becomes `Null`.
    pub(crate) fn convert_value(
        &mut self,
        fetcher: &mut impl ObjectFetcher,
        raw: &Json,
    ) -> Result<Value> {
        match value::decode(raw)? {
            Decoded::Value(value) => Ok(value),
            Decoded::Object(id) => match self.get_object(fetcher, id)? {
                Some(Mirror::Object(object)) => Ok(Value::Object(object.object_ref())),
                Some(Mirror::Environment(_)) => Err(ReplayError::protocol(format!(
                    "value refers to environment {id}"
                ))),
                None => Ok(Value::Null),
            },
        }
    }

    pub(crate) fn convert_values(
        &mut self,
        fetcher: &mut impl ObjectFetcher,
        raw: &[Json],
    ) -> Result<Vec<Value>> {
        raw.iter()
            .map(|value| self.convert_value(fetcher, value))
            .collect()
    }

    pub(crate) fn convert_completion(
        &mut self,
        fetcher: &mut impl ObjectFetcher,
        raw: &Json,
    ) -> Result<Completion> {
        match value::split_completion(raw)? {
            RawCompletion::Return(value) => Ok(Completion::Return(
                self.convert_value(fetcher, value)?,
            )),
            RawCompletion::Throw { value, stack } => Ok(Completion::Throw {
                value: self.convert_value(fetcher, value)?,
                stack: stack.cloned(),
            }),
        }
    }

    pub(crate) fn convert_descriptor(
        &mut self,
        fetcher: &mut impl ObjectFetcher,
        desc: &WireDescriptor,
    ) -> Result<PropertyDescriptor> {
        let mut accessor = |id: Option<ObjectId>| -> Result<Option<Value>> {
            id.map(|id| self.convert_value(fetcher, &json!({ "object": id })))
                .transpose()
        };
        let get = accessor(desc.get)?;
        let set = accessor(desc.set)?;
        let value = desc
            .value
            .as_ref()
            .map(|raw| self.convert_value(fetcher, raw))
            .transpose()?;
        Ok(PropertyDescriptor {
            configurable: desc.configurable,
            enumerable: desc.enumerable,
            writable: desc.writable,
            value,
            get,
            set,
        })
    }

    pub(crate) fn owns(&self, obj: ObjectRef) -> bool {
        obj.epoch == self.epoch
    }

    fn frame_at(&self, depth: u32) -> Option<Rc<FrameMirror>> {
        self.frames.get(&depth).cloned()
    }

    fn insert_mirror(&mut self, data: MirrorData) -> Mirror {
        let mirror = match data {
            MirrorData::Object(data) => Mirror::Object(Rc::new(ObjectMirror::new(self.epoch, data))),
            MirrorData::Environment(data) => {
                Mirror::Environment(Rc::new(EnvironmentMirror::new(self.epoch, data)))
            }
        };
        self.objects.insert(mirror.id(), mirror.clone());
        mirror
    }

    fn insert_frame(
        &mut self,
        fetcher: &mut impl ObjectFetcher,
        data: FrameData,
    ) -> Result<Rc<FrameMirror>> {
        let this = self.convert_value(fetcher, &data.this)?;
        let arguments = self.convert_values(fetcher, &data.arguments)?;
        let depth = data.index;
        let frame = Rc::new(FrameMirror::new(self.epoch, data, this, arguments));
        self.frames.insert(depth, frame.clone());
        Ok(frame)
    }
}
