//! Scripts and sources are immutable, so their mirrors outlive every pause.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value as Json;

use crate::wire::{ScriptData, SourceData};
use crate::{ControlChannel, Request, RequestBridge, Result, ScriptId, ScriptQuery, SourceId};

#[derive(Debug)]
pub struct ScriptMirror {
    data: ScriptData,
    offset_metadata: RefCell<HashMap<u32, Json>>,
}

impl ScriptMirror {
    fn new(data: ScriptData) -> Self {
        Self {
            data,
            offset_metadata: RefCell::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> ScriptId {
        self.data.id
    }

    pub fn url(&self) -> Option<&str> {
        self.data.url.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.data.display_name.as_deref()
    }

    pub fn source_id(&self) -> Option<SourceId> {
        self.data.source_id
    }

    pub fn start_line(&self) -> u32 {
        self.data.start_line
    }

    pub fn line_count(&self) -> u32 {
        self.data.line_count
    }

    pub fn source_start(&self) -> u32 {
        self.data.source_start
    }

    pub fn source_length(&self) -> u32 {
        self.data.source_length
    }

    pub fn cached_offset_metadata(&self, offset: u32) -> Option<Json> {
        self.offset_metadata.borrow().get(&offset).cloned()
    }
}

#[derive(Debug)]
pub struct SourceMirror {
    data: SourceData,
}

impl SourceMirror {
    pub fn id(&self) -> SourceId {
        self.data.id
    }

    pub fn text(&self) -> Option<&str> {
        self.data.text.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.data.url.as_deref()
    }

    pub fn display_url(&self) -> Option<&str> {
        self.data.display_url.as_deref()
    }

    pub fn introduction_type(&self) -> Option<&str> {
        self.data.introduction_type.as_deref()
    }

    pub fn introduction_script_id(&self) -> Option<ScriptId> {
        self.data.introduction_script
    }

    pub fn source_map_url(&self) -> Option<&str> {
        self.data.source_map_url.as_deref()
    }
}

/// Lifetime-of-the-debugger cache keyed by the channel's stable ids.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: HashMap<ScriptId, Rc<ScriptMirror>>,
    sources: HashMap<SourceId, Rc<SourceMirror>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }

    pub fn cached_script(&self, id: ScriptId) -> Option<Rc<ScriptMirror>> {
        self.scripts.get(&id).cloned()
    }

    /// Register a script the channel announced. Known ids keep their mirror.
    pub fn insert_script(&mut self, data: ScriptData) -> Rc<ScriptMirror> {
        self.scripts
            .entry(data.id)
            .or_insert_with(|| Rc::new(ScriptMirror::new(data)))
            .clone()
    }

    fn insert_source(&mut self, data: SourceData) -> Rc<SourceMirror> {
        self.sources
            .entry(data.id)
            .or_insert_with(|| Rc::new(SourceMirror { data }))
            .clone()
    }

    pub fn script<C: ControlChannel>(
        &mut self,
        bridge: &mut RequestBridge<C>,
        id: ScriptId,
    ) -> Result<Option<Rc<ScriptMirror>>> {
        if let Some(script) = self.scripts.get(&id) {
            return Ok(Some(script.clone()));
        }
        let data: Option<ScriptData> = bridge.send(Request::GetScript { id })?;
        Ok(data.map(|data| self.insert_script(data)))
    }

    pub fn source<C: ControlChannel>(
        &mut self,
        bridge: &mut RequestBridge<C>,
        id: SourceId,
    ) -> Result<Option<Rc<SourceMirror>>> {
        if let Some(source) = self.sources.get(&id) {
            return Ok(Some(source.clone()));
        }
        let data: Option<SourceData> = bridge.send(Request::GetSource { id })?;
        Ok(data.map(|data| self.insert_source(data)))
    }

    pub fn find_scripts<C: ControlChannel>(
        &mut self,
        bridge: &mut RequestBridge<C>,
        query: ScriptQuery,
    ) -> Result<Vec<Rc<ScriptMirror>>> {
        let found: Vec<ScriptData> = bridge.send(Request::FindScripts { query })?;
        Ok(found
            .into_iter()
            .map(|data| self.insert_script(data))
            .collect())
    }

    pub fn find_sources<C: ControlChannel>(
        &mut self,
        bridge: &mut RequestBridge<C>,
    ) -> Result<Vec<Rc<SourceMirror>>> {
        let found: Vec<SourceData> = bridge.send(Request::FindSources)?;
        Ok(found
            .into_iter()
            .map(|data| self.insert_source(data))
            .collect())
    }

    /// Per-offset metadata, fetched at most once per script and offset.
    pub fn offset_metadata<C: ControlChannel>(
        &mut self,
        bridge: &mut RequestBridge<C>,
        script: &ScriptMirror,
        offset: u32,
    ) -> Result<Json> {
        if let Some(cached) = script.cached_offset_metadata(offset) {
            return Ok(cached);
        }
        let metadata: Json = bridge.send(Request::GetOffsetMetadata {
            script: script.id(),
            offset,
        })?;
        script
            .offset_metadata
            .borrow_mut()
            .insert(offset, metadata.clone());
        Ok(metadata)
    }
}
