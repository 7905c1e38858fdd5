//! Payloads exchanged with the control channel.
//!
//! Values travel as raw JSON (`serde_json::Value`): objects are encoded as
//! `{"object": id}`, and numbers JSON cannot represent as
//! `{"special": "undefined" | "NaN" | "Infinity" | "-Infinity" | "-0"}`.
//! Everything else passes through unchanged. The structures below describe the
//! records that carry those values.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

use crate::{ExecutionPoint, ObjectId, ScriptId, SourceId};

/// Deserialize a field that may legitimately hold JSON `null`.
///
/// A plain `Option<Json>` would fold a present `null` into `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Json>, D::Error>
where
    D: Deserializer<'de>,
{
    Json::deserialize(deserializer).map(Some)
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameData {
    pub index: u32,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub callee: Option<ObjectId>,
    #[serde(default)]
    pub environment: Option<ObjectId>,
    #[serde(default)]
    pub this: Json,
    pub script: ScriptId,
    pub offset: u32,
    #[serde(default)]
    pub constructing: bool,
    #[serde(default)]
    pub generator: bool,
    #[serde(default)]
    pub arguments: Vec<Json>,
}

impl FrameData {
    /// Decode a `getFrame` response. An empty record (no `index`) means the
    /// subject has no frames on the stack.
    pub(crate) fn from_response(raw: Json) -> serde_json::Result<Option<Self>> {
        if raw.get("index").is_none() {
            return Ok(None);
        }
        serde_json::from_value(raw).map(Some)
    }
}

/// Raw descriptor for anything addressed by an object id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MirrorData {
    Object(ObjectData),
    Environment(EnvironmentData),
}

impl MirrorData {
    pub fn id(&self) -> ObjectId {
        match self {
            MirrorData::Object(data) => data.id,
            MirrorData::Environment(data) => data.id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectData {
    pub id: ObjectId,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub callable: bool,
    #[serde(default)]
    pub is_bound_function: bool,
    #[serde(default)]
    pub is_arrow_function: bool,
    #[serde(default)]
    pub is_generator_function: bool,
    #[serde(default)]
    pub is_async_function: bool,
    #[serde(default)]
    pub proto: Option<ObjectId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub parameter_names: Vec<String>,
    #[serde(default)]
    pub script: Option<ScriptId>,
    #[serde(default)]
    pub environment: Option<ObjectId>,
    #[serde(default)]
    pub is_proxy: bool,
    #[serde(default)]
    pub proxy_target: Option<ObjectId>,
    #[serde(default)]
    pub proxy_handler: Option<ObjectId>,
    #[serde(default)]
    pub bound_target_function: Option<ObjectId>,
    #[serde(default, deserialize_with = "present")]
    pub bound_this: Option<Json>,
    #[serde(default)]
    pub bound_arguments: Vec<Json>,
    #[serde(default = "default_true")]
    pub is_extensible: bool,
    #[serde(default)]
    pub is_sealed: bool,
    #[serde(default)]
    pub is_frozen: bool,
    #[serde(default)]
    pub error_message_name: Option<String>,
    #[serde(default)]
    pub error_line_number: Option<u32>,
    #[serde(default)]
    pub error_column_number: Option<u32>,
    #[serde(default)]
    pub error_notes: Vec<Json>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentData {
    pub id: ObjectId,
    #[serde(rename = "type", default)]
    pub env_type: String,
    #[serde(default)]
    pub parent: Option<ObjectId>,
    #[serde(default)]
    pub object: Option<ObjectId>,
    #[serde(default)]
    pub callee: Option<ObjectId>,
    #[serde(default)]
    pub optimized_out: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WireDescriptor {
    #[serde(default)]
    pub configurable: bool,
    #[serde(default)]
    pub enumerable: bool,
    #[serde(default)]
    pub writable: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Json>,
    #[serde(default)]
    pub get: Option<ObjectId>,
    #[serde(default)]
    pub set: Option<ObjectId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireProperty {
    pub name: String,
    pub desc: WireDescriptor,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value: Json,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WirePreviewLevel {
    #[default]
    None,
    Partial,
    Full,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewData {
    #[serde(default)]
    pub level: WirePreviewLevel,
    #[serde(default)]
    pub own_property_names_count: usize,
    #[serde(default)]
    pub enumerable_own_properties: Vec<WireProperty>,
    #[serde(default)]
    pub container_contents: Option<Vec<Json>>,
    #[serde(default)]
    pub container_contents_size: Option<usize>,
    #[serde(default)]
    pub getter_values: Vec<NameValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PausedObject {
    pub data: ObjectData,
    #[serde(default)]
    pub preview: Option<PreviewData>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PausedEnvironment {
    pub data: EnvironmentData,
    #[serde(default)]
    pub names: Vec<NameValue>,
}

/// Bulk payload describing everything interesting at a pause.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PauseData {
    #[serde(default)]
    pub frames: Vec<FrameData>,
    #[serde(default)]
    pub objects: Vec<PausedObject>,
    #[serde(default)]
    pub environments: Vec<PausedEnvironment>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptData {
    pub id: ScriptId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub source_id: Option<SourceId>,
    #[serde(default)]
    pub start_line: u32,
    #[serde(default)]
    pub line_count: u32,
    #[serde(default)]
    pub source_start: u32,
    #[serde(default)]
    pub source_length: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceData {
    pub id: SourceId,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "displayURL", default)]
    pub display_url: Option<String>,
    #[serde(default)]
    pub introduction_type: Option<String>,
    #[serde(default)]
    pub introduction_script: Option<ScriptId>,
    #[serde(rename = "sourceMapURL", default)]
    pub source_map_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleMessageData {
    pub message_type: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub column_number: Option<u32>,
    #[serde(default)]
    pub execution_point: Option<ExecutionPoint>,
    #[serde(default)]
    pub arguments: Vec<Json>,
    /// Object snapshots captured when the message was logged, so the
    /// arguments stay inspectable after that pause is long gone.
    #[serde(default)]
    pub pause_data: Option<PauseData>,
}
