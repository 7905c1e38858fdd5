use std::fmt;

use serde_json::{json, Value as Json};

use crate::{ObjectId, ReplayError, Result};

/// Generation tag of a [`crate::Pool`].
///
/// A mirror or [`ObjectRef`] is live only while its epoch equals the epoch of
/// the debugger's current pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub fn first() -> Self {
        Self(1)
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Non-owning handle to an object or environment mirror.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub epoch: Epoch,
    pub id: ObjectId,
}

/// A debuggee value as seen from the controlling side.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(ObjectRef),
    /// Structured data the channel passed through verbatim.
    Json(Json),
}

impl Value {
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Encode for the control channel.
    ///
    /// Objects must belong to `active`; handing the subject a reference from a
    /// superseded pool is an invariant violation.
    pub fn to_wire(&self, active: Epoch) -> Result<Json> {
        Ok(match self {
            Value::Undefined => special("undefined"),
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => encode_number(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::Object(obj) => {
                if obj.epoch != active {
                    return Err(ReplayError::invariant(format!(
                        "pool cross-reference: object {} belongs to epoch {} but {} is active",
                        obj.id, obj.epoch, active
                    )));
                }
                json!({ "object": obj.id })
            }
            Value::Json(raw) => raw.clone(),
        })
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

/// Outcome of running code in the subject.
#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    Return(Value),
    Throw { value: Value, stack: Option<Json> },
}

impl Completion {
    pub fn throw(value: impl Into<Value>) -> Self {
        Completion::Throw {
            value: value.into(),
            stack: None,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Completion::Return(value) | Completion::Throw { value, .. } => value,
        }
    }

    pub fn is_throw(&self) -> bool {
        matches!(self, Completion::Throw { .. })
    }

    pub fn to_wire(&self, active: Epoch) -> Result<Json> {
        Ok(match self {
            Completion::Return(value) => json!({ "return": value.to_wire(active)? }),
            Completion::Throw { value, stack } => {
                let mut out = json!({ "throw": value.to_wire(active)? });
                if let Some(stack) = stack {
                    out["stack"] = stack.clone();
                }
                out
            }
        })
    }
}

/// A wire value with its object reference (if any) not yet resolved.
#[derive(Debug)]
pub(crate) enum Decoded {
    Object(ObjectId),
    Value(Value),
}

pub(crate) fn decode(raw: &Json) -> Result<Decoded> {
    let value = match raw {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(
            n.as_f64()
                .ok_or_else(|| ReplayError::protocol(format!("unrepresentable number {n}")))?,
        ),
        Json::String(s) => Value::String(s.clone()),
        Json::Object(map) if map.len() == 1 && map.contains_key("object") => {
            return match map["object"].as_u64() {
                Some(id) => Ok(Decoded::Object(id)),
                None => Err(ReplayError::protocol(format!(
                    "object reference with non-integer id: {raw}"
                ))),
            };
        }
        Json::Object(map) if map.len() == 1 && map.contains_key("special") => {
            match map["special"].as_str() {
                Some("undefined") => Value::Undefined,
                Some("NaN") => Value::Number(f64::NAN),
                Some("Infinity") => Value::Number(f64::INFINITY),
                Some("-Infinity") => Value::Number(f64::NEG_INFINITY),
                Some("-0") => Value::Number(-0.0),
                _ => {
                    return Err(ReplayError::protocol(format!("unknown special value {raw}")));
                }
            }
        }
        other => Value::Json(other.clone()),
    };
    Ok(Decoded::Value(value))
}

/// The two legal shapes of a wire completion record.
pub(crate) enum RawCompletion<'a> {
    Return(&'a Json),
    Throw {
        value: &'a Json,
        stack: Option<&'a Json>,
    },
}

pub(crate) fn split_completion(raw: &Json) -> Result<RawCompletion<'_>> {
    let Some(map) = raw.as_object() else {
        return Err(ReplayError::protocol(format!(
            "completion record is not an object: {raw}"
        )));
    };
    match (map.get("return"), map.get("throw")) {
        (Some(value), None) => Ok(RawCompletion::Return(value)),
        (None, Some(value)) => Ok(RawCompletion::Throw {
            value,
            stack: map.get("stack"),
        }),
        (Some(_), Some(_)) => Err(ReplayError::protocol(
            "completion record carries both `return` and `throw`",
        )),
        (None, None) => Err(ReplayError::protocol(
            "completion record carries neither `return` nor `throw`",
        )),
    }
}

fn special(name: &str) -> Json {
    json!({ "special": name })
}

fn encode_number(n: f64) -> Json {
    if n.is_nan() {
        special("NaN")
    } else if n == f64::INFINITY {
        special("Infinity")
    } else if n == f64::NEG_INFINITY {
        special("-Infinity")
    } else if n == 0.0 && n.is_sign_negative() {
        special("-0")
    } else if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Json::from(n as i64)
    } else {
        // Finite by construction, so `from_f64` cannot fail.
        serde_json::Number::from_f64(n).map_or(Json::Null, Json::Number)
    }
}
