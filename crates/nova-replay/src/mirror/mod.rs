//! Local stand-ins for frames, objects and environments of one pause.
//!
//! Mirrors are plain data plus caches. They carry the [`Epoch`] of the pool
//! that created them; anything needing a round trip goes through
//! [`crate::ReplayDebugger`], which refuses to issue one for a stale mirror.

mod environment;
mod frame;
mod object;

use std::rc::Rc;

pub use environment::EnvironmentMirror;
pub use frame::FrameMirror;
pub use object::{ObjectMirror, ObjectPreview, PreviewLevel, PropertyDescriptor};

use crate::{Epoch, ObjectId, ObjectRef};

/// Anything addressed by an object id.
#[derive(Clone, Debug)]
pub enum Mirror {
    Object(Rc<ObjectMirror>),
    Environment(Rc<EnvironmentMirror>),
}

impl Mirror {
    pub fn id(&self) -> ObjectId {
        match self {
            Mirror::Object(object) => object.id(),
            Mirror::Environment(env) => env.id(),
        }
    }

    pub fn epoch(&self) -> Epoch {
        match self {
            Mirror::Object(object) => object.epoch(),
            Mirror::Environment(env) => env.epoch(),
        }
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            epoch: self.epoch(),
            id: self.id(),
        }
    }

    pub fn as_object(&self) -> Option<&Rc<ObjectMirror>> {
        match self {
            Mirror::Object(object) => Some(object),
            Mirror::Environment(_) => None,
        }
    }

    pub fn as_environment(&self) -> Option<&Rc<EnvironmentMirror>> {
        match self {
            Mirror::Environment(env) => Some(env),
            Mirror::Object(_) => None,
        }
    }
}

pub(crate) fn tag(epoch: Epoch, id: Option<ObjectId>) -> Option<ObjectRef> {
    id.map(|id| ObjectRef { epoch, id })
}
