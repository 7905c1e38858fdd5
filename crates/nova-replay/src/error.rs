use std::backtrace::Backtrace;

use thiserror::Error;

use crate::ObjectId;

pub type Result<T> = std::result::Result<T, ReplayError>;

/// Failures reported by a [`crate::ControlChannel`] implementation.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("control channel is disconnected")]
    Disconnected,
    #[error("control channel rejected `{request}`: {message}")]
    Rejected {
        request: &'static str,
        message: String,
    },
    #[error("{0}")]
    Other(String),
}

/// Errors from debugger operations.
///
/// Fatal variants carry a boxed [`Backtrace`]. A bare `Backtrace` field makes
/// `thiserror` emit `Error::provide`, which is nightly-only.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("control channel: {0}")]
    Channel(#[from] ChannelError),

    /// The control channel answered with data this proxy cannot make sense of.
    #[error("protocol violation: {message}")]
    Protocol {
        message: String,
        backtrace: Box<Backtrace>,
    },

    /// Internal bookkeeping reached a state that must never happen.
    #[error("invariant violated: {message}")]
    Invariant {
        message: String,
        backtrace: Box<Backtrace>,
    },

    #[error("recording diverged while handling `{request}` and no fallback was supplied")]
    Divergence {
        request: &'static str,
        backtrace: Box<Backtrace>,
    },

    #[error("invalid frame index {0}")]
    InvalidFrameIndex(u32),

    #[error("invalid object id {0}")]
    InvalidObjectId(ObjectId),

    #[error("operation is not allowed while replaying: {0}")]
    NotAllowed(&'static str),

    #[error("operation is not implemented: {0}")]
    NotImplemented(&'static str),
}

impl ReplayError {
    #[track_caller]
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        let message = message.into();
        let loc = std::panic::Location::caller();
        tracing::error!(
            target: "nova.replay",
            file = loc.file(),
            line = loc.line(),
            %message,
            "protocol violation"
        );
        Self::Protocol {
            message,
            backtrace: Box::new(Backtrace::capture()),
        }
    }

    #[track_caller]
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        let loc = std::panic::Location::caller();
        tracing::error!(
            target: "nova.replay",
            file = loc.file(),
            line = loc.line(),
            %message,
            "invariant violated"
        );
        Self::Invariant {
            message,
            backtrace: Box::new(Backtrace::capture()),
        }
    }

    pub(crate) fn divergence(request: &'static str) -> Self {
        tracing::error!(
            target: "nova.replay.bridge",
            request,
            "recording diverged and the caller supplied no fallback"
        );
        Self::Divergence {
            request,
            backtrace: Box::new(Backtrace::capture()),
        }
    }

    /// Whether the error leaves the mirror state unusable.
    ///
    /// Rejections of unsupported operations and bad lookups are recoverable;
    /// protocol and invariant violations (including a divergence nobody
    /// supplied a fallback for) are not.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Channel(_)
            | Self::Protocol { .. }
            | Self::Invariant { .. }
            | Self::Divergence { .. } => true,
            Self::InvalidFrameIndex(_)
            | Self::InvalidObjectId(_)
            | Self::NotAllowed(_)
            | Self::NotImplemented(_) => false,
        }
    }

    /// Captured stack for fatal errors.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            Self::Protocol { backtrace, .. }
            | Self::Invariant { backtrace, .. }
            | Self::Divergence { backtrace, .. } => Some(&**backtrace),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ReplayError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(format!("malformed response: {err}"))
    }
}
