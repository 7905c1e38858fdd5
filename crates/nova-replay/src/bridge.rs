use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::{ControlChannel, ReplayError, Request, Response, Result};

/// Synchronous request/response access to the control channel.
///
/// There are no retries: a request either yields a decoded response, the
/// caller's fallback, or an error.
pub struct RequestBridge<C> {
    channel: C,
}

impl<C: ControlChannel> RequestBridge<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Plain round trip for requests a pure recording can always answer.
    pub fn send<T: DeserializeOwned>(&mut self, request: Request) -> Result<T> {
        match self.round_trip(&request)? {
            Response::Value(raw) => decode(&request, raw),
            Response::UnhandledDivergence => Err(ReplayError::protocol(format!(
                "`{}` is not a diverging request but the channel reported a divergence",
                request.name()
            ))),
        }
    }

    /// Plain round trip whose response carries nothing of interest.
    pub fn send_command(&mut self, request: Request) -> Result<()> {
        let _: serde_json::Value = self.send(request)?;
        Ok(())
    }

    /// Round trip for requests that make the subject execute speculatively.
    ///
    /// The channel is first asked to switch to a replaying subject. If the
    /// request still diverges, `fallback` is returned in place of a response;
    /// without a fallback the divergence is fatal.
    pub fn send_diverging<T: DeserializeOwned>(
        &mut self,
        request: Request,
        fallback: Option<T>,
    ) -> Result<T> {
        match self.try_send_diverging(&request)? {
            Some(raw) => decode(&request, raw),
            None => substitute_fallback(&request, fallback),
        }
    }

    /// Like [`Self::send_diverging`] but hands back the raw response.
    ///
    /// `None` means the recording diverged.
    pub fn try_send_diverging(&mut self, request: &Request) -> Result<Option<Json>> {
        self.channel.ensure_replaying()?;
        match self.round_trip(request)? {
            Response::Value(raw) => Ok(Some(raw)),
            Response::UnhandledDivergence => Ok(None),
        }
    }

    fn round_trip(&mut self, request: &Request) -> Result<Response> {
        tracing::debug!(
            target: "nova.replay.bridge",
            request = request.name(),
            diverging = request.may_diverge(),
            "sending request"
        );
        let response = self.channel.send_request(request).map_err(|err| {
            tracing::debug!(
                target: "nova.replay.bridge",
                request = request.name(),
                error = %err,
                "request failed"
            );
            err
        })?;
        Ok(response)
    }
}

/// Answer a diverged `request` with the caller's fallback, untouched.
pub(crate) fn substitute_fallback<T>(request: &Request, fallback: Option<T>) -> Result<T> {
    match fallback {
        Some(fallback) => {
            tracing::warn!(
                target: "nova.replay.bridge",
                request = request.name(),
                "recording diverged; substituting fallback"
            );
            Ok(fallback)
        }
        None => Err(ReplayError::divergence(request.name())),
    }
}

fn decode<T: DeserializeOwned>(request: &Request, raw: serde_json::Value) -> Result<T> {
    serde_json::from_value(raw).map_err(|err| {
        ReplayError::protocol(format!(
            "malformed `{}` response: {err}",
            request.name()
        ))
    })
}
