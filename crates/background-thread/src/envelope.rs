//! Message payloads and addressing.
//!
//! A [`Payload`] is JSON text that has been checked once at the boundary and
//! is forwarded verbatim afterwards. A [`MessageEnvelope`] adds where the
//! message came from and, for unicast, which sandbox it is addressed to.
//! [`WireEnvelope`] is the single-line form exchanged with process runtimes.

use std::{borrow::Borrow, fmt, sync::Arc};

use serde::{Deserialize, Serialize, de::IgnoredAny};
use serde_json::value::RawValue;

use crate::error::{Error, Result};

/// Well-formed JSON text, shared and immutable.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Payload(Arc<str>);

impl Payload {
    /// Validate `text` as exactly one JSON value.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        serde_json::from_str::<IgnoredAny>(&text).map_err(Error::MalformedPayload)?;
        Ok(Self(Arc::from(text)))
    }

    fn from_raw(raw: &RawValue) -> Self {
        Self(Arc::from(raw.get()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Payload {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Payload").field(&&*self.0).finish()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Payload> for String {
    fn from(value: Payload) -> Self {
        value.0.to_string()
    }
}

/// Identifier of a registered sandbox. Matched exactly, never by prefix.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SandboxId(Arc<str>);

impl SandboxId {
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref();
        if id.is_empty() {
            return Err(Error::EmptySandboxId);
        }
        Ok(Self(Arc::from(id)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SandboxId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SandboxId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SandboxId> for String {
    fn from(value: SandboxId) -> Self {
        value.0.to_string()
    }
}

impl fmt::Debug for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which environment produced a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    Host,
    Background,
    Sandbox(SandboxId),
}

/// The unit of routing: a payload plus its addressing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub origin: Origin,
    pub payload: Payload,
    pub target: Option<SandboxId>,
}

impl MessageEnvelope {
    #[must_use]
    pub const fn new(origin: Origin, payload: Payload) -> Self {
        Self {
            origin,
            payload,
            target: None,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: SandboxId) -> Self {
        self.target = Some(target);
        self
    }

    /// Encode as a [`WireEnvelope`] line without a trailing newline.
    pub fn to_wire(&self) -> Result<String> {
        WireEnvelope::encode(&self.payload, self.target.as_ref())
    }
}

/// One line of `{"payload": <json>, "target": "<id>"}`.
///
/// `payload` is captured as raw JSON so its text survives decoding untouched.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub payload: Box<RawValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<SandboxId>,
}

impl WireEnvelope {
    pub fn decode(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(Error::MalformedEnvelope)
    }

    /// Line breaks outside JSON strings are whitespace, so folding them keeps
    /// the payload equivalent while preserving line framing.
    pub fn encode(payload: &Payload, target: Option<&SandboxId>) -> Result<String> {
        let text = payload.as_str();
        let text = if text.contains(['\n', '\r']) {
            text.replace(['\n', '\r'], " ")
        } else {
            text.to_owned()
        };
        let wire = Self {
            payload: RawValue::from_string(text).map_err(Error::MalformedPayload)?,
            target: target.cloned(),
        };
        serde_json::to_string(&wire).map_err(Error::Serialize)
    }

    #[must_use]
    pub fn into_envelope(self, origin: Origin) -> MessageEnvelope {
        MessageEnvelope {
            origin,
            payload: Payload::from_raw(&self.payload),
            target: self.target,
        }
    }
}
