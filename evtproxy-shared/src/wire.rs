//! Wire-level message model.
//!
//! A message on the bus is an [`Envelope`]: an opaque payload plus a table
//! of addressing and delivery attributes. The proxy never inspects the
//! payload; it only reads the attributes it needs (identity, declared reply
//! wait) and rewrites the target when forwarding. Attribute access is
//! fallible by design - a message from a foreign sender may carry any
//! subset of attributes, in any shape.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::{ProxyError, ProxyResult};
use crate::registry::BusAddress;

/// Printable four-character code identifying an event class or event id.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

/// Identity tag of a message: event-class/event-id pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EventIdentity {
    pub class: FourCc,
    pub id: FourCc,
}

impl EventIdentity {
    pub const fn new(class: FourCc, id: FourCc) -> Self {
        Self { class, id }
    }
}

/// How long the sender of a message waits for a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReplyWait {
    /// The sender does not wait; no reply is expected.
    NoReply,
    /// The sender waits up to the given duration.
    Bounded(Duration),
    /// The sender waits indefinitely.
    Forever,
}

/// Transmission priority. Forwarded messages are always sent at `Normal`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SendPriority {
    #[default]
    Normal,
    High,
}

/// Keys of the attribute table.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum AttributeId {
    EventClass,
    EventId,
    ReplyWait,
    Target,
    ReplyTo,
}

/// Descriptor payloads the attribute table can hold.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AttributeValue {
    FourCc(FourCc),
    Wait(ReplyWait),
    Address(BusAddress),
}

/// A single inter-process message: attribute table plus opaque payload.
///
/// Envelopes are cheap to duplicate with `clone`; the forwarder clones
/// before re-addressing so the original stays valid for diagnostics.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    attributes: BTreeMap<AttributeId, AttributeValue>,
    #[serde(default)]
    payload: Vec<u8>,
}

impl Envelope {
    /// Build a request envelope with the given identity and declared wait.
    pub fn request(identity: EventIdentity, wait: ReplyWait, payload: Vec<u8>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(AttributeId::EventClass, AttributeValue::FourCc(identity.class));
        attributes.insert(AttributeId::EventId, AttributeValue::FourCc(identity.id));
        attributes.insert(AttributeId::ReplyWait, AttributeValue::Wait(wait));
        Self { attributes, payload }
    }

    /// Build a reply envelope carrying the given payload.
    pub fn reply(payload: Vec<u8>) -> Self {
        Self::request(
            crate::constants::events::REPLY_IDENTITY,
            ReplyWait::NoReply,
            payload,
        )
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn attr(&self, id: AttributeId) -> ProxyResult<&AttributeValue> {
        self.attributes
            .get(&id)
            .ok_or(ProxyError::MissingAttribute(id))
    }

    fn four_cc(&self, id: AttributeId) -> ProxyResult<FourCc> {
        match self.attr(id)? {
            AttributeValue::FourCc(code) => Ok(*code),
            _ => Err(ProxyError::MalformedAttribute(id)),
        }
    }

    fn address(&self, id: AttributeId) -> ProxyResult<&BusAddress> {
        match self.attr(id)? {
            AttributeValue::Address(addr) => Ok(addr),
            _ => Err(ProxyError::MalformedAttribute(id)),
        }
    }

    /// The message's identity tag.
    pub fn identity(&self) -> ProxyResult<EventIdentity> {
        Ok(EventIdentity {
            class: self.four_cc(AttributeId::EventClass)?,
            id: self.four_cc(AttributeId::EventId)?,
        })
    }

    /// The declared reply wait carried on the message.
    pub fn reply_wait(&self) -> ProxyResult<ReplyWait> {
        match self.attr(AttributeId::ReplyWait)? {
            AttributeValue::Wait(wait) => Ok(*wait),
            _ => Err(ProxyError::MalformedAttribute(AttributeId::ReplyWait)),
        }
    }

    /// The destination this envelope is addressed to.
    pub fn target(&self) -> ProxyResult<&BusAddress> {
        self.address(AttributeId::Target)
    }

    /// Where replies to this envelope should be sent.
    pub fn reply_to(&self) -> ProxyResult<&BusAddress> {
        self.address(AttributeId::ReplyTo)
    }

    pub fn set_target(&mut self, addr: BusAddress) {
        self.attributes
            .insert(AttributeId::Target, AttributeValue::Address(addr));
    }

    pub fn set_reply_to(&mut self, addr: BusAddress) {
        self.attributes
            .insert(AttributeId::ReplyTo, AttributeValue::Address(addr));
    }

    /// Remove an attribute, if present.
    pub fn strip_attribute(&mut self, id: AttributeId) {
        self.attributes.remove(&id);
    }

    /// Encode for transmission on the bus.
    pub fn encode(&self) -> ProxyResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProxyError::Codec(e.to_string()))
    }

    /// Decode a received datagram.
    pub fn decode(bytes: &[u8]) -> ProxyResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ProxyError::Codec(e.to_string()))
    }
}
