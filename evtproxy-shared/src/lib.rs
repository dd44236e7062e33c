//! evtproxy shared types - common code for every bus participant
//!
//! This crate contains the wire-level message model, registration records,
//! and error types used by the proxy itself, by launched programs that join
//! the bus, and by test fakes.

pub mod constants;
pub mod errors;
pub mod registry;
pub mod wire;

pub use errors::{ProxyError, ProxyResult};
pub use registry::{BusAddress, ProcessSerial, Registration};
pub use wire::{
    AttributeId, AttributeValue, Envelope, EventIdentity, FourCc, ReplyWait, SendPriority,
};
