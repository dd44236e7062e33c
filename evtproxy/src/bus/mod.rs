//! The message bus the proxy consumes.
//!
//! [`MessageBus`] is the seam between the forwarding engine and the
//! underlying transport: interception of inbound messages, address
//! construction, and synchronous send-with-reply. Production uses the
//! Unix-datagram backend in [`datagram`]; tests substitute fakes.

mod datagram;
mod layout;
mod reply;

pub use datagram::DatagramBus;
pub use layout::BusLayout;
pub use reply::{ReplySink, ReplySlot};

use async_trait::async_trait;
use evtproxy_shared::{BusAddress, Envelope, ProxyResult, ReplyWait, SendPriority};

use crate::process::ProcessHandle;

/// One intercepted message plus the slot its reply goes into.
pub struct Delivery {
    pub envelope: Envelope,
    pub reply: ReplySlot,
}

/// Messaging primitives consumed by the proxy.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Wait for the next message addressed to this process.
    async fn next_delivery(&self) -> ProxyResult<Delivery>;

    /// Build the address descriptor for a registered process.
    fn address_of(&self, handle: &ProcessHandle) -> ProxyResult<BusAddress>;

    /// Transmit a fully addressed envelope and wait for the synchronous
    /// reply according to `wait`. `NoReply` transmits and returns `None`
    /// immediately; a bounded wait that elapses is a
    /// [`ProxyError::ReplyTimeout`](evtproxy_shared::ProxyError::ReplyTimeout).
    async fn send_and_wait(
        &self,
        envelope: Envelope,
        wait: ReplyWait,
        priority: SendPriority,
    ) -> ProxyResult<Option<Envelope>>;
}
