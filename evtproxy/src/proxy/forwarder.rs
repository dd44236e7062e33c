//! Forwarding one message to the child.

use std::sync::Arc;

use async_trait::async_trait;
use evtproxy_shared::{Envelope, ProxyError, ProxyResult, SendPriority};

use crate::bus::{MessageBus, ReplySlot};
use crate::process::ProcessHandle;

/// Capability to forward a message to the child.
#[async_trait]
pub trait Forward: Send {
    async fn forward(
        &mut self,
        envelope: &Envelope,
        reply: &mut ReplySlot,
        dest: &ProcessHandle,
    ) -> ProxyResult<()>;
}

/// Production forwarder: re-addresses a duplicate of the message to the
/// child and relays the reply into the slot.
///
/// Address and declared wait are both taken from the original message, so
/// the sender's reply semantics (whether it waits at all, and for how
/// long) survive the hop exactly.
pub struct BusForwarder<B> {
    bus: Arc<B>,
}

impl<B> BusForwarder<B> {
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl<B: MessageBus> Forward for BusForwarder<B> {
    async fn forward(
        &mut self,
        envelope: &Envelope,
        reply: &mut ReplySlot,
        dest: &ProcessHandle,
    ) -> ProxyResult<()> {
        // The original stays valid for the interception layer; only the
        // duplicate is re-addressed.
        let mut duplicate = envelope.clone();

        let address = match self.bus.address_of(dest) {
            Ok(address) => address,
            Err(e) => {
                tracing::error!(error = %e, "could not build destination address");
                return Err(e);
            }
        };
        duplicate.set_target(address);

        // Never guess a wait: a message without one is dropped.
        let wait = match envelope.reply_wait() {
            Ok(wait) => wait,
            Err(e) => {
                tracing::error!(error = %e, "could not extract declared reply wait");
                return Err(e);
            }
        };

        match reply.reset_timer() {
            Ok(()) => {}
            // A slot without a reply target has no timer to arm; that is
            // the normal state of a message whose sender expects no reply.
            Err(ProxyError::InvalidReplyTarget) => {}
            Err(e) => {
                tracing::error!(error = %e, "could not reset reply timer");
                return Err(e);
            }
        }

        match self
            .bus
            .send_and_wait(duplicate, wait, SendPriority::Normal)
            .await
        {
            Ok(Some(reply_envelope)) => reply.deliver(&reply_envelope),
            Ok(None) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "forward transmission failed");
                Err(e)
            }
        }
    }
}
