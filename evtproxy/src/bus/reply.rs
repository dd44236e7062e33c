//! Per-delivery reply slots.

use std::time::Instant;

use evtproxy_shared::{Envelope, ProxyError, ProxyResult, ReplyWait};

/// Capability to hand a reply back to a message's original sender.
pub trait ReplySink: Send {
    fn deliver(&mut self, reply: &Envelope) -> ProxyResult<()>;
}

/// Output channel the interception layer supplies with each delivery.
///
/// Holds the sink bound to the sender's reply address (absent when the
/// sender declared it expects no reply) and the sender-wait deadline armed
/// from the inbound message's declared wait. A slot dropped without
/// [`ReplySlot::deliver`] leaves the sender's reply empty.
pub struct ReplySlot {
    sink: Option<Box<dyn ReplySink>>,
    wait: ReplyWait,
    deadline: Option<Instant>,
    delivered: bool,
}

impl ReplySlot {
    pub fn new(sink: Option<Box<dyn ReplySink>>, wait: ReplyWait) -> Self {
        Self {
            sink,
            deadline: arm(wait),
            wait,
            delivered: false,
        }
    }

    /// Slot for a message whose sender expects no reply.
    pub fn detached() -> Self {
        Self::new(None, ReplyWait::NoReply)
    }

    /// Re-arm the sender-wait deadline before a fresh send attempt.
    ///
    /// Fails with [`ProxyError::InvalidReplyTarget`] when the slot has no
    /// reply target to arm a timer for; whether that matters is the
    /// caller's decision.
    pub fn reset_timer(&mut self) -> ProxyResult<()> {
        if self.sink.is_none() {
            return Err(ProxyError::InvalidReplyTarget);
        }
        self.deadline = arm(self.wait);
        Ok(())
    }

    /// Write a reply through to the original sender, unmodified.
    ///
    /// Replies nobody is waiting for (no sink, or the sender's wait has
    /// already elapsed) are dropped silently apart from a debug line.
    pub fn deliver(&mut self, reply: &Envelope) -> ProxyResult<()> {
        let Some(sink) = self.sink.as_mut() else {
            tracing::debug!("dropping reply: sender expects none");
            return Ok(());
        };

        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                tracing::debug!("dropping reply: sender stopped waiting");
                return Ok(());
            }
        }

        sink.deliver(reply)?;
        self.delivered = true;
        Ok(())
    }

    /// Whether nothing has been written into this slot.
    pub fn is_empty(&self) -> bool {
        !self.delivered
    }
}

fn arm(wait: ReplyWait) -> Option<Instant> {
    match wait {
        ReplyWait::Bounded(limit) => Instant::now().checked_add(limit),
        ReplyWait::NoReply | ReplyWait::Forever => None,
    }
}
