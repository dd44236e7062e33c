//! The catch-all message handler.

use evtproxy_shared::constants::events;
use evtproxy_shared::{Envelope, ProxyResult};

use super::forwarder::Forward;
use super::{ProxyState, ShutdownReason};
use crate::bus::ReplySlot;
use crate::launch::Launch;

/// Routes every intercepted message: ensures the child is launched,
/// special-cases the two termination notices, forwards everything else.
pub struct Dispatcher<L, F> {
    launcher: L,
    forwarder: F,
}

impl<L: Launch, F: Forward> Dispatcher<L, F> {
    pub fn new(launcher: L, forwarder: F) -> Self {
        Self {
            launcher,
            forwarder,
        }
    }

    pub async fn dispatch(
        &mut self,
        state: &mut ProxyState,
        envelope: Envelope,
        mut reply: ReplySlot,
    ) -> ProxyResult<()> {
        let child = match state.child() {
            Some(handle) => handle,
            None => {
                // The first intercepted message doubles as the child's
                // startup event. Failure here is fatal: the proxy has no
                // purpose without a child.
                let handle = self.launcher.launch(Some(&envelope)).await?;
                state.set_child(handle);
                handle
            }
        };

        let identity = envelope.identity()?;

        if identity.id == events::PROCESS_DIED {
            // A notice about our own child, not something to forward.
            state.request_shutdown(ShutdownReason::ChildDied);
            return Ok(());
        }

        if state.verbose() {
            println!("Forwarding event {}", identity.id);
        }

        self.forwarder.forward(&envelope, &mut reply, &child).await?;

        if identity.id == events::QUIT {
            // The child has received the quit; now the proxy can go too.
            state.request_shutdown(ShutdownReason::QuitForwarded);
        }

        Ok(())
    }
}
