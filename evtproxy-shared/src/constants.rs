//! Shared constants between the proxy and launched bus participants.
//!
//! These values cross a process boundary and must be identical on both
//! sides of it.

/// Well-known event identities.
pub mod events {
    use crate::wire::{EventIdentity, FourCc};

    /// Core event class.
    pub const CORE_CLASS: FourCc = FourCc::new(*b"aevt");

    /// Event id asking the receiver to quit.
    pub const QUIT: FourCc = FourCc::new(*b"quit");

    /// Event id notifying a watcher that a process it tracks has died.
    pub const PROCESS_DIED: FourCc = FourCc::new(*b"obit");

    /// Event id of a reply event.
    pub const REPLY: FourCc = FourCc::new(*b"ansr");

    /// Full identity of a reply event.
    pub const REPLY_IDENTITY: EventIdentity = EventIdentity::new(CORE_CLASS, REPLY);
}

/// Environment variables the proxy sets for launched programs.
pub mod env {
    /// Overrides the bus directory; inherited by the launched child.
    pub const BUS_DIR: &str = "EVTPROXY_BUS_DIR";

    /// Path of the startup-parameters file holding the child's first event.
    /// Only set when a first event was pending at launch; the file lives
    /// for the duration of launch-handle resolution, so the child must
    /// read it during startup.
    pub const STARTUP_EVENT: &str = "EVTPROXY_STARTUP_EVENT";
}
