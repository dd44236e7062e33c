//! evtproxy core - the forwarding-and-supervision engine.
//!
//! The proxy launches a target program, intercepts every bus message
//! addressed to itself, re-addresses each one to the launched child and
//! relays the reply back, while a periodic liveness probe watches the
//! child. When the child dies or a quit request has been handed over, the
//! dispatch loop converges to a clean shutdown.

pub mod bus;
pub mod launch;
pub mod process;
pub mod proxy;

#[cfg(test)]
pub(crate) mod testutil;

pub use bus::{BusLayout, DatagramBus, Delivery, MessageBus, ReplySink, ReplySlot};
pub use launch::{AppLauncher, Launch, LaunchSpec};
pub use process::ProcessHandle;
pub use proxy::{
    BusForwarder, Dispatcher, Forward, KillProbe, LivenessProbe, ProbeOutcome, ProxyLoop,
    ProxyState, ShutdownReason, Supervisor,
};

// Re-exported so binaries depend on one crate only.
pub use evtproxy_shared::{Envelope, EventIdentity, FourCc, ProxyError, ProxyResult, ReplyWait};
