//! The proxy event loop.
//!
//! One `select!` loop dispatches both inbound messages and liveness timer
//! ticks, so dispatcher and supervisor never run concurrently and the
//! shared [`ProxyState`] needs no locking. Shutdown is cooperative: either
//! side sets the flag, and the loop honors it at its next iteration.

mod dispatcher;
mod forwarder;
mod supervisor;

pub use dispatcher::Dispatcher;
pub use forwarder::{BusForwarder, Forward};
pub use supervisor::{KillProbe, LivenessProbe, ProbeOutcome, Supervisor};

use std::sync::Arc;
use std::time::Duration;

use evtproxy_shared::ProxyResult;
use tokio::time::{interval_at, Instant};

use crate::bus::{DatagramBus, MessageBus};
use crate::launch::{AppLauncher, Launch, LaunchSpec};
use crate::process::ProcessHandle;

/// Delay before the first periodic liveness poll.
const FIRST_PROBE_DELAY: Duration = Duration::from_secs(13);
/// Period of the liveness poll.
const PROBE_INTERVAL: Duration = Duration::from_secs(9);

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A process-died notice arrived.
    ChildDied,
    /// A quit request was handed over to the child.
    QuitForwarded,
    /// The liveness probe found the child gone.
    ChildGone,
}

/// Single-threaded state shared by dispatcher and supervisor.
///
/// The child handle is written exactly once, by the launcher on first
/// dispatch; everything else only reads it.
pub struct ProxyState {
    child: Option<ProcessHandle>,
    verbose: bool,
    shutdown: Option<ShutdownReason>,
}

impl ProxyState {
    pub fn new(verbose: bool) -> Self {
        Self {
            child: None,
            verbose,
            shutdown: None,
        }
    }

    pub fn child(&self) -> Option<ProcessHandle> {
        self.child
    }

    pub(crate) fn set_child(&mut self, handle: ProcessHandle) {
        self.child = Some(handle);
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Request cooperative shutdown; the first reason wins.
    pub fn request_shutdown(&mut self, reason: ShutdownReason) {
        if let Some(existing) = self.shutdown {
            tracing::debug!(?existing, ?reason, "shutdown already requested");
            return;
        }
        tracing::debug!(?reason, "shutdown requested");
        self.shutdown = Some(reason);
    }

    pub fn shutdown_requested(&self) -> Option<ShutdownReason> {
        self.shutdown
    }
}

/// The proxy loop: dispatcher plus supervisor over one consumed event
/// loop, owning the single termination decision.
pub struct ProxyLoop<B, L, F, P> {
    bus: Arc<B>,
    dispatcher: Dispatcher<L, F>,
    supervisor: Supervisor<P>,
    state: ProxyState,
}

impl ProxyLoop<DatagramBus, AppLauncher, BusForwarder<DatagramBus>, KillProbe> {
    /// Production wiring over a joined datagram bus.
    pub fn standard(bus: Arc<DatagramBus>, spec: LaunchSpec, verbose: bool) -> Self {
        let launcher = AppLauncher::new(spec, bus.layout().clone());
        let forwarder = BusForwarder::new(Arc::clone(&bus));
        Self::new(
            bus,
            Dispatcher::new(launcher, forwarder),
            Supervisor::new(KillProbe),
            verbose,
        )
    }
}

impl<B, L, F, P> ProxyLoop<B, L, F, P>
where
    B: MessageBus,
    L: Launch,
    F: Forward,
    P: LivenessProbe,
{
    pub fn new(
        bus: Arc<B>,
        dispatcher: Dispatcher<L, F>,
        supervisor: Supervisor<P>,
        verbose: bool,
    ) -> Self {
        Self {
            bus,
            dispatcher,
            supervisor,
            state: ProxyState::new(verbose),
        }
    }

    /// Dispatch until shutdown is requested or a fatal error occurs.
    ///
    /// Per-message failures drop the message and keep going; only launch
    /// and setup failures abort.
    pub async fn run(mut self) -> ProxyResult<ShutdownReason> {
        // One synchronous check before the timer exists, so a child that
        // died instantly is caught even if no message ever arrives.
        self.supervisor.check(&mut self.state);

        let mut ticks = interval_at(Instant::now() + FIRST_PROBE_DELAY, PROBE_INTERVAL);

        loop {
            if let Some(reason) = self.state.shutdown_requested() {
                tracing::debug!(?reason, "stopping dispatch loop");
                return Ok(reason);
            }

            tokio::select! {
                delivery = self.bus.next_delivery() => match delivery {
                    Ok(delivery) => {
                        if let Err(e) = self
                            .dispatcher
                            .dispatch(&mut self.state, delivery.envelope, delivery.reply)
                            .await
                        {
                            if e.is_fatal() {
                                return Err(e);
                            }
                            tracing::error!(error = %e, "dropping message");
                        }
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => tracing::warn!(error = %e, "discarding undeliverable message"),
                },
                _ = ticks.tick() => self.supervisor.check(&mut self.state),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bus::ReplySlot;
    use crate::testutil::{handle, request, FakeBus, FakeForwarder, FakeLauncher, FakeProbe};
    use evtproxy_shared::{ProxyError, ReplyWait};

    fn proxy(
        bus: Arc<FakeBus>,
        launcher: FakeLauncher,
        forwarder: FakeForwarder,
        probe: FakeProbe,
    ) -> ProxyLoop<FakeBus, FakeLauncher, FakeForwarder, FakeProbe> {
        ProxyLoop::new(
            bus,
            Dispatcher::new(launcher, forwarder),
            Supervisor::new(probe),
            false,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn a_process_died_notice_stops_the_loop() {
        let bus = Arc::new(FakeBus::default());
        bus.push_delivery(request(b"obit", ReplyWait::NoReply), ReplySlot::detached());

        let forwarder = FakeForwarder::default();
        let proxy = proxy(
            Arc::clone(&bus),
            FakeLauncher::new(handle(1, 100)),
            forwarder.clone(),
            FakeProbe::Alive,
        );

        let reason = proxy.run().await.unwrap();

        assert_eq!(reason, ShutdownReason::ChildDied);
        assert!(forwarder.forwarded.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn a_forwarded_quit_stops_the_loop() {
        let bus = Arc::new(FakeBus::default());
        bus.push_delivery(request(b"quit", ReplyWait::NoReply), ReplySlot::detached());

        let forwarder = FakeForwarder::default();
        let proxy = proxy(
            Arc::clone(&bus),
            FakeLauncher::new(handle(1, 100)),
            forwarder.clone(),
            FakeProbe::Alive,
        );

        let reason = proxy.run().await.unwrap();

        assert_eq!(reason, ShutdownReason::QuitForwarded);
        assert_eq!(forwarder.forwarded.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_vanished_child_stops_the_loop_within_one_tick() {
        let bus = Arc::new(FakeBus::default());
        // One ordinary message so the child gets launched, then silence.
        bus.push_delivery(
            request(b"odoc", ReplyWait::Bounded(Duration::from_secs(1))),
            ReplySlot::detached(),
        );

        let proxy = proxy(
            Arc::clone(&bus),
            FakeLauncher::new(handle(1, 100)),
            FakeForwarder::default(),
            FakeProbe::Gone,
        );

        let reason = proxy.run().await.unwrap();

        assert_eq!(reason, ShutdownReason::ChildGone);
    }

    #[tokio::test(start_paused = true)]
    async fn a_launch_failure_aborts_the_loop() {
        let bus = Arc::new(FakeBus::default());
        bus.push_delivery(
            request(b"odoc", ReplyWait::NoReply),
            ReplySlot::detached(),
        );

        let proxy = proxy(
            Arc::clone(&bus),
            FakeLauncher::failing(),
            FakeForwarder::default(),
            FakeProbe::Alive,
        );

        match proxy.run().await {
            Err(err @ ProxyError::Launch(_)) => assert!(err.is_fatal()),
            other => panic!("expected a fatal launch error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn per_message_failures_do_not_stop_the_loop() {
        let bus = Arc::new(FakeBus::default());
        let forwarder = FakeForwarder::default();
        *forwarder.fail_with.lock().unwrap() = Some(ProxyError::ReplyTimeout);

        // The first forward fails and is dropped; the quit afterwards
        // still goes through and ends the loop.
        bus.push_delivery(
            request(b"odoc", ReplyWait::Bounded(Duration::from_secs(1))),
            ReplySlot::detached(),
        );
        bus.push_delivery(request(b"quit", ReplyWait::NoReply), ReplySlot::detached());

        let proxy = proxy(
            Arc::clone(&bus),
            FakeLauncher::new(handle(1, 100)),
            forwarder.clone(),
            FakeProbe::Alive,
        );

        let reason = proxy.run().await.unwrap();

        assert_eq!(reason, ShutdownReason::QuitForwarded);
        assert_eq!(forwarder.forwarded.lock().unwrap().len(), 1);
    }
}
