//! In-process fakes for the bus, launcher, forwarder, and liveness probe.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use evtproxy_shared::constants::events;
use evtproxy_shared::{
    BusAddress, Envelope, EventIdentity, FourCc, ProcessSerial, ProxyError, ProxyResult,
    ReplyWait, SendPriority,
};

use crate::bus::{Delivery, MessageBus, ReplySink, ReplySlot};
use crate::launch::Launch;
use crate::process::ProcessHandle;
use crate::proxy::{Forward, LivenessProbe, ProbeOutcome};

pub(crate) fn handle(serial: u64, pid: u32) -> ProcessHandle {
    ProcessHandle {
        serial: ProcessSerial(serial),
        pid,
    }
}

/// A core-class request with the given event id and declared wait.
pub(crate) fn request(id: &[u8; 4], wait: ReplyWait) -> Envelope {
    Envelope::request(
        EventIdentity::new(events::CORE_CLASS, FourCc::new(*id)),
        wait,
        b"payload".to_vec(),
    )
}

/// Sink that records everything delivered through it.
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    pub delivered: Arc<Mutex<Vec<Envelope>>>,
}

impl ReplySink for RecordingSink {
    fn deliver(&mut self, reply: &Envelope) -> ProxyResult<()> {
        self.delivered.lock().unwrap().push(reply.clone());
        Ok(())
    }
}

/// One recorded transmission.
pub(crate) struct SentRecord {
    pub envelope: Envelope,
    pub wait: ReplyWait,
    pub priority: SendPriority,
}

/// In-memory bus: queued deliveries in, recorded transmissions out.
#[derive(Default)]
pub(crate) struct FakeBus {
    pub deliveries: Mutex<VecDeque<Delivery>>,
    pub sent: Mutex<Vec<SentRecord>>,
    pub reply_with: Mutex<Option<Envelope>>,
    pub known: Mutex<Vec<(ProcessHandle, BusAddress)>>,
}

impl FakeBus {
    /// Register a destination so `address_of` can resolve it.
    pub fn admit(&self, handle: ProcessHandle) {
        let address = BusAddress {
            serial: handle.serial,
            socket: format!("/tmp/fake-{}.sock", handle.serial).into(),
        };
        self.known.lock().unwrap().push((handle, address));
    }

    pub fn push_delivery(&self, envelope: Envelope, reply: ReplySlot) {
        self.deliveries
            .lock()
            .unwrap()
            .push_back(Delivery { envelope, reply });
    }
}

#[async_trait]
impl MessageBus for FakeBus {
    async fn next_delivery(&self) -> ProxyResult<Delivery> {
        if let Some(delivery) = self.deliveries.lock().unwrap().pop_front() {
            return Ok(delivery);
        }
        // Nothing queued: behave like an idle interception stream.
        std::future::pending().await
    }

    fn address_of(&self, handle: &ProcessHandle) -> ProxyResult<BusAddress> {
        self.known
            .lock()
            .unwrap()
            .iter()
            .find(|(known, _)| known == handle)
            .map(|(_, address)| address.clone())
            .ok_or(ProxyError::UnknownDestination(handle.serial))
    }

    async fn send_and_wait(
        &self,
        envelope: Envelope,
        wait: ReplyWait,
        priority: SendPriority,
    ) -> ProxyResult<Option<Envelope>> {
        self.sent.lock().unwrap().push(SentRecord {
            envelope,
            wait,
            priority,
        });
        if wait == ReplyWait::NoReply {
            return Ok(None);
        }
        Ok(self.reply_with.lock().unwrap().clone())
    }
}

/// Launcher that counts invocations and hands out a fixed handle.
#[derive(Clone)]
pub(crate) struct FakeLauncher {
    handle: Option<ProcessHandle>,
    pub calls: Arc<Mutex<u32>>,
    pub first_seen: Arc<Mutex<Vec<Option<Envelope>>>>,
}

impl FakeLauncher {
    pub fn new(handle: ProcessHandle) -> Self {
        Self {
            handle: Some(handle),
            calls: Arc::new(Mutex::new(0)),
            first_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            handle: None,
            calls: Arc::new(Mutex::new(0)),
            first_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Launch for FakeLauncher {
    async fn launch(&mut self, first: Option<&Envelope>) -> ProxyResult<ProcessHandle> {
        *self.calls.lock().unwrap() += 1;
        self.first_seen.lock().unwrap().push(first.cloned());
        self.handle
            .ok_or_else(|| ProxyError::Launch("refused by fake".into()))
    }
}

/// Forwarder that records forwarded envelopes; fails once when told to.
#[derive(Clone, Default)]
pub(crate) struct FakeForwarder {
    pub forwarded: Arc<Mutex<Vec<Envelope>>>,
    pub fail_with: Arc<Mutex<Option<ProxyError>>>,
}

#[async_trait]
impl Forward for FakeForwarder {
    async fn forward(
        &mut self,
        envelope: &Envelope,
        _reply: &mut ReplySlot,
        _dest: &ProcessHandle,
    ) -> ProxyResult<()> {
        if let Some(e) = self.fail_with.lock().unwrap().take() {
            return Err(e);
        }
        self.forwarded.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// Probe with a scripted outcome. `Refuse` panics, for asserting that no
/// probe happens at all.
pub(crate) enum FakeProbe {
    Alive,
    Gone,
    Undetermined,
    Refuse,
}

impl LivenessProbe for FakeProbe {
    fn probe(&self, _pid: u32) -> ProbeOutcome {
        match self {
            FakeProbe::Alive => ProbeOutcome::Alive,
            FakeProbe::Gone => ProbeOutcome::Gone,
            FakeProbe::Undetermined => ProbeOutcome::Undetermined(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "operation not permitted",
            )),
            FakeProbe::Refuse => panic!("probe must not run without a child"),
        }
    }
}
