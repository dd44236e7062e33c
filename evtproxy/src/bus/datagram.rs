//! Unix-datagram bus backend.
//!
//! Each participant binds a datagram socket named by its serial inside the
//! bus directory and advertises it with a registration record. Replies to
//! a synchronous send travel over a per-send ephemeral socket, so inbound
//! traffic queued on the main socket is undisturbed while the single
//! thread blocks waiting for the reply.

use std::fs;
use std::os::unix::net::UnixDatagram as StdUnixDatagram;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use evtproxy_shared::{
    BusAddress, Envelope, ProcessSerial, ProxyError, ProxyResult, Registration, ReplyWait,
    SendPriority,
};
use tokio::net::UnixDatagram;

use super::layout::BusLayout;
use super::reply::{ReplySink, ReplySlot};
use super::{Delivery, MessageBus};
use crate::process::ProcessHandle;

/// Largest datagram accepted off the wire.
const MAX_DATAGRAM: usize = 64 * 1024;

/// A joined bus participant.
///
/// Dropping the bus removes its socket and registration record, so a
/// crashed-and-restarted proxy never leaves a stale identity behind.
pub struct DatagramBus {
    layout: BusLayout,
    socket: UnixDatagram,
    local: Registration,
}

impl DatagramBus {
    /// Join the bus: mint a serial, bind the socket, write the
    /// registration record. This is the handler-installation step; failure
    /// is a fatal setup error.
    pub fn join(layout: BusLayout) -> ProxyResult<Self> {
        layout.ensure()?;

        let pid = std::process::id();
        let serial = ProcessSerial(rand::random());
        let socket_path = layout.socket_path(serial);
        if socket_path.exists() {
            tracing::warn!(socket = %socket_path.display(), "removing stale bus socket");
            let _ = fs::remove_file(&socket_path);
        }

        let socket = UnixDatagram::bind(&socket_path).map_err(|e| {
            ProxyError::BusSetup(format!("could not bind {}: {}", socket_path.display(), e))
        })?;

        let local = Registration {
            serial,
            pid,
            socket: socket_path,
        };
        layout.write_registration(&local)?;
        tracing::debug!(serial = %serial, pid, "joined bus");

        Ok(Self {
            layout,
            socket,
            local,
        })
    }

    pub fn layout(&self) -> &BusLayout {
        &self.layout
    }

    pub fn local_registration(&self) -> &Registration {
        &self.local
    }

    async fn transmit(&self, envelope: &Envelope, target: &BusAddress) -> ProxyResult<()> {
        let bytes = envelope.encode()?;
        self.socket
            .send_to(&bytes, &target.socket)
            .await
            .map_err(|e| {
                ProxyError::Transport(format!(
                    "send to {} failed: {}",
                    target.socket.display(),
                    e
                ))
            })?;
        Ok(())
    }

    fn slot_for(&self, envelope: &Envelope) -> ReplySlot {
        let sink = match envelope.reply_to() {
            Ok(addr) => Some(Box::new(DatagramSink {
                target: addr.clone(),
            }) as Box<dyn ReplySink>),
            Err(ProxyError::MissingAttribute(_)) => None,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unusable reply target");
                None
            }
        };
        let wait = envelope.reply_wait().unwrap_or(ReplyWait::NoReply);
        ReplySlot::new(sink, wait)
    }
}

impl Drop for DatagramBus {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.local.socket);
        self.layout.remove_registration(self.local.pid);
    }
}

#[async_trait]
impl MessageBus for DatagramBus {
    async fn next_delivery(&self) -> ProxyResult<Delivery> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| ProxyError::Transport(format!("recv failed: {e}")))?;

        let envelope = Envelope::decode(&buf[..len])?;
        let reply = self.slot_for(&envelope);
        Ok(Delivery { envelope, reply })
    }

    fn address_of(&self, handle: &ProcessHandle) -> ProxyResult<BusAddress> {
        match self.layout.read_registration(handle.pid) {
            Some(reg) if reg.serial == handle.serial => Ok(reg.address()),
            _ => Err(ProxyError::UnknownDestination(handle.serial)),
        }
    }

    async fn send_and_wait(
        &self,
        mut envelope: Envelope,
        wait: ReplyWait,
        priority: SendPriority,
    ) -> ProxyResult<Option<Envelope>> {
        let target = envelope.target()?.clone();
        tracing::trace!(dest = %target.serial, ?wait, ?priority, "transmitting");

        if wait == ReplyWait::NoReply {
            self.transmit(&envelope, &target).await?;
            return Ok(None);
        }

        let channel = ReplyChannel::bind(&self.layout, self.local.serial)?;
        envelope.set_reply_to(BusAddress {
            serial: self.local.serial,
            socket: channel.path().to_path_buf(),
        });
        self.transmit(&envelope, &target).await?;

        let reply = match wait {
            ReplyWait::Bounded(limit) => tokio::time::timeout(limit, channel.recv())
                .await
                .map_err(|_| ProxyError::ReplyTimeout)??,
            _ => channel.recv().await?,
        };
        Ok(Some(reply))
    }
}

/// Ephemeral socket a single synchronous send waits for its reply on.
/// The socket file is removed on drop, early-error paths included.
struct ReplyChannel {
    socket: UnixDatagram,
    path: PathBuf,
}

impl ReplyChannel {
    fn bind(layout: &BusLayout, serial: ProcessSerial) -> ProxyResult<Self> {
        let path = layout.reply_socket_path(serial, rand::random());
        let socket = UnixDatagram::bind(&path).map_err(|e| {
            ProxyError::Transport(format!(
                "could not bind reply socket {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { socket, path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn recv(&self) -> ProxyResult<Envelope> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| ProxyError::Transport(format!("reply recv failed: {e}")))?;
        Envelope::decode(&buf[..len])
    }
}

impl Drop for ReplyChannel {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Sink that sends a reply datagram to the original sender's reply socket.
struct DatagramSink {
    target: BusAddress,
}

impl ReplySink for DatagramSink {
    fn deliver(&mut self, reply: &Envelope) -> ProxyResult<()> {
        let bytes = reply.encode()?;
        let socket = StdUnixDatagram::unbound()
            .map_err(|e| ProxyError::Transport(format!("could not open reply socket: {e}")))?;
        socket.send_to(&bytes, &self.target.socket).map_err(|e| {
            ProxyError::Transport(format!(
                "reply to {} failed: {}",
                self.target.socket.display(),
                e
            ))
        })?;
        Ok(())
    }
}
