//! Child liveness supervision.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use super::{ProxyState, ShutdownReason};

/// Outcome of one liveness probe.
#[derive(Debug)]
pub enum ProbeOutcome {
    Alive,
    Gone,
    /// The probe itself failed; the process may well still be there.
    Undetermined(std::io::Error),
}

/// Non-destructive liveness check of a process id.
pub trait LivenessProbe: Send {
    fn probe(&self, pid: u32) -> ProbeOutcome;
}

/// Probes by sending signal 0: delivery is never attempted, but the OS
/// reports whether the pid still names a live process.
pub struct KillProbe;

impl LivenessProbe for KillProbe {
    fn probe(&self, pid: u32) -> ProbeOutcome {
        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => ProbeOutcome::Alive,
            Err(Errno::ESRCH) => ProbeOutcome::Gone,
            Err(errno) => {
                ProbeOutcome::Undetermined(std::io::Error::from_raw_os_error(errno as i32))
            }
        }
    }
}

/// Periodic liveness supervision of the launched child.
pub struct Supervisor<P> {
    probe: P,
}

impl<P: LivenessProbe> Supervisor<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    /// Run one liveness check.
    ///
    /// Only a definite "no such process" terminates the loop; an ambiguous
    /// probe result is logged and the child assumed alive.
    pub fn check(&self, state: &mut ProxyState) {
        let Some(child) = state.child() else {
            return;
        };

        match self.probe.probe(child.pid) {
            ProbeOutcome::Alive => {}
            ProbeOutcome::Gone => {
                tracing::debug!(pid = child.pid, "child process is gone");
                state.request_shutdown(ShutdownReason::ChildGone);
            }
            ProbeOutcome::Undetermined(e) => {
                tracing::warn!(
                    pid = child.pid,
                    error = %e,
                    "liveness probe failed; assuming the child is alive"
                );
            }
        }
    }
}
