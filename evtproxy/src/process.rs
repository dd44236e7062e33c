//! Identity of the launched child.

use evtproxy_shared::{ProcessSerial, Registration};

/// Durable identity of the launched child: bus serial plus OS pid.
///
/// Created exactly once by the launcher and read-only afterwards: the
/// forwarder addresses sends with it, the supervisor probes its pid. Once
/// the child is confirmed dead the handle is invalid and must not be used
/// again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessHandle {
    pub serial: ProcessSerial,
    pub pid: u32,
}

impl From<&Registration> for ProcessHandle {
    fn from(reg: &Registration) -> Self {
        Self {
            serial: reg.serial,
            pid: reg.pid,
        }
    }
}
