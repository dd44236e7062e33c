//! Filesystem layout of a bus directory.
//!
//! A bus is a directory holding one registration record and one datagram
//! socket per participant. The layout is the only place path shapes are
//! decided; launched children inherit the directory through the
//! `EVTPROXY_BUS_DIR` environment variable.

use std::fs;
use std::path::{Path, PathBuf};

use evtproxy_shared::constants::env as env_vars;
use evtproxy_shared::{ProcessSerial, ProxyError, ProxyResult, Registration};

#[derive(Clone, Debug)]
pub struct BusLayout {
    root: PathBuf,
}

impl BusLayout {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the bus directory from the environment: `EVTPROXY_BUS_DIR`
    /// if set, else `evtproxy/` under the user runtime directory, falling
    /// back to the system temp directory.
    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var(env_vars::BUS_DIR) {
            return Self::at(dir);
        }
        let base = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
        Self::at(base.join("evtproxy"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the bus directory if it does not exist yet.
    pub fn ensure(&self) -> ProxyResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            ProxyError::BusSetup(format!(
                "could not create bus directory {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    pub fn registration_path(&self, pid: u32) -> PathBuf {
        self.root.join(format!("{pid}.json"))
    }

    pub fn socket_path(&self, serial: ProcessSerial) -> PathBuf {
        self.root.join(format!("{serial}.sock"))
    }

    /// Path for the ephemeral socket a single synchronous send waits on.
    pub fn reply_socket_path(&self, serial: ProcessSerial, nonce: u64) -> PathBuf {
        self.root.join(format!("{serial}-reply-{nonce:016x}.sock"))
    }

    pub fn write_registration(&self, reg: &Registration) -> ProxyResult<()> {
        let bytes = serde_json::to_vec(reg)
            .map_err(|e| ProxyError::BusSetup(format!("could not encode registration: {e}")))?;
        fs::write(self.registration_path(reg.pid), bytes).map_err(|e| {
            ProxyError::BusSetup(format!("could not write registration for pid {}: {}", reg.pid, e))
        })
    }

    /// Read a participant's registration, if one exists.
    ///
    /// An unreadable or half-written record counts as "not registered yet";
    /// the launcher polls until a whole one appears.
    pub fn read_registration(&self, pid: u32) -> Option<Registration> {
        let path = self.registration_path(pid);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };
        match serde_json::from_slice(&bytes) {
            Ok(reg) => Some(reg),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring unreadable registration record"
                );
                None
            }
        }
    }

    pub fn remove_registration(&self, pid: u32) {
        let _ = fs::remove_file(self.registration_path(pid));
    }
}
