//! Launching the target program and resolving its bus handle.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use evtproxy_shared::constants::env as env_vars;
use evtproxy_shared::{Envelope, ProxyError, ProxyResult};
use tempfile::NamedTempFile;

use crate::bus::BusLayout;
use crate::process::ProcessHandle;

/// Attempts made to resolve the launched child's bus registration.
/// Registration happens in the child's own startup, so it races the spawn.
const RESOLVE_ATTEMPTS: u32 = 4;
/// Pause between resolution attempts.
const RESOLVE_PAUSE: Duration = Duration::from_secs(1);

/// Immutable description of the program to launch; set once at startup.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    executable: PathBuf,
}

impl LaunchSpec {
    /// Resolve a user-supplied path to a launchable program.
    pub fn resolve(path: &Path) -> ProxyResult<Self> {
        let executable = path.canonicalize().map_err(|e| {
            ProxyError::Launch(format!("could not find '{}': {}", path.display(), e))
        })?;

        let metadata = fs::metadata(&executable).map_err(|e| {
            ProxyError::Launch(format!("could not inspect '{}': {}", executable.display(), e))
        })?;
        if !metadata.is_file() {
            return Err(ProxyError::Launch(format!(
                "'{}' is not a launchable program",
                executable.display()
            )));
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(ProxyError::Launch(format!(
                    "'{}' is not executable",
                    executable.display()
                )));
            }
        }

        Ok(Self { executable })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

/// Capability to launch the child and produce its handle.
#[async_trait]
pub trait Launch: Send {
    async fn launch(&mut self, first: Option<&Envelope>) -> ProxyResult<ProcessHandle>;
}

/// Production launcher: spawns the target as a continuing child process
/// and polls the bus registry for its handle.
pub struct AppLauncher {
    spec: LaunchSpec,
    layout: BusLayout,
}

impl AppLauncher {
    pub fn new(spec: LaunchSpec, layout: BusLayout) -> Self {
        Self { spec, layout }
    }

    /// Coerce a first event into the startup-parameters representation: a
    /// file the child reads during startup, named by `EVTPROXY_STARTUP_EVENT`.
    fn coerce_startup_params(envelope: &Envelope) -> ProxyResult<tempfile::TempPath> {
        let bytes = envelope
            .encode()
            .map_err(|e| ProxyError::StartupParams(e.to_string()))?;

        let mut file = NamedTempFile::new().map_err(|e| {
            ProxyError::StartupParams(format!("could not create parameters file: {e}"))
        })?;
        file.write_all(&bytes).map_err(|e| {
            ProxyError::StartupParams(format!("could not write parameters file: {e}"))
        })?;
        Ok(file.into_temp_path())
    }

    async fn resolve_handle(layout: &BusLayout, pid: u32) -> ProxyResult<ProcessHandle> {
        for attempt in 1..=RESOLVE_ATTEMPTS {
            if let Some(reg) = layout.read_registration(pid) {
                tracing::debug!(pid, serial = %reg.serial, attempt, "launched child registered on the bus");
                return Ok(ProcessHandle::from(&reg));
            }
            if attempt < RESOLVE_ATTEMPTS {
                tokio::time::sleep(RESOLVE_PAUSE).await;
            }
        }
        Err(ProxyError::HandleUnresolved {
            pid,
            attempts: RESOLVE_ATTEMPTS,
        })
    }
}

#[async_trait]
impl Launch for AppLauncher {
    async fn launch(&mut self, first: Option<&Envelope>) -> ProxyResult<ProcessHandle> {
        // The guard releases the parameters file on every exit path once
        // handle resolution is over; the child reads it during startup.
        let params = first.map(Self::coerce_startup_params).transpose()?;

        let mut cmd = Command::new(self.spec.executable());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd.env(env_vars::BUS_DIR, self.layout.root());
        if let Some(path) = &params {
            cmd.env(env_vars::STARTUP_EVENT, path.as_os_str());
        }
        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            cmd.env("RUST_LOG", rust_log);
        }

        let mut child = cmd.spawn().map_err(|e| {
            ProxyError::Launch(format!(
                "could not start {}: {}",
                self.spec.executable().display(),
                e
            ))
        })?;
        let pid = child.id();
        tracing::debug!(pid, executable = %self.spec.executable().display(), "child spawned");

        // Reap the child when it exits so the liveness probe sees a
        // vanished pid rather than a zombie.
        std::thread::spawn(move || {
            let _ = child.wait();
        });

        Self::resolve_handle(&self.layout, pid).await
    }
}
