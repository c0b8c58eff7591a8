//! Process liveness probe

use std::io;
use svar_matching::Liveness;

/// Probes processes with `kill(pid, 0)`.
///
/// A process we may not signal (`EPERM`) still exists, so it counts as alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessProbe;

impl Liveness for ProcessProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        // SAFETY: signal 0 only checks for existence and permission
        if unsafe { libc::kill(pid, 0) } == 0 {
            return true;
        }
        io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}
