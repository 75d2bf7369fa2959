// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OS-level liveness probes.
//!
//! Pid liveness uses signal 0 and is never cached. Port occupancy uses a
//! loopback bind probe whose result is cached for a short window, because
//! a range scan during claim may probe hundreds of ports.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Whether a process with this pid is currently alive.
///
/// EPERM counts as alive: the process exists, we just may not signal it.
pub fn pid_alive(pid: i64) -> bool {
    if pid <= 0 || pid > i32::MAX as i64 {
        return false;
    }
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Bind-probe cache for "is something LISTENing on this port".
pub struct PortProbe {
    ttl: Duration,
    cache: Mutex<HashMap<u16, (bool, Instant)>>,
}

impl PortProbe {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the OS reports the port as occupied on loopback.
    ///
    /// Results are cached for the configured TTL; a fresh probe binds and
    /// immediately drops a listener. Errors other than AddrInUse are treated
    /// as occupied so the search keeps moving instead of fighting the OS.
    pub fn is_busy(&self, port: u16) -> bool {
        let now = Instant::now();
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(&(busy, at)) = cache.get(&port) {
                if now.duration_since(at) < self.ttl {
                    return busy;
                }
            }
        }

        let busy = match std::net::TcpListener::bind(("127.0.0.1", port)) {
            Ok(listener) => {
                drop(listener);
                false
            }
            Err(_) => true,
        };

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(port, (busy, now));
        busy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_alive() {
        assert!(pid_alive(std::process::id() as i64));
    }

    #[test]
    fn nonsense_pids_are_dead() {
        assert!(!pid_alive(0));
        assert!(!pid_alive(-5));
        assert!(!pid_alive(i64::MAX));
    }

    #[test]
    fn bound_port_reports_busy() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = PortProbe::new(Duration::from_secs(2));
        assert!(probe.is_busy(port));
        drop(listener);
        // Cached result persists until the TTL lapses.
        assert!(probe.is_busy(port));
    }

    #[test]
    fn free_port_reports_free() {
        // Grab an ephemeral port, release it, probe with a zero TTL cache.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let probe = PortProbe::new(Duration::from_millis(0));
        assert!(!probe.is_busy(port));
    }
}
