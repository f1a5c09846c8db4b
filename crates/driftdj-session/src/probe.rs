//! Internet reachability probe
//!
//! Used during connection recovery to tell "the network is down" apart
//! from "the service is down": after a transport loss the orchestrator
//! polls the probe until the network is back, and only then tries to
//! reopen the session.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

/// How often the orchestrator probes while waiting for the network
pub const PROBE_INTERVAL: Duration = Duration::from_secs(5);

pub trait ConnectivityProbe: Send {
    fn is_online(&mut self) -> bool;
}

/// Probes by opening a TCP connection to a well-known endpoint
///
/// Any completed handshake counts as online; nothing is sent.
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            timeout: Duration::from_secs(3),
        }
    }
}

impl ConnectivityProbe for TcpProbe {
    fn is_online(&mut self) -> bool {
        let addrs = match self.addr.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                // DNS failure is itself a strong offline signal
                debug!("Probe address resolution failed: {}", e);
                return false;
            }
        };
        for addr in addrs {
            if TcpStream::connect_timeout(&addr, self.timeout).is_ok() {
                return true;
            }
        }
        debug!("Probe to {} failed", self.addr);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_probe_reaches_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut probe = TcpProbe::new(&addr);
        assert!(probe.is_online());
    }

    #[test]
    fn test_probe_fails_on_unresolvable_host() {
        let mut probe = TcpProbe::new("definitely-not-a-real-host.invalid:443");
        assert!(!probe.is_online());
    }
}
