//! UDP notifications
//!
//! Every registered processor listens on a UDP port. Registry operations
//! collect `Notification`s in an outbox; `UdpNotifier` sends them once the
//! registry lock is released. Delivery is best effort.

use std::io::{self, ErrorKind};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use svar_types::notice::{Notification, NOTICE_LEN};

/// Sends notification datagrams to `host:port`
#[derive(Debug)]
pub struct UdpNotifier {
    socket: UdpSocket,
    host: IpAddr,
}

impl UdpNotifier {
    pub fn new(host: IpAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(host, 0))?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket, host })
    }

    pub fn send(&self, notice: &Notification) {
        if notice.port == 0 {
            return;
        }
        let to = SocketAddr::new(self.host, notice.port);
        match self.socket.send_to(&notice.encode(), to) {
            Ok(_) => debug!(%notice, "notification sent"),
            Err(e) => warn!(%notice, error = %e, "notification not sent"),
        }
    }

    pub fn send_all(&self, notices: &[Notification]) {
        for n in notices {
            self.send(n);
        }
    }
}

/// Receives notification datagrams on this process's port
#[derive(Debug)]
pub struct EventListener {
    socket: UdpSocket,
    port: u16,
}

impl EventListener {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        let port = socket.local_addr()?.port();
        Ok(Self { socket, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait up to `timeout` for the next well-formed notification.
    ///
    /// Malformed datagrams are logged and skipped.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification> {
        let deadline = Instant::now() + timeout.max(Duration::from_millis(1));
        let mut buf = [0u8; 64];
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return None;
            }
            if let Err(e) = self.socket.set_read_timeout(Some(left)) {
                warn!(error = %e, "set_read_timeout failed");
                return None;
            }
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => match Notification::decode(self.port, &buf[..len]) {
                    Ok(n) => {
                        debug!(notice = %n, %from, "notification received");
                        return Some(n);
                    }
                    Err(e) => {
                        warn!(%from, len, expected = NOTICE_LEN, error = %e, "dropping bad datagram");
                    }
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return None
                }
                Err(e) => {
                    warn!(error = %e, "notification receive failed");
                    return None;
                }
            }
        }
    }
}
