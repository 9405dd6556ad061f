//! Non-blocking UDP sender.
//!
//! Frames are fire-and-forget: a datagram the OS cannot queue right now is
//! dropped instead of stalling the caller's frame loop.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

use crate::error::DeviceError;
use crate::interface::transport::UdpTransport;

pub struct UdpSender {
    socket: UdpSocket,
    dropped: u64,
}

impl UdpSender {
    /// Binds an ephemeral local port matching the address family of `target`.
    pub fn bind_for(target: SocketAddr) -> Result<Self, DeviceError> {
        let local = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(local)
            .map_err(|e| DeviceError::Transport(format!("Failed to bind socket: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| DeviceError::Transport(format!("Failed to set socket mode: {e}")))?;

        Ok(Self { socket, dropped: 0 })
    }

    /// Number of datagrams dropped because the socket buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl UdpTransport for UdpSender {
    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> Result<(), DeviceError> {
        match self.socket.send_to(data, addr) {
            Ok(_) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                self.dropped += 1;
                log::warn!(addr:display = addr, dropped = self.dropped; "UDP send buffer full, frame dropped");
                Ok(())
            }
            Err(e) => Err(DeviceError::Transport(format!(
                "Failed to send UDP packet to {addr}: {e}"
            ))),
        }
    }
}
