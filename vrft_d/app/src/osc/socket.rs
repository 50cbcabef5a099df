use anyhow::{anyhow, Context, Result};
use log::{error, info};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Datagram endpoint the transport and listener talk through.
pub trait OscSocket: Send + Sync {
    fn send(&self, bytes: &[u8], destination: &str) -> Result<()>;

    /// Reads one datagram. `Ok(None)` means the read timed out.
    fn receive(&self, buf: &mut [u8]) -> Result<Option<usize>>;
}

impl<S: OscSocket + ?Sized> OscSocket for Arc<S> {
    fn send(&self, bytes: &[u8], destination: &str) -> Result<()> {
        (**self).send(bytes, destination)
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        (**self).receive(buf)
    }
}

/// `std::net::UdpSocket` backed socket. A failed send drops the socket and the
/// next call binds a fresh one.
pub struct UdpOscSocket {
    bind_addr: String,
    read_timeout: Option<Duration>,
    socket: Mutex<Option<UdpSocket>>,
}

impl UdpOscSocket {
    /// Socket on an ephemeral port, for sending.
    pub fn sender() -> Result<Self> {
        Self::bind("0.0.0.0:0", None)
    }

    /// Socket on a fixed port with a read timeout, for listening.
    pub fn listener(port: u16, read_timeout: Duration) -> Result<Self> {
        Self::bind(&format!("0.0.0.0:{}", port), Some(read_timeout))
    }

    pub fn bind(bind_addr: &str, read_timeout: Option<Duration>) -> Result<Self> {
        let socket = Self::open(bind_addr, read_timeout)?;
        Ok(Self {
            bind_addr: bind_addr.to_string(),
            read_timeout,
            socket: Mutex::new(Some(socket)),
        })
    }

    pub fn local_port(&self) -> Option<u16> {
        let guard = self.socket.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map(|a| a.port())
    }

    fn open(bind_addr: &str, read_timeout: Option<Duration>) -> Result<UdpSocket> {
        let socket = UdpSocket::bind(bind_addr)
            .with_context(|| format!("Failed to bind OSC socket on {}", bind_addr))?;
        socket.set_read_timeout(read_timeout)?;
        Ok(socket)
    }
}

impl OscSocket for UdpOscSocket {
    fn send(&self, bytes: &[u8], destination: &str) -> Result<()> {
        let mut guard = self.socket.lock().unwrap_or_else(PoisonError::into_inner);

        if guard.is_none() {
            *guard = Some(Self::open(&self.bind_addr, self.read_timeout)?);
            info!("Re-bound OSC socket successfully.");
        }

        let socket = guard
            .as_ref()
            .ok_or_else(|| anyhow!("OSC socket not available"))?;

        match socket.send_to(bytes, destination) {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(
                    "Failed to send OSC packet: {}. Attempting to reconnect...",
                    e
                );
                *guard = None;
                Err(anyhow!("OSC send to {} failed: {}", destination, e))
            }
        }
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        // Cloned handle so a blocking read does not hold the lock against senders.
        let socket = {
            let guard = self.socket.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_ref() {
                Some(s) => s.try_clone()?,
                None => return Err(anyhow!("OSC socket not available")),
            }
        };

        match socket.recv_from(buf) {
            Ok((size, _addr)) => Ok(Some(size)),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
