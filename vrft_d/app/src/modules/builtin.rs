//! Modules compiled into the daemon.

use super::ModuleDescriptor;
use anyhow::{Context, Result};
use api::{Channels, ModuleLogger, TrackingModule, UnifiedTrackingData};
use common::Config;
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::Duration;

/// Built-in descriptors in the order they are offered to the binding pass.
pub fn descriptors(config: &Config) -> Vec<ModuleDescriptor> {
    let mut builtins = Vec::new();
    if let Some(port) = config.modules.udp_source_port {
        builtins.push(ModuleDescriptor::builtin(UdpJsonModule::NAME, move || {
            Ok(Box::new(UdpJsonModule::new(port)) as Box<dyn TrackingModule>)
        }));
    }
    builtins
}

/// Receives whole `UnifiedTrackingData` frames as JSON datagrams, e.g. from
/// another vrft_d instance or a bridge script. Serves both channels.
pub struct UdpJsonModule {
    port: u16,
    socket: Option<UdpSocket>,
    buf: Vec<u8>,
    logger: Option<ModuleLogger>,
}

impl UdpJsonModule {
    pub const NAME: &'static str = "udp_json";

    pub fn new(port: u16) -> Self {
        Self {
            port,
            socket: None,
            buf: vec![0u8; 65535],
            logger: None,
        }
    }

    pub fn local_port(&self) -> Option<u16> {
        self.socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map(|a| a.port())
    }
}

impl TrackingModule for UdpJsonModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports(&self) -> Channels {
        Channels::BOTH
    }

    fn initialize(&mut self, requested: Channels, logger: ModuleLogger) -> Result<Channels> {
        let socket = UdpSocket::bind(("0.0.0.0", self.port))
            .with_context(|| format!("Failed to bind UDP source on port {}", self.port))?;
        socket
            .set_read_timeout(Some(Duration::from_millis(100)))
            .context("Failed to set read timeout")?;
        logger.info(&format!("Listening for tracking frames on port {}", self.port));

        self.socket = Some(socket);
        self.logger = Some(logger);
        Ok(requested)
    }

    fn update(&mut self, data: &mut UnifiedTrackingData) -> Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("UDP source not initialized"))?;

        let (size, src) = match socket.recv_from(&mut self.buf) {
            Ok(received) => received,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                return Ok(());
            }
            Err(e) => return Err(e).context("UDP source receive failed"),
        };

        match serde_json::from_slice::<UnifiedTrackingData>(&self.buf[..size]) {
            Ok(frame) => *data = frame,
            Err(e) => {
                if let Some(logger) = &self.logger {
                    logger.debug(&format!("Ignoring malformed frame from {}: {}", src, e));
                }
            }
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.socket = None;
        if let Some(logger) = &self.logger {
            logger.info("UDP source closed");
        }
    }
}
