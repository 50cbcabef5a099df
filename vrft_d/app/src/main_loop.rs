use crate::osc::parameters::ParameterRegistry;
use crate::osc::socket::OscSocket;
use crate::osc::transport::{build_messages, OscTransport};
use anyhow::Result;
use api::StopToken;
use common::TrackingStore;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

/// Fixed-rate pump from the tracking store to the OSC transport.
pub struct MainLoop<S: OscSocket> {
    store: Arc<TrackingStore>,
    registry: Arc<ParameterRegistry>,
    transport: OscTransport<S>,
    tick: Duration,
}

impl<S: OscSocket> MainLoop<S> {
    pub fn new(
        store: Arc<TrackingStore>,
        registry: Arc<ParameterRegistry>,
        transport: OscTransport<S>,
        tick: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            transport,
            tick,
        }
    }

    pub fn transport(&self) -> &OscTransport<S> {
        &self.transport
    }

    /// One tick. Returns the number of bundles sent.
    pub fn tick(&self) -> Result<usize> {
        let view = self.registry.view();
        if view.is_empty() {
            return Ok(0);
        }

        let data = self.store.snapshot();
        view.update(&data);
        let messages = build_messages(view.params());

        #[cfg(feature = "xtralog")]
        if !messages.is_empty() {
            log::debug!("{} of {} parameters changed", messages.len(), view.len());
        }

        self.transport.send_messages(messages)
    }

    /// Ticks until `stop` fires. Send failures are logged and the loop carries on.
    pub fn run(&self, stop: &StopToken) {
        info!(
            "Main loop running every {:?}, sending to {}",
            self.tick,
            self.transport.destination()
        );
        let mut failing = false;
        loop {
            match self.tick() {
                Ok(_) => failing = false,
                Err(e) => {
                    // Only the first error of a streak; the socket may be down for a while.
                    if !failing {
                        error!("OSC send failed: {:#}", e);
                    }
                    failing = true;
                }
            }
            if stop.wait_timeout(self.tick) {
                break;
            }
        }
        info!("Main loop stopped");
    }
}
