//! Avatar configuration events and the worker that applies them.

use crate::osc::parameters::{AvatarParameters, ParamType, ParameterRegistry};
use anyhow::{Context, Result};
use api::StopToken;
use common::TrackingStore;
use log::info;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEvent {
    /// The active avatar and every parameter address it exposes.
    Loaded(AvatarParameters),
    Unloaded,
}

/// Recomputes the relevant view for the event and restarts pupil calibration.
pub fn apply(event: ConfigEvent, registry: &ParameterRegistry, store: &TrackingStore) {
    match event {
        ConfigEvent::Loaded(params) => {
            registry.reload(&params);
        }
        ConfigEvent::Unloaded => registry.clear(),
    }
    store.reset_thresholds();
}

pub fn spawn_reload_worker(
    events: Receiver<ConfigEvent>,
    registry: Arc<ParameterRegistry>,
    store: Arc<TrackingStore>,
    stop: StopToken,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("config-reload".into())
        .spawn(move || {
            while !stop.is_stopped() {
                match events.recv_timeout(Duration::from_millis(250)) {
                    Ok(event) => apply(event, &registry, &store),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("Config reload worker exiting");
        })
        .context("Failed to spawn config reload thread")
}

/// Configured addresses, all treated as floats.
pub fn static_parameters(addresses: &[String]) -> AvatarParameters {
    addresses
        .iter()
        .map(|addr| (addr.clone(), ParamType::Float))
        .collect()
}
