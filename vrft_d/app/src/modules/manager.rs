//! Owns bound modules and their worker threads.
//!
//! `start` and `teardown` are serialized through the pass lock, so at most one
//! discovery pass runs at a time and a new pass never overlaps a teardown.

use super::ModuleDiscovery;
use crate::status::StatusAggregate;
use anyhow::{Context, Result};
use api::{Channel, Channels, ModuleState, StopToken, TrackingModule, TrackingSink};
use log::{error, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub type ModuleId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BoundModule {
    pub(crate) id: ModuleId,
    pub(crate) name: String,
}

/// A running module. The instance itself lives on the worker thread and comes
/// back through the join handle once the run loop exits.
pub(crate) struct Worker {
    pub(crate) name: String,
    pub(crate) channels: Channels,
    pub(crate) stop: StopToken,
    pub(crate) handle: JoinHandle<Box<dyn TrackingModule>>,
}

#[derive(Default)]
pub(crate) struct BindingState {
    pub(crate) eye_owner: Option<BoundModule>,
    pub(crate) lip_owner: Option<BoundModule>,
    pub(crate) workers: BTreeMap<ModuleId, Worker>,
}

impl BindingState {
    pub(crate) fn owner(&self, channel: Channel) -> Option<&BoundModule> {
        match channel {
            Channel::Eye => self.eye_owner.as_ref(),
            Channel::Lip => self.lip_owner.as_ref(),
        }
    }

    pub(crate) fn open_channels(&self) -> Channels {
        Channels::new(self.eye_owner.is_none(), self.lip_owner.is_none())
    }
}

/// State shared between the manager handle and its discovery thread.
pub(crate) struct ManagerShared {
    pub(crate) discovery: ModuleDiscovery,
    pub(crate) status: Arc<StatusAggregate>,
    pub(crate) sink: Arc<dyn TrackingSink>,
    pub(crate) frame_interval: Duration,
    pub(crate) bindings: Mutex<BindingState>,
    pub(crate) next_id: AtomicU64,
}

impl ManagerShared {
    pub(crate) fn lock_bindings(&self) -> MutexGuard<'_, BindingState> {
        match self.bindings.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stops and joins every worker. The registry is taken out of the lock
    /// first so nothing else can touch it while we iterate.
    fn teardown_workers(&self) {
        let workers = {
            let mut state = self.lock_bindings();
            state.eye_owner = None;
            state.lip_owner = None;
            std::mem::take(&mut state.workers)
        };

        if workers.is_empty() {
            return;
        }
        info!("Tearing down {} module worker(s)", workers.len());

        for (_, worker) in workers {
            if worker.channels.eye {
                self.status.set_eye(ModuleState::Idle);
            }
            if worker.channels.lip {
                self.status.set_lip(ModuleState::Idle);
            }

            worker.stop.stop();
            match worker.handle.join() {
                Ok(mut module) => {
                    module.teardown();
                    info!("✓ Module {} torn down", worker.name);
                }
                Err(_) => error!("✗ Worker thread for module {} panicked", worker.name),
            }
        }
    }
}

struct DiscoveryPass {
    stop: StopToken,
    handle: JoinHandle<()>,
}

impl DiscoveryPass {
    fn join(self) {
        if self.handle.join().is_err() {
            error!("Module discovery thread panicked");
        }
    }

    fn cancel(self) {
        self.stop.stop();
        self.join();
    }
}

/// Snapshot of the current channel owners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BindingSnapshot {
    pub eye: Option<String>,
    pub lip: Option<String>,
    pub workers: usize,
}

pub struct ModuleManager {
    shared: Arc<ManagerShared>,
    pass: Mutex<Option<DiscoveryPass>>,
}

impl ModuleManager {
    pub fn new(
        discovery: ModuleDiscovery,
        status: Arc<StatusAggregate>,
        sink: Arc<dyn TrackingSink>,
        frame_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                discovery,
                status,
                sink,
                frame_interval,
                bindings: Mutex::new(BindingState::default()),
                next_id: AtomicU64::new(1),
            }),
            pass: Mutex::new(None),
        }
    }

    pub fn status(&self) -> &Arc<StatusAggregate> {
        &self.shared.status
    }

    fn lock_pass(&self) -> MutexGuard<'_, Option<DiscoveryPass>> {
        match self.pass.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Cancels any running pass, tears down current workers and starts a new
    /// discovery pass in the background. Returns as soon as the pass is spawned.
    pub fn start(&self, requested: Channels) -> Result<()> {
        let mut pass = self.lock_pass();
        if let Some(previous) = pass.take() {
            info!("Cancelling in-flight module discovery");
            previous.cancel();
        }
        self.shared.teardown_workers();

        let stop = StopToken::new();
        let pass_stop = stop.clone();
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("module-discovery".into())
            .spawn(move || shared.run_pass(requested, &pass_stop))
            .context("Failed to spawn module discovery thread")?;

        *pass = Some(DiscoveryPass { stop, handle });
        Ok(())
    }

    /// Blocks until the current discovery pass, if any, has finished.
    pub fn wait_for_discovery(&self) {
        if let Some(pass) = self.lock_pass().take() {
            pass.join();
        }
    }

    /// Cancels discovery and stops every module. Safe to call repeatedly.
    pub fn teardown(&self) {
        let mut pass = self.lock_pass();
        if let Some(pass) = pass.take() {
            info!("Cancelling in-flight module discovery");
            pass.cancel();
        }
        self.shared.teardown_workers();
    }

    pub fn bindings(&self) -> BindingSnapshot {
        let state = self.shared.lock_bindings();
        BindingSnapshot {
            eye: state.owner(Channel::Eye).map(|m| m.name.clone()),
            lip: state.owner(Channel::Lip).map(|m| m.name.clone()),
            workers: state.workers.len(),
        }
    }

    /// True when both slots are held by the same instance.
    pub fn shares_owner(&self) -> bool {
        let state = self.shared.lock_bindings();
        match (&state.eye_owner, &state.lip_owner) {
            (Some(eye), Some(lip)) => eye.id == lip.id,
            _ => false,
        }
    }
}

impl Drop for ModuleManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
