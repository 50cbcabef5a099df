//! Assigns at most one module to each channel, in discovery order.

use super::manager::{BoundModule, ManagerShared, ModuleId, Worker};
use super::{module_logger, ModuleDescriptor};
use api::{Channel, Channels, ModuleContext, ModuleState, StopToken, TrackingModule};
use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::thread;

impl ManagerShared {
    /// One discovery + binding pass. Runs on the discovery thread.
    pub(crate) fn run_pass(&self, requested: Channels, stop: &StopToken) {
        // Status is reset once per pass; after this a channel only changes when
        // it is bound, demoted or torn down.
        self.status
            .set_both(ModuleState::Uninitialized, ModuleState::Uninitialized);

        info!(
            "Discovering tracking modules (eye: {}, lip: {})",
            requested.eye, requested.lip
        );
        let candidates = self.discovery.discover();
        if stop.is_stopped() {
            info!("Module discovery cancelled");
            return;
        }

        let bound = self.bind_candidates(&candidates, requested, stop);
        if stop.is_stopped() {
            info!("Module discovery cancelled");
            return;
        }

        if requested.eye && !bound.eye {
            warn!("No eye tracking module could be initialized; continuing without eye tracking");
        }
        if requested.lip && !bound.lip {
            warn!("No lip tracking module could be initialized; continuing without lip tracking");
        }
        info!("Module discovery finished");
    }

    /// Walks `candidates` until both slots are filled or the list is exhausted.
    /// Returns the channels that ended up bound.
    pub(crate) fn bind_candidates(
        &self,
        candidates: &[ModuleDescriptor],
        requested: Channels,
        stop: &StopToken,
    ) -> Channels {
        for descriptor in candidates {
            if stop.is_stopped() {
                break;
            }

            self.try_bind(descriptor, requested);

            if !self.lock_bindings().open_channels().any() {
                debug!("Eye and lip are both bound; skipping remaining candidates");
                break;
            }
        }

        let open = self.lock_bindings().open_channels();
        Channels::new(!open.eye, !open.lip)
    }

    fn try_bind(&self, descriptor: &ModuleDescriptor, requested: Channels) {
        let name = descriptor.name();
        let mut module = match descriptor.instantiate() {
            Ok(module) => module,
            Err(e) => {
                error!("✗ Failed to create module {}: {:#}", name, e);
                return;
            }
        };

        let supports = module.supports();
        let open = self.lock_bindings().open_channels();
        if !supports.intersect(open).any() {
            debug!(
                "Skipping module {}: supports {:?}, free channels {:?}",
                name, supports, open
            );
            return;
        }

        info!("Initializing module {}...", name);
        let reported = match module.initialize(requested, module_logger(name)) {
            Ok(channels) => channels,
            Err(e) => {
                warn!("✗ Module {} failed to initialize: {:#}", name, e);
                Channels::NONE
            }
        };

        let mut guard = self.lock_bindings();
        let claim = requested
            .intersect(supports)
            .intersect(reported)
            .intersect(guard.open_channels());

        if !claim.any() {
            drop(guard);
            info!("Module {} did not provide any free channel", name);
            module.teardown();
            return;
        }

        let state = &mut *guard;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // Claim the channels before the worker exists so a worker that dies
        // immediately demotes an `Active` status rather than being overwritten by it.
        let bound = BoundModule {
            id,
            name: name.to_string(),
        };
        if claim.eye {
            state.eye_owner = Some(bound.clone());
            self.status.set_eye(ModuleState::Active);
        }
        if claim.lip {
            state.lip_owner = Some(bound);
            self.status.set_lip(ModuleState::Active);
        }

        match self.spawn_worker(id, name, module, claim) {
            Ok(worker) => {
                // Ids are never reused, so each instance gets exactly one worker.
                state.workers.insert(id, worker);
                info!(
                    "✓ Module {} bound (eye: {}, lip: {})",
                    name, claim.eye, claim.lip
                );
            }
            Err(e) => {
                error!("✗ Failed to start worker for module {}: {}", name, e);
                if claim.eye {
                    state.eye_owner = None;
                    self.status.set_eye(ModuleState::Uninitialized);
                }
                if claim.lip {
                    state.lip_owner = None;
                    self.status.set_lip(ModuleState::Uninitialized);
                }
            }
        }
    }

    fn spawn_worker(
        &self,
        id: ModuleId,
        name: &str,
        mut module: Box<dyn TrackingModule>,
        channels: Channels,
    ) -> std::io::Result<Worker> {
        let stop = StopToken::new();
        let ctx = ModuleContext::new(
            stop.clone(),
            self.sink.clone(),
            channels,
            self.frame_interval,
        );
        let status = self.status.clone();
        let worker_name = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("module-{}", id))
            .spawn(move || {
                debug!("Module worker started: {}", worker_name);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| module.run(&ctx)));

                if ctx.should_stop() {
                    match outcome {
                        Ok(Ok(())) => debug!("Module worker exited: {}", worker_name),
                        Ok(Err(e)) => {
                            warn!("Module {} errored while stopping: {:#}", worker_name, e)
                        }
                        Err(_) => error!("✗ Module {} panicked while stopping", worker_name),
                    }
                    return module;
                }

                match outcome {
                    Ok(Ok(())) => {
                        error!("✗ Module {} exited without being stopped", worker_name)
                    }
                    Ok(Err(e)) => error!("✗ Module {} failed: {:#}", worker_name, e),
                    Err(_) => error!("✗ Module {} panicked", worker_name),
                }
                for channel in [Channel::Eye, Channel::Lip] {
                    if channels.contains(channel) {
                        status.set(channel, ModuleState::Idle);
                    }
                }
                module
            })?;

        Ok(Worker {
            name: name.to_string(),
            channels,
            stop,
            handle,
        })
    }
}
