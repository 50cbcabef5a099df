//! Combined eye/lip module state with change notifications.

use api::{Channel, ModuleState};
use log::info;
use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModuleStatus {
    pub eye: ModuleState,
    pub lip: ModuleState,
}

impl ModuleStatus {
    pub fn get(&self, channel: Channel) -> ModuleState {
        match channel {
            Channel::Eye => self.eye,
            Channel::Lip => self.lip,
        }
    }
}

#[derive(Default)]
struct Inner {
    status: ModuleStatus,
    subscribers: Vec<Sender<ModuleStatus>>,
}

/// Both channel states live behind one lock, and every write publishes the
/// pair while still holding it, so subscribers never see a torn pair.
#[derive(Default)]
pub struct StatusAggregate {
    inner: Mutex<Inner>,
}

impl StatusAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self) -> ModuleStatus {
        self.lock().status
    }

    pub fn eye(&self) -> ModuleState {
        self.get().eye
    }

    pub fn lip(&self) -> ModuleState {
        self.get().lip
    }

    pub fn set(&self, channel: Channel, state: ModuleState) {
        self.update(|status| match channel {
            Channel::Eye => status.eye = state,
            Channel::Lip => status.lip = state,
        });
    }

    pub fn set_eye(&self, state: ModuleState) {
        self.set(Channel::Eye, state);
    }

    pub fn set_lip(&self, state: ModuleState) {
        self.set(Channel::Lip, state);
    }

    pub fn set_both(&self, eye: ModuleState, lip: ModuleState) {
        self.update(|status| {
            status.eye = eye;
            status.lip = lip;
        });
    }

    /// Receives one [`ModuleStatus`] per write from now on.
    pub fn subscribe(&self) -> Receiver<ModuleStatus> {
        let (tx, rx) = channel();
        self.lock().subscribers.push(tx);
        rx
    }

    fn update(&self, apply: impl FnOnce(&mut ModuleStatus)) {
        let mut inner = self.lock();
        apply(&mut inner.status);
        let status = inner.status;
        inner.subscribers.retain(|tx| tx.send(status).is_ok());
    }
}

/// Logs every combined state change until the aggregate is dropped.
pub fn spawn_status_logger(
    rx: Receiver<ModuleStatus>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("status-log".into())
        .spawn(move || {
            let mut last = None;
            while let Ok(status) = rx.recv() {
                if last != Some(status) {
                    info!("Module status: eye={:?} lip={:?}", status.eye, status.lip);
                    last = Some(status);
                }
            }
        })
}
