//! Shared fixtures for the daemon integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use api::{Channels, ModuleContext, ModuleLogger, TrackingModule};
use common::{TrackingStore, UnifiedTrackingData};
use rosc::OscPacket;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use vrft_d::modules::{ModuleDescriptor, ModuleDiscovery, ModuleManager};
use vrft_d::osc::OscSocket;
use vrft_d::StatusAggregate;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// How a mock behaves once its worker is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunBehavior {
    /// Publishes frames until stopped.
    Track,
    Fail,
    Panic,
    /// Returns `Ok` straight away without being asked to stop.
    Exit,
}

#[derive(Debug, Default)]
pub struct MockStats {
    pub created: AtomicUsize,
    pub initialized: AtomicUsize,
    pub updates: AtomicUsize,
    pub torn_down: AtomicUsize,
}

impl MockStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn torn_down(&self) -> usize {
        self.torn_down.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct MockPlan {
    pub name: String,
    pub supports: Channels,
    /// `None` makes `initialize` fail.
    pub reports: Option<Channels>,
    pub behavior: RunBehavior,
    pub init_delay: Duration,
    pub stats: Arc<MockStats>,
}

impl MockPlan {
    pub fn new(name: &str, supports: Channels) -> Self {
        Self {
            name: name.to_string(),
            supports,
            reports: Some(supports),
            behavior: RunBehavior::Track,
            init_delay: Duration::ZERO,
            stats: Arc::new(MockStats::default()),
        }
    }

    pub fn reports(mut self, reports: Option<Channels>) -> Self {
        self.reports = reports;
        self
    }

    pub fn behavior(mut self, behavior: RunBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn descriptor(&self) -> ModuleDescriptor {
        let plan = self.clone();
        ModuleDescriptor::builtin(self.name.clone(), move || {
            plan.stats.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockModule { plan: plan.clone() }) as Box<dyn TrackingModule>)
        })
    }
}

pub struct MockModule {
    plan: MockPlan,
}

impl TrackingModule for MockModule {
    fn name(&self) -> &str {
        &self.plan.name
    }

    fn supports(&self) -> Channels {
        self.plan.supports
    }

    fn initialize(&mut self, _requested: Channels, logger: ModuleLogger) -> Result<Channels> {
        self.plan.stats.initialized.fetch_add(1, Ordering::SeqCst);
        if !self.plan.init_delay.is_zero() {
            thread::sleep(self.plan.init_delay);
        }
        match self.plan.reports {
            Some(channels) => {
                logger.info(&format!("{} ready", self.plan.name));
                Ok(channels)
            }
            None => bail!("no device found"),
        }
    }

    fn update(&mut self, data: &mut UnifiedTrackingData) -> Result<()> {
        self.plan.stats.updates.fetch_add(1, Ordering::SeqCst);
        data.eye.left.openness = 0.25;
        data.eye.right.openness = 0.25;
        data.shapes[0].weight = 0.5;
        Ok(())
    }

    fn run(&mut self, ctx: &ModuleContext) -> Result<()> {
        match self.plan.behavior {
            RunBehavior::Track => {
                let mut frame = UnifiedTrackingData::default();
                while !ctx.should_stop() {
                    self.update(&mut frame)?;
                    ctx.publish(&frame);
                    ctx.stop_token().wait_timeout(Duration::from_millis(5));
                }
                Ok(())
            }
            RunBehavior::Fail => Err(anyhow!("device unplugged")),
            RunBehavior::Panic => panic!("driver crashed"),
            RunBehavior::Exit => Ok(()),
        }
    }

    fn teardown(&mut self) {
        self.plan.stats.torn_down.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub manager: ModuleManager,
    pub status: Arc<StatusAggregate>,
    pub store: Arc<TrackingStore>,
}

pub fn harness(candidates: &[&MockPlan]) -> Harness {
    init_logging();
    let status = Arc::new(StatusAggregate::new());
    let store = Arc::new(TrackingStore::new());
    let discovery =
        ModuleDiscovery::builtin_only(candidates.iter().map(|s| s.descriptor()).collect());
    let manager = ModuleManager::new(
        discovery,
        status.clone(),
        store.clone(),
        Duration::from_millis(5),
    );
    Harness {
        manager,
        status,
        store,
    }
}

/// Polls `condition` for up to two seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Socket that records every datagram instead of sending it.
#[derive(Default)]
pub struct RecordingSocket {
    sent: Mutex<Vec<(Vec<u8>, String)>>,
}

impl RecordingSocket {
    pub fn datagrams(&self) -> Vec<(Vec<u8>, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn packets(&self) -> Vec<OscPacket> {
        self.datagrams()
            .iter()
            .map(|(bytes, _)| rosc::decoder::decode_udp(bytes).unwrap().1)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl OscSocket for RecordingSocket {
    fn send(&self, bytes: &[u8], destination: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((bytes.to_vec(), destination.to_string()));
        Ok(())
    }

    fn receive(&self, _buf: &mut [u8]) -> Result<Option<usize>> {
        Ok(None)
    }
}

/// Addresses of the messages in a bundle packet, in order.
pub fn bundle_addresses(packet: &OscPacket) -> Vec<String> {
    match packet {
        OscPacket::Bundle(bundle) => bundle
            .content
            .iter()
            .map(|p| match p {
                OscPacket::Message(m) => m.addr.clone(),
                OscPacket::Bundle(_) => panic!("nested bundle"),
            })
            .collect(),
        OscPacket::Message(_) => panic!("expected a bundle"),
    }
}
