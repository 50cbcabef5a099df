//! The contract every tracking module implements, built-in or loaded from a library.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{ModuleLogger, StopToken, UnifiedTrackingData};

/// Bumped whenever [`TrackingModule`] changes shape. Libraries built against a
/// different version are skipped during discovery.
pub const MODULE_ABI_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Eye,
    Lip,
}

/// A pair of eye/lip flags, used for capabilities, requests and results alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channels {
    pub eye: bool,
    pub lip: bool,
}

impl Channels {
    pub const NONE: Channels = Channels {
        eye: false,
        lip: false,
    };
    pub const BOTH: Channels = Channels {
        eye: true,
        lip: true,
    };
    pub const EYE: Channels = Channels {
        eye: true,
        lip: false,
    };
    pub const LIP: Channels = Channels {
        eye: false,
        lip: true,
    };

    pub fn new(eye: bool, lip: bool) -> Self {
        Self { eye, lip }
    }

    pub fn any(self) -> bool {
        self.eye || self.lip
    }

    pub fn contains(self, channel: Channel) -> bool {
        match channel {
            Channel::Eye => self.eye,
            Channel::Lip => self.lip,
        }
    }

    pub fn intersect(self, other: Channels) -> Channels {
        Channels {
            eye: self.eye && other.eye,
            lip: self.lip && other.lip,
        }
    }
}

/// Ownership state of a channel. Anything `>= Idle` means a module owns it.
#[repr(i8)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ModuleState {
    #[default]
    Uninitialized = -1,
    Idle = 0,
    Active = 1,
}

impl ModuleState {
    pub fn is_owned(self) -> bool {
        self >= ModuleState::Idle
    }
}

/// Destination for frames produced by a running module.
pub trait TrackingSink: Send + Sync {
    /// Stores the parts of `frame` that belong to `channels`.
    fn publish(&self, channels: Channels, frame: &UnifiedTrackingData);
}

/// Everything a module's run loop needs from the host.
#[derive(Clone)]
pub struct ModuleContext {
    stop: StopToken,
    sink: Arc<dyn TrackingSink>,
    channels: Channels,
    frame_interval: Duration,
}

impl ModuleContext {
    pub fn new(
        stop: StopToken,
        sink: Arc<dyn TrackingSink>,
        channels: Channels,
        frame_interval: Duration,
    ) -> Self {
        Self {
            stop,
            sink,
            channels,
            frame_interval,
        }
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Channels this module was bound to. Data for other channels is ignored.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    pub fn publish(&self, frame: &UnifiedTrackingData) {
        self.sink.publish(self.channels, frame);
    }
}

pub trait TrackingModule: Send {
    /// Human readable name, used in logs and the status endpoint.
    fn name(&self) -> &str;

    /// Channels this module can ever provide.
    fn supports(&self) -> Channels;

    /// Brings up the data source. Both requested flags are always passed, and
    /// the result reports which channels actually came up.
    fn initialize(&mut self, requested: Channels, logger: ModuleLogger) -> Result<Channels>;

    /// Fills `data` with the newest sample. May block for a short time.
    fn update(&mut self, data: &mut UnifiedTrackingData) -> Result<()>;

    /// Worker entry point. Runs until the context's stop token fires.
    ///
    /// The default loop calls [`TrackingModule::update`] and publishes each
    /// frame, pacing itself to the context's frame interval. Returning before
    /// a stop was requested is treated as a crash by the host.
    fn run(&mut self, ctx: &ModuleContext) -> Result<()> {
        let mut frame = UnifiedTrackingData::default();
        while !ctx.should_stop() {
            let started = Instant::now();
            self.update(&mut frame)?;
            ctx.publish(&frame);

            let elapsed = started.elapsed();
            if elapsed < ctx.frame_interval()
                && ctx
                    .stop_token()
                    .wait_timeout(ctx.frame_interval() - elapsed)
            {
                break;
            }
        }
        Ok(())
    }

    /// Releases the data source. Called once after the worker has exited.
    fn teardown(&mut self);
}

/// Exports the entry points the host looks for in a module library.
///
/// ```ignore
/// api::declare_module!(MyModule::new);
/// ```
#[macro_export]
macro_rules! declare_module {
    ($constructor:path) => {
        #[no_mangle]
        pub extern "C" fn vrft_module_abi_version() -> u32 {
            $crate::MODULE_ABI_VERSION
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn create_module() -> *mut dyn $crate::TrackingModule {
            let module: Box<dyn $crate::TrackingModule> = Box::new($constructor());
            Box::into_raw(module)
        }
    };
}
