//! Tracking module discovery, binding and lifecycle.

pub mod binding;
pub mod builtin;
pub mod discovery;
pub mod loader;
pub mod manager;

use anyhow::Result;
use api::{LogLevel, ModuleLogger, TrackingModule};
use log::{debug, error, info, trace, warn};
use std::ffi::c_char;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub use discovery::ModuleDiscovery;
pub use loader::{ModuleLoadError, ModuleLoader, NativeLoader};
pub use manager::{BindingSnapshot, ModuleManager};

/// Creates a fresh, uninitialized module instance.
pub type ModuleFactory = Arc<dyn Fn() -> Result<Box<dyn TrackingModule>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    Builtin,
    External(PathBuf),
}

/// A discovered module type. Cheap to clone; nothing is instantiated until
/// [`ModuleDescriptor::instantiate`] is called by a binding pass.
#[derive(Clone)]
pub struct ModuleDescriptor {
    name: String,
    origin: ModuleOrigin,
    factory: ModuleFactory,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, origin: ModuleOrigin, factory: ModuleFactory) -> Self {
        Self {
            name: name.into(),
            origin,
            factory,
        }
    }

    pub fn builtin<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn TrackingModule>> + Send + Sync + 'static,
    {
        Self::new(name, ModuleOrigin::Builtin, Arc::new(factory))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    pub fn instantiate(&self) -> Result<Box<dyn TrackingModule>> {
        (self.factory)()
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

extern "C" fn module_log_callback(level: LogLevel, target: *const c_char, message: *const c_char) {
    if target.is_null() || message.is_null() {
        return;
    }
    // SAFETY: ModuleLogger always passes valid NUL-terminated strings that outlive the call.
    let (target_str, message_str) = unsafe {
        (
            std::ffi::CStr::from_ptr(target).to_string_lossy(),
            std::ffi::CStr::from_ptr(message).to_string_lossy(),
        )
    };

    match level {
        LogLevel::Error => error!(target: &*target_str, "{}", message_str),
        LogLevel::Warn => warn!(target: &*target_str, "{}", message_str),
        LogLevel::Info => info!(target: &*target_str, "{}", message_str),
        LogLevel::Debug => debug!(target: &*target_str, "{}", message_str),
        LogLevel::Trace => trace!(target: &*target_str, "{}", message_str),
    }
}

pub(crate) fn module_logger(module_name: &str) -> ModuleLogger {
    ModuleLogger::new(
        module_log_callback,
        format!("vrft_d::modules::{}", module_name),
    )
}
