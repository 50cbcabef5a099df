//! The only place that knows how to turn a file on disk into module instances.

use super::{ModuleDescriptor, ModuleOrigin};
use anyhow::Result;
use api::{Channels, ModuleContext, ModuleLogger, TrackingModule, UnifiedTrackingData};
use libloading::{Library, Symbol};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ABI_VERSION_SYMBOL: &[u8] = b"vrft_module_abi_version\0";
const CREATE_MODULE_SYMBOL: &[u8] = b"create_module\0";

type AbiVersionFn = unsafe extern "C" fn() -> u32;
#[allow(improper_ctypes_definitions)]
type CreateModuleFn = unsafe extern "C" fn() -> *mut dyn TrackingModule;

#[derive(Debug, thiserror::Error)]
pub enum ModuleLoadError {
    #[error("Failed to load library {path:?}: {source}")]
    Library {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("{path:?} does not export a tracking module ({symbol})")]
    NotAModule { path: PathBuf, symbol: String },
    #[error("{path:?} was built for module ABI {found}, expected {expected}")]
    AbiMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

impl ModuleLoadError {
    /// Broken files are errors; libraries that simply are not modules are only warnings.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, ModuleLoadError::Library { .. })
    }
}

pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<ModuleDescriptor, ModuleLoadError>;
}

/// Loads `cdylib` modules exported with `api::declare_module!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl ModuleLoader for NativeLoader {
    fn load(&self, path: &Path) -> Result<ModuleDescriptor, ModuleLoadError> {
        let not_a_module = |symbol: &[u8]| ModuleLoadError::NotAModule {
            path: path.to_path_buf(),
            symbol: String::from_utf8_lossy(&symbol[..symbol.len() - 1]).into_owned(),
        };

        // SAFETY: loading runs the library's initialisers; module libraries are trusted by
        // virtue of being placed in the modules directory.
        let library = unsafe { Library::new(path) }.map_err(|source| ModuleLoadError::Library {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: the symbol types match what `declare_module!` exports.
        let create = unsafe {
            let version: Symbol<AbiVersionFn> = library
                .get(ABI_VERSION_SYMBOL)
                .map_err(|_| not_a_module(ABI_VERSION_SYMBOL))?;
            let found = version();
            if found != api::MODULE_ABI_VERSION {
                return Err(ModuleLoadError::AbiMismatch {
                    path: path.to_path_buf(),
                    found,
                    expected: api::MODULE_ABI_VERSION,
                });
            }

            let create: Symbol<CreateModuleFn> = library
                .get(CREATE_MODULE_SYMBOL)
                .map_err(|_| not_a_module(CREATE_MODULE_SYMBOL))?;
            *create
        };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let library = Arc::new(library);
        let factory_name = name.clone();

        let factory = move || -> Result<Box<dyn TrackingModule>> {
            // SAFETY: `create` stays valid while `library` is alive, and every
            // instance keeps its own reference to it.
            let raw = unsafe { create() };
            if raw.is_null() {
                anyhow::bail!("create_module returned null for {}", factory_name);
            }
            let inner = unsafe { Box::from_raw(raw) };
            Ok(Box::new(LoadedModule {
                inner,
                _library: library.clone(),
            }))
        };

        Ok(ModuleDescriptor::new(
            name,
            ModuleOrigin::External(path.to_path_buf()),
            Arc::new(factory),
        ))
    }
}

/// Module instance that keeps its library mapped for as long as it lives.
struct LoadedModule {
    // Field order matters: the instance must drop before the library is unmapped.
    inner: Box<dyn TrackingModule>,
    _library: Arc<Library>,
}

impl TrackingModule for LoadedModule {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn supports(&self) -> Channels {
        self.inner.supports()
    }

    fn initialize(&mut self, requested: Channels, logger: ModuleLogger) -> Result<Channels> {
        self.inner.initialize(requested, logger)
    }

    fn update(&mut self, data: &mut UnifiedTrackingData) -> Result<()> {
        self.inner.update(data)
    }

    fn run(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.inner.run(ctx)
    }

    fn teardown(&mut self) {
        self.inner.teardown();
    }
}
