use super::{ModuleDescriptor, ModuleLoader, NativeLoader};
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

const LIBRARY_EXTENSIONS: [&str; 3] = ["dll", "so", "dylib"];

/// Enumerates candidate modules: built-ins first, then libraries found in the
/// external modules directory.
pub struct ModuleDiscovery {
    builtins: Vec<ModuleDescriptor>,
    external_dir: Option<PathBuf>,
    loader: Box<dyn ModuleLoader>,
}

impl ModuleDiscovery {
    pub fn new(external_dir: impl Into<PathBuf>) -> Self {
        Self {
            builtins: Vec::new(),
            external_dir: Some(external_dir.into()),
            loader: Box::new(NativeLoader),
        }
    }

    /// Discovery without an external directory; only the given built-ins are offered.
    pub fn builtin_only(builtins: Vec<ModuleDescriptor>) -> Self {
        Self {
            builtins,
            external_dir: None,
            loader: Box::new(NativeLoader),
        }
    }

    pub fn with_builtins(mut self, builtins: Vec<ModuleDescriptor>) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn external_dir(&self) -> Option<&Path> {
        self.external_dir.as_deref()
    }

    pub fn discover(&self) -> Vec<ModuleDescriptor> {
        let mut candidates = self.builtins.clone();

        if let Some(dir) = &self.external_dir {
            candidates.extend(self.scan_external(dir));
        }

        info!(
            "Discovered {} module candidate(s): {:?}",
            candidates.len(),
            candidates.iter().map(|c| c.name()).collect::<Vec<_>>()
        );
        candidates
    }

    fn scan_external(&self, dir: &Path) -> Vec<ModuleDescriptor> {
        if !dir.exists() {
            warn!("Module directory {:?} not found. Creating it.", dir);
            if let Err(e) = fs::create_dir_all(dir) {
                error!("Failed to create module directory {:?}: {}", dir, e);
            }
            return Vec::new();
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to read module directory {:?}: {}", dir, e);
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| LIBRARY_EXTENSIONS.contains(&ext))
            })
            .collect();
        paths.sort();

        let mut found = Vec::with_capacity(paths.len());
        for path in paths {
            debug!("Loading module library: {:?}", path);
            match self.loader.load(&path) {
                Ok(descriptor) => {
                    info!("✓ Loaded module library: {}", descriptor.name());
                    found.push(descriptor);
                }
                Err(e) if e.is_load_failure() => error!("✗ {}", e),
                Err(e) => warn!("Skipping {:?}: {}", path, e),
            }
        }
        found
    }
}
