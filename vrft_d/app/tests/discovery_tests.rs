//! Module discovery tests
//!
//! Uses a fake loader over a temporary modules directory.

mod support;

use crate::support::{init_logging, MockPlan};
use api::Channels;
use std::fs;
use std::path::Path;
use vrft_d::modules::{
    ModuleDescriptor, ModuleDiscovery, ModuleLoadError, ModuleLoader, ModuleOrigin,
};

/// Pretends every library loads, except files whose name starts with `broken`
/// (not a module) or `corrupt` (unloadable).
struct FakeLoader;

impl ModuleLoader for FakeLoader {
    fn load(&self, path: &Path) -> Result<ModuleDescriptor, ModuleLoadError> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if name.starts_with("broken") {
            return Err(ModuleLoadError::NotAModule {
                path: path.to_path_buf(),
                symbol: "create_module".into(),
            });
        }
        if name.starts_with("corrupt") {
            return Err(ModuleLoadError::AbiMismatch {
                path: path.to_path_buf(),
                found: 0,
                expected: api::MODULE_ABI_VERSION,
            });
        }
        let descriptor = MockPlan::new(&name, Channels::BOTH).descriptor();
        Ok(ModuleDescriptor::new(
            name,
            ModuleOrigin::External(path.to_path_buf()),
            std::sync::Arc::new(move || descriptor.instantiate()),
        ))
    }
}

fn names(candidates: &[ModuleDescriptor]) -> Vec<&str> {
    candidates.iter().map(|c| c.name()).collect()
}

#[test]
fn builtins_come_first_then_sorted_libraries() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    for file in ["b_module.so", "a_module.dll", "readme.txt", "c_module.dylib"] {
        fs::write(dir.path().join(file), b"").unwrap();
    }
    fs::create_dir(dir.path().join("nested.so")).unwrap();

    let builtin = MockPlan::new("builtin", Channels::LIP);
    let discovery = ModuleDiscovery::new(dir.path())
        .with_builtins(vec![builtin.descriptor()])
        .with_loader(FakeLoader);

    let candidates = discovery.discover();
    assert_eq!(
        names(&candidates),
        vec!["builtin", "a_module.dll", "b_module.so", "c_module.dylib"]
    );
    assert_eq!(candidates[0].origin(), &ModuleOrigin::Builtin);
    assert_eq!(
        candidates[1].origin(),
        &ModuleOrigin::External(dir.path().join("a_module.dll"))
    );
}

#[test]
fn unloadable_libraries_are_skipped() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    for file in ["broken.so", "corrupt.so", "ok.so"] {
        fs::write(dir.path().join(file), b"").unwrap();
    }

    let discovery = ModuleDiscovery::new(dir.path()).with_loader(FakeLoader);
    assert_eq!(names(&discovery.discover()), vec!["ok.so"]);
}

#[test]
fn missing_directory_is_created() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let modules_dir = dir.path().join("plugins").join("native");

    let discovery = ModuleDiscovery::new(&modules_dir).with_loader(FakeLoader);
    assert!(discovery.discover().is_empty());
    assert!(modules_dir.is_dir());
}

#[test]
fn native_loader_rejects_garbage_files() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let ext = if cfg!(windows) {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    };
    fs::write(dir.path().join(format!("garbage.{}", ext)), b"not a library").unwrap();

    let discovery = ModuleDiscovery::new(dir.path());
    assert!(discovery.discover().is_empty());
}

#[test]
fn discovery_does_not_instantiate() {
    init_logging();
    let builtin = MockPlan::new("builtin", Channels::BOTH);
    let discovery = ModuleDiscovery::builtin_only(vec![builtin.descriptor()]);

    assert_eq!(discovery.discover().len(), 1);
    assert_eq!(builtin.stats.created(), 0);
}
