use std::ffi::{c_char, CString};

/// log level for module logging
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

/// logger callback for modules
pub type LogCallback = extern "C" fn(level: LogLevel, target: *const c_char, message: *const c_char);

/// Logger handed to a module when it is initialized.
///
/// Modules loaded from a shared library do not share the host's `log` state,
/// so everything goes through the host-provided callback.
#[derive(Clone)]
pub struct ModuleLogger {
    callback: LogCallback,
    module_name: String,
}

impl ModuleLogger {
    pub fn new(callback: LogCallback, module_name: String) -> Self {
        Self {
            callback,
            module_name,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }

    fn log(&self, level: LogLevel, message: &str) {
        // Interior NULs would make CString::new fail; strip them instead of dropping the line.
        let target = CString::new(self.module_name.replace('\0', "")).unwrap_or_default();
        let msg = CString::new(message.replace('\0', "")).unwrap_or_default();
        (self.callback)(level, target.as_ptr(), msg.as_ptr());
    }
}
