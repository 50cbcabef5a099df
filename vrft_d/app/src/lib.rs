//! Face tracking daemon: loads tracking modules, binds them to the eye and lip
//! channels and streams the result to the game over OSC.

pub mod main_loop;
pub mod modules;
pub mod osc;
pub mod reload;
pub mod status;
pub mod status_host;

pub use main_loop::MainLoop;
pub use reload::ConfigEvent;
pub use status::{ModuleStatus, StatusAggregate};
