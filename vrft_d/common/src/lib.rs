pub use api::{
    Channels, TrackingModule, TrackingSink, UnifiedExpressionShape, UnifiedExpressions,
    UnifiedEyeData, UnifiedHeadData, UnifiedSingleEyeData, UnifiedTrackingData,
};

mod config;
mod store;
mod thresholds;

pub use config::{Config, ModuleConfig, OscConfig, StatusHostConfig};
pub use store::TrackingStore;
pub use thresholds::PupilThresholds;
