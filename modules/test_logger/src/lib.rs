// Example module: logs through the host at every level and produces a slow
// synthetic jaw movement so the whole pipeline can be watched end to end.

use anyhow::Result;
use api::{Channels, ModuleLogger, TrackingModule, UnifiedExpressions, UnifiedTrackingData};

pub struct TestLogger {
    frame_count: u64,
    channels: Channels,
    logger: Option<ModuleLogger>,
}

impl TestLogger {
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            channels: Channels::NONE,
            logger: None,
        }
    }
}

impl Default for TestLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingModule for TestLogger {
    fn name(&self) -> &str {
        "test_logger"
    }

    fn supports(&self) -> Channels {
        Channels::BOTH
    }

    fn initialize(&mut self, requested: Channels, logger: ModuleLogger) -> Result<Channels> {
        logger.info("Initializing test logger plugin");
        logger.debug(&format!(
            "Debug: requested eye={} lip={}",
            requested.eye, requested.lip
        ));
        logger.trace("Trace: Very detailed initialization info");
        self.channels = requested;
        self.logger = Some(logger);
        Ok(requested)
    }

    fn update(&mut self, data: &mut UnifiedTrackingData) -> Result<()> {
        self.frame_count += 1;

        if self.channels.eye {
            data.eye.left.openness = 1.0;
            data.eye.right.openness = 1.0;
        }
        if self.channels.lip {
            // One open/close cycle roughly every two seconds at 200 fps.
            let phase = (self.frame_count % 400) as f32 / 400.0;
            let jaw = (phase * std::f32::consts::TAU).sin().abs();
            data.shapes[UnifiedExpressions::JawOpen as usize].weight = jaw;
        }

        if let Some(logger) = &self.logger {
            match self.frame_count {
                1 => {
                    logger.info(&format!("Update called - frame {}", self.frame_count));
                    logger.info("This plugin demonstrates module logging capabilities");
                }
                2 => {
                    logger.warn(&format!(
                        "This is a warning from the plugin - frame {}",
                        self.frame_count
                    ));
                }
                3 => {
                    logger.debug(&format!(
                        "Debug message - frame {} (only visible with RUST_LOG=debug)",
                        self.frame_count
                    ));
                }
                10 => {
                    logger.info("Frame 10 reached. Plugin will now run silently.");
                }
                1000 => {
                    logger.info("Frame 1000 milestone");
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(logger) = &self.logger {
            logger.info(&format!(
                "Tearing down test logger plugin. Total frames processed: {}",
                self.frame_count
            ));
        }
        self.logger = None;
    }
}

api::declare_module!(TestLogger::new);
