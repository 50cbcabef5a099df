use crate::{Channels, PupilThresholds, TrackingSink, UnifiedTrackingData};
use std::sync::{Mutex, RwLock};

/// Process-wide latest tracking data.
///
/// Module workers write into it through [`TrackingSink`], each only for the
/// channels its module is bound to; the main loop reads snapshots.
pub struct TrackingStore {
    data: RwLock<UnifiedTrackingData>,
    thresholds: Mutex<PupilThresholds>,
}

impl Default for TrackingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingStore {
    pub fn new() -> Self {
        let mut data = UnifiedTrackingData::default();
        data.eye.left.openness = 1.0;
        data.eye.right.openness = 1.0;
        Self {
            data: RwLock::new(data),
            thresholds: Mutex::new(PupilThresholds::default()),
        }
    }

    pub fn snapshot(&self) -> UnifiedTrackingData {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn thresholds(&self) -> PupilThresholds {
        match self.thresholds.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn reset_thresholds(&self) {
        match self.thresholds.lock() {
            Ok(mut guard) => guard.reset(),
            Err(poisoned) => poisoned.into_inner().reset(),
        }
        log::debug!("Pupil thresholds reset");
    }
}

impl TrackingSink for TrackingStore {
    fn publish(&self, channels: Channels, frame: &UnifiedTrackingData) {
        if !channels.any() {
            return;
        }

        let mut eye = frame.eye.clone();
        if channels.eye {
            let mut thresholds = match self.thresholds.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            thresholds.observe(eye.left.pupil_diameter_mm);
            thresholds.observe(eye.right.pupil_diameter_mm);
            eye.min_dilation = thresholds.min;
            eye.max_dilation = thresholds.max;
            eye.left_diameter = thresholds.normalize(eye.left.pupil_diameter_mm);
            eye.right_diameter = thresholds.normalize(eye.right.pupil_diameter_mm);
        }

        let mut data = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if channels.eye {
            data.eye = eye;
            data.head = frame.head;
        }
        if channels.lip {
            data.shapes.clone_from(&frame.shapes);
        }
    }
}
