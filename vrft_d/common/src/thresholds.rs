/// Running pupil diameter range used to normalise dilation.
///
/// The range only ever widens until [`PupilThresholds::reset`] is called,
/// which happens on every configuration reload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PupilThresholds {
    pub min: f32,
    pub max: f32,
}

impl Default for PupilThresholds {
    fn default() -> Self {
        Self {
            min: 999.0,
            max: 0.0,
        }
    }
}

impl PupilThresholds {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Widens the range with a raw diameter. Non-positive readings mean "no data".
    pub fn observe(&mut self, diameter_mm: f32) {
        if diameter_mm <= 0.0 || !diameter_mm.is_finite() {
            return;
        }
        if diameter_mm < self.min {
            self.min = diameter_mm;
        }
        if diameter_mm > self.max {
            self.max = diameter_mm;
        }
    }

    /// Maps a raw diameter into 0..1, or 0.5 while the range is still degenerate.
    pub fn normalize(&self, diameter_mm: f32) -> f32 {
        let range = self.max - self.min;
        if range > 0.001 {
            ((diameter_mm - self.min) / range).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }
}
