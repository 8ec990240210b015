//! Cross-signal correlation pass.
//!
//! One round of generated values is collected into a bag, the
//! correlation rules below adjust related signals, and only then are
//! envelopes built. Rules:
//!
//! 1. High acceleration magnitude nudges heart rate up.
//! 2. Elevated electrodermal activity suppresses HRV.
//! 3. The acceleration magnitude is kept consistent with the motion
//!    activity label (still / walk / run).

use std::collections::BTreeMap;

use crate::event::SignalValue;

const HR: &str = "ppg.hr_bpm";
const HRV: &str = "ppg.hrv_rmssd_ms";
const ACCEL: &str = "accel.xyz_mps2";
const EDA: &str = "eda.us";
const MOTION: &str = "motion.activity";

/// Holds one generation round's values for correlation
#[derive(Debug, Default)]
pub struct CorrelationBag {
    values: BTreeMap<String, SignalValue>,
}

impl CorrelationBag {
    pub fn new() -> Self {
        CorrelationBag::default()
    }

    pub fn insert(&mut self, signal: &str, value: SignalValue) {
        self.values.insert(signal.to_string(), value);
    }

    pub fn get(&self, signal: &str) -> Option<&SignalValue> {
        self.values.get(signal)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Apply all correlation rules in order.
    pub fn apply_correlations(&mut self) {
        self.correlate_heart_rate_with_acceleration();
        self.correlate_hrv_with_eda();
        self.align_acceleration_with_motion();
    }

    fn correlate_heart_rate_with_acceleration(&mut self) {
        let Some(magnitude) = self.get(ACCEL).and_then(SignalValue::as_vector).map(magnitude)
        else {
            return;
        };
        let Some(hr) = self.get(HR).and_then(SignalValue::as_scalar) else {
            return;
        };

        if magnitude > 11.0 {
            let adjusted = hr + (magnitude - 11.0) * 2.0;
            self.insert(HR, SignalValue::Scalar(adjusted.clamp(40.0, 200.0)));
        }
    }

    fn correlate_hrv_with_eda(&mut self) {
        let Some(eda) = self.get(EDA).and_then(SignalValue::as_scalar) else {
            return;
        };
        let Some(hrv) = self.get(HRV).and_then(SignalValue::as_scalar) else {
            return;
        };

        if eda > 4.0 {
            let factor = (1.0 - (eda - 4.0) * 0.05).max(0.6);
            self.insert(HRV, SignalValue::Scalar((hrv * factor).clamp(10.0, 150.0)));
        }
    }

    fn align_acceleration_with_motion(&mut self) {
        let Some(motion) = self
            .get(MOTION)
            .and_then(SignalValue::as_label)
            .map(str::to_string)
        else {
            return;
        };
        let Some(accel) = self.get(ACCEL).and_then(SignalValue::as_vector) else {
            return;
        };

        let mag = magnitude(accel);
        if mag == 0.0 {
            return;
        }

        let target = match motion.as_str() {
            "still" if mag > 10.5 => Some(9.85),
            "walk" if !(10.0..=15.0).contains(&mag) => Some(11.0 + accel[0].abs() * 0.5),
            "run" if mag < 12.0 => Some(13.0),
            _ => None,
        };

        if let Some(target) = target {
            let factor = target / mag;
            self.insert(
                ACCEL,
                SignalValue::Vector([accel[0] * factor, accel[1] * factor, accel[2] * factor]),
            );
        }
    }
}

fn magnitude(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}
