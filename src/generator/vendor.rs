//! Vendor-shaped payload aggregation.
//!
//! Collects a batch of envelopes and shapes them into Whoop- or
//! Garmin-style JSON so the recording pipeline can exercise the same
//! payloads a real vendor integration would hand to the HSI
//! transformer.

use chrono::{Duration as ChronoDuration, Utc};

use crate::error::MockError;
use crate::event::Event;

/// Vendor data format for shaped payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorKind {
    Whoop,
    Garmin,
}

impl VendorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VendorKind::Whoop => "whoop",
            VendorKind::Garmin => "garmin",
        }
    }
}

/// Number of envelopes collected before a vendor payload is shaped
pub const AGGREGATION_BATCH: usize = 20;

/// Collects envelopes and packages them as vendor JSON
#[derive(Debug, Default)]
pub struct VendorAggregator {
    events: Vec<Event>,
}

impl VendorAggregator {
    pub fn new() -> Self {
        VendorAggregator::default()
    }

    pub fn add(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn count(&self) -> usize {
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Shape the collected batch for the given vendor.
    pub fn to_vendor_json(&self, vendor: VendorKind) -> Result<String, MockError> {
        match vendor {
            VendorKind::Whoop => self.to_whoop_json(),
            VendorKind::Garmin => self.to_garmin_json(),
        }
    }

    /// Whoop-style payload: sleep / recovery / cycle arrays.
    pub fn to_whoop_json(&self) -> Result<String, MockError> {
        let (hrv, rhr) = self.latest_physiology();
        let now = Utc::now();

        let payload = serde_json::json!({
            "sleep": [{
                "id": 1,
                "start": (now - ChronoDuration::hours(20)).to_rfc3339(),
                "end": (now - ChronoDuration::hours(12)).to_rfc3339(),
                "score": {
                    "stage_summary": {
                        "total_in_bed_time_milli": 28_800_000,
                        "total_awake_time_milli": 1_800_000,
                        "total_light_sleep_time_milli": 12_600_000,
                        "total_slow_wave_sleep_time_milli": 7_200_000,
                        "total_rem_sleep_time_milli": 7_200_000,
                        "total_sleep_time_milli": 27_000_000,
                        "disturbance_count": 3
                    },
                    "sleep_performance_percentage": 85.0,
                    "respiratory_rate": 14.5
                }
            }],
            "recovery": [{
                "cycle_id": 1,
                "created_at": now.to_rfc3339(),
                "score": {
                    "recovery_score": 75.0,
                    "resting_heart_rate": rhr,
                    "hrv_rmssd_milli": hrv
                }
            }],
            "cycle": [{
                "id": 1,
                "start": (now - ChronoDuration::hours(12)).to_rfc3339(),
                "end": now.to_rfc3339(),
                "score": {
                    "strain": 12.5,
                    "kilojoule": 8000.0,
                    "average_heart_rate": rhr + 10.0,
                    "max_heart_rate": rhr + 50.0
                }
            }]
        });

        Ok(serde_json::to_string(&payload)?)
    }

    /// Garmin-style payload: dailies / sleep arrays.
    pub fn to_garmin_json(&self) -> Result<String, MockError> {
        let (hrv, rhr) = self.latest_physiology();
        let now = Utc::now();
        let today = now.format("%Y-%m-%d").to_string();
        let now_ms = now.timestamp_millis();

        let payload = serde_json::json!({
            "dailies": [{
                "calendarDate": today,
                "totalSteps": 8500,
                "totalKilocalories": 2200,
                "restingHeartRate": rhr as i64,
                "restingHeartRateHrv": hrv,
                "averageHeartRate": (rhr + 10.0) as i64,
                "maxHeartRate": (rhr + 50.0) as i64,
                "bodyBatteryChargedValue": 72,
                "trainingLoadBalance": 45.5
            }],
            "sleep": [{
                "calendarDate": today,
                "sleepTimeSeconds": 25_200,
                "awakeSleepSeconds": 1_800,
                "lightSleepSeconds": 10_800,
                "deepSleepSeconds": 6_300,
                "remSleepSeconds": 6_300,
                "awakeCount": 2,
                "avgSleepRespiration": 13.5,
                "sleepScores": { "overallScore": 78.0 },
                "sleepStartTimestampGmt": now_ms - 20 * 3_600_000,
                "sleepEndTimestampGmt": now_ms - 12 * 3_600_000
            }]
        });

        Ok(serde_json::to_string(&payload)?)
    }

    /// Latest HRV and heart-rate samples in the batch, with resting
    /// defaults when the batch carries neither.
    fn latest_physiology(&self) -> (f64, f64) {
        let mut hrv = 50.0;
        let mut rhr = 60.0;
        for event in &self.events {
            match event.signal.name.as_str() {
                "ppg.hrv_rmssd_ms" => {
                    if let Some(v) = event.signal.value.as_scalar() {
                        hrv = v;
                    }
                }
                "ppg.hr_bpm" => {
                    if let Some(v) = event.signal.value.as_scalar() {
                        rhr = v;
                    }
                }
                _ => {}
            }
        }
        (hrv, rhr)
    }
}
