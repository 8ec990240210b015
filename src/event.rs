//! HSI event envelope
//!
//! The envelope is the one wire shape shared by every transport and by
//! the recorder: a single sensor sample with provenance, session
//! metadata, and a monotonically increasing sequence number.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Schema version stamped on every emitted envelope
pub const SCHEMA_VERSION: &str = "hsi.input.v1";

/// Origin device class for a sensor stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Wearable,
    Phone,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Wearable => "wearable",
            SourceType::Phone => "phone",
        }
    }
}

/// Body side for wearable sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSide {
    Left,
    Right,
}

/// Origin of the sensor data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: SourceType,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<SourceSide>,
}

/// Metadata about the mock session that produced the event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub run_id: String,
    pub scenario: String,
    pub seed: i64,
}

/// A signal sample value: scalar, 3-axis vector, or discrete label.
///
/// Serialized untagged so the wire form stays a plain JSON number,
/// 3-element array, or string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Scalar(f64),
    Vector([f64; 3]),
    Label(String),
}

impl SignalValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            SignalValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<[f64; 3]> {
        match self {
            SignalValue::Vector(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            SignalValue::Label(s) => Some(s),
            _ => None,
        }
    }
}

/// A single sensor measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Signal name, e.g. "ppg.hr_bpm"
    pub name: String,
    /// Unit string, e.g. "bpm"; empty for labels
    pub unit: String,
    pub value: SignalValue,
    /// Sample quality in [0, 1]
    pub quality: f64,
}

/// Additional event metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Strictly increasing per run, starting at 1
    pub sequence: u64,
}

/// One HSI-compatible event envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub schema_version: String,
    pub event_id: String,
    /// UTC, RFC-3339 with nanosecond precision
    #[serde(rename = "ts")]
    pub timestamp: String,
    pub source: Source,
    pub session: Session,
    pub signal: Signal,
    pub meta: Meta,
}

impl Event {
    /// Build an envelope stamped with the current UTC time.
    pub fn new(
        event_id: String,
        source: Source,
        session: Session,
        signal: Signal,
        sequence: u64,
    ) -> Self {
        Event {
            schema_version: SCHEMA_VERSION.to_string(),
            event_id,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            source,
            session,
            signal,
            meta: Meta { sequence },
        }
    }
}
