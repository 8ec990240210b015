//! Protobuf wire encoding for event envelopes.
//!
//! Messages are hand-derived with prost and mirror the JSON envelope
//! field for field; the signal value is a oneof over scalar, vector,
//! and text.

use prost::Message;

use super::Encoder;
use crate::error::MockError;
use crate::event::{Event, SignalValue};

#[derive(Clone, PartialEq, Message)]
pub struct PbEvent {
    #[prost(string, tag = "1")]
    pub schema_version: String,
    #[prost(string, tag = "2")]
    pub event_id: String,
    #[prost(string, tag = "3")]
    pub ts: String,
    #[prost(message, optional, tag = "4")]
    pub source: Option<PbSource>,
    #[prost(message, optional, tag = "5")]
    pub session: Option<PbSession>,
    #[prost(message, optional, tag = "6")]
    pub signal: Option<PbSignal>,
    #[prost(message, optional, tag = "7")]
    pub meta: Option<PbMeta>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PbSource {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(string, tag = "2")]
    pub id: String,
    #[prost(string, optional, tag = "3")]
    pub side: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PbSession {
    #[prost(string, tag = "1")]
    pub run_id: String,
    #[prost(string, tag = "2")]
    pub scenario: String,
    #[prost(int64, tag = "3")]
    pub seed: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct PbSignal {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub unit: String,
    #[prost(double, tag = "3")]
    pub quality: f64,
    #[prost(message, optional, tag = "4")]
    pub value: Option<PbValue>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PbValue {
    #[prost(oneof = "pb_value::Kind", tags = "1, 2, 3")]
    pub kind: Option<pb_value::Kind>,
}

pub mod pb_value {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(double, tag = "1")]
        Scalar(f64),
        #[prost(message, tag = "2")]
        Vector(super::PbVector3),
        #[prost(string, tag = "3")]
        Text(String),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct PbVector3 {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct PbMeta {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
}

/// Encodes envelopes as protobuf binary frames
#[derive(Debug, Default)]
pub struct ProtobufEncoder;

impl Encoder for ProtobufEncoder {
    fn encode(&self, event: &Event) -> Result<Vec<u8>, MockError> {
        Ok(event_to_proto(event).encode_to_vec())
    }

    fn content_type(&self) -> &'static str {
        "application/x-protobuf"
    }

    fn is_binary(&self) -> bool {
        true
    }
}

fn event_to_proto(event: &Event) -> PbEvent {
    PbEvent {
        schema_version: event.schema_version.clone(),
        event_id: event.event_id.clone(),
        ts: event.timestamp.clone(),
        source: Some(PbSource {
            r#type: event.source.kind.as_str().to_string(),
            id: event.source.id.clone(),
            side: event.source.side.map(|s| {
                match s {
                    crate::event::SourceSide::Left => "left",
                    crate::event::SourceSide::Right => "right",
                }
                .to_string()
            }),
        }),
        session: Some(PbSession {
            run_id: event.session.run_id.clone(),
            scenario: event.session.scenario.clone(),
            seed: event.session.seed,
        }),
        signal: Some(PbSignal {
            name: event.signal.name.clone(),
            unit: event.signal.unit.clone(),
            quality: event.signal.quality,
            value: Some(signal_value_to_proto(&event.signal.value)),
        }),
        meta: Some(PbMeta {
            sequence: event.meta.sequence,
        }),
    }
}

fn signal_value_to_proto(value: &SignalValue) -> PbValue {
    let kind = match value {
        SignalValue::Scalar(v) => pb_value::Kind::Scalar(*v),
        SignalValue::Vector(v) => pb_value::Kind::Vector(PbVector3 {
            x: v[0],
            y: v[1],
            z: v[2],
        }),
        SignalValue::Label(s) => pb_value::Kind::Text(s.clone()),
    };
    PbValue { kind: Some(kind) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Meta, Session, Signal, Source, SourceSide, SourceType};

    fn sample_event(value: SignalValue) -> Event {
        Event {
            schema_version: crate::event::SCHEMA_VERSION.to_string(),
            event_id: "evt-9".to_string(),
            timestamp: "2025-01-15T10:00:00.000000001Z".to_string(),
            source: Source {
                kind: SourceType::Wearable,
                id: "mock-watch-01".to_string(),
                side: Some(SourceSide::Left),
            },
            session: Session {
                run_id: "run-9".to_string(),
                scenario: "workout".to_string(),
                seed: -7,
            },
            signal: Signal {
                name: "accel.xyz_mps2".to_string(),
                unit: "m/s²".to_string(),
                value,
                quality: 0.91,
            },
            meta: Meta { sequence: 12 },
        }
    }

    #[test]
    fn test_scalar_round_trip() {
        let bytes = ProtobufEncoder
            .encode(&sample_event(SignalValue::Scalar(72.5)))
            .unwrap();
        let decoded = PbEvent::decode(bytes.as_slice()).unwrap();

        assert_eq!(decoded.schema_version, "hsi.input.v1");
        assert_eq!(decoded.session.as_ref().unwrap().seed, -7);
        assert_eq!(
            decoded.signal.unwrap().value.unwrap().kind,
            Some(pb_value::Kind::Scalar(72.5))
        );
    }

    #[test]
    fn test_vector_round_trip() {
        let bytes = ProtobufEncoder
            .encode(&sample_event(SignalValue::Vector([0.1, 0.2, 9.81])))
            .unwrap();
        let decoded = PbEvent::decode(bytes.as_slice()).unwrap();

        match decoded.signal.unwrap().value.unwrap().kind {
            Some(pb_value::Kind::Vector(v)) => {
                assert_eq!(v.x, 0.1);
                assert_eq!(v.y, 0.2);
                assert_eq!(v.z, 9.81);
            }
            other => panic!("expected vector, got {other:?}"),
        }
    }

    #[test]
    fn test_label_and_side() {
        let bytes = ProtobufEncoder
            .encode(&sample_event(SignalValue::Label("walk".to_string())))
            .unwrap();
        let decoded = PbEvent::decode(bytes.as_slice()).unwrap();

        assert_eq!(decoded.source.unwrap().side.as_deref(), Some("left"));
        assert_eq!(
            decoded.signal.unwrap().value.unwrap().kind,
            Some(pb_value::Kind::Text("walk".to_string()))
        );
        assert_eq!(decoded.meta.unwrap().sequence, 12);
    }
}
