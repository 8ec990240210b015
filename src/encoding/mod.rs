//! Wire encoders for event envelopes.
//!
//! Transports hold an encoder and never care which serialization is in
//! play: JSON text frames by default, protobuf binary frames as the
//! alternate variant.

pub mod protobuf;

pub use protobuf::ProtobufEncoder;

use std::sync::Arc;

use crate::error::MockError;
use crate::event::Event;

/// Supported wire encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFormat {
    Json,
    Protobuf,
}

/// Encodes one envelope to its wire form
pub trait Encoder: Send + Sync {
    fn encode(&self, event: &Event) -> Result<Vec<u8>, MockError>;
    fn content_type(&self) -> &'static str;
    /// Whether payloads are binary (protobuf) or text (JSON).
    fn is_binary(&self) -> bool {
        false
    }
}

/// Encodes envelopes as compact JSON
#[derive(Debug, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(&self, event: &Event) -> Result<Vec<u8>, MockError> {
        Ok(serde_json::to_vec(event)?)
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

/// Build the encoder for a format.
pub fn encoder_for(format: EncodingFormat) -> Arc<dyn Encoder> {
    match format {
        EncodingFormat::Json => Arc::new(JsonEncoder),
        EncodingFormat::Protobuf => Arc::new(ProtobufEncoder),
    }
}
