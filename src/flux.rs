//! Seam for the external HSI compute engine.
//!
//! The real transformer ships separately; this crate only consumes it
//! as an opaque vendor-JSON → HSI-JSON function. The passthrough
//! implementation keeps the recording pipeline usable without the
//! engine installed.

use crate::error::MockError;
use crate::generator::VendorKind;

/// Vendor payload → HSI payload transformation contract
pub trait HsiTransformer: Send + Sync {
    /// Transform one vendor-shaped JSON payload into an HSI JSON
    /// payload.
    fn transform(&self, vendor: VendorKind, payload: &str) -> Result<String, MockError>;
}

/// Emits the vendor payload unchanged
#[derive(Debug, Default)]
pub struct PassthroughTransformer;

impl HsiTransformer for PassthroughTransformer {
    fn transform(&self, _vendor: VendorKind, payload: &str) -> Result<String, MockError> {
        Ok(payload.to_string())
    }
}
