//! HSI export payload model and schema validation.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema identifier every export must carry
pub const EXPORT_SCHEMA: &str = "synheart.hsi.export.v1";

/// Field-tagged schema violation
#[derive(Debug, Error, Serialize)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: &str) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Time range covered by an export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRange {
    pub from_utc: String,
    pub to_utc: String,
}

/// Exporting device metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDevice {
    pub platform: String,
    pub app_version: String,
}

/// A summary entry in an export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

/// An insight entry in an export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Insight {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

/// One HSI export payload as posted by the companion app
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HsiExport {
    pub schema: String,
    pub export_id: String,
    pub created_at_utc: String,
    pub range: ExportRange,
    pub device: ExportDevice,
    pub summaries: Vec<Summary>,
    pub insights: Vec<Insight>,
}

impl HsiExport {
    /// Validate the payload against the export schema.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema != EXPORT_SCHEMA {
            return Err(ValidationError::new(
                "schema",
                &format!("must be '{EXPORT_SCHEMA}'"),
            ));
        }
        if self.export_id.is_empty() {
            return Err(ValidationError::new("export_id", "is required"));
        }
        if self.created_at_utc.is_empty() {
            return Err(ValidationError::new("created_at_utc", "is required"));
        }
        if chrono::DateTime::parse_from_rfc3339(&self.created_at_utc).is_err() {
            return Err(ValidationError::new(
                "created_at_utc",
                "must be valid RFC3339 timestamp",
            ));
        }
        if self.range.from_utc.is_empty() || self.range.to_utc.is_empty() {
            return Err(ValidationError::new(
                "range",
                "from_utc and to_utc are required",
            ));
        }
        if self.device.platform.is_empty() {
            return Err(ValidationError::new("device.platform", "is required"));
        }
        if self.device.app_version.is_empty() {
            return Err(ValidationError::new("device.app_version", "is required"));
        }
        Ok(())
    }
}

/// Acknowledgement returned for a received export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReceipt {
    pub export_id: String,
    pub received_at: String,
    pub range: String,
    pub summary_count: usize,
    pub insight_count: usize,
    pub platform: String,
    pub duplicate: bool,
}

impl ExportReceipt {
    pub fn new(export: &HsiExport, duplicate: bool) -> Self {
        ExportReceipt {
            export_id: export.export_id.clone(),
            received_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            range: format!("{} to {}", export.range.from_utc, export.range.to_utc),
            summary_count: export.summaries.len(),
            insight_count: export.insights.len(),
            platform: export.device.platform.clone(),
            duplicate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn valid_export() -> HsiExport {
        HsiExport {
            schema: EXPORT_SCHEMA.to_string(),
            export_id: "exp-001".to_string(),
            created_at_utc: "2025-01-15T10:00:00Z".to_string(),
            range: ExportRange {
                from_utc: "2025-01-14T10:00:00Z".to_string(),
                to_utc: "2025-01-15T10:00:00Z".to_string(),
            },
            device: ExportDevice {
                platform: "ios".to_string(),
                app_version: "2.4.1".to_string(),
            },
            summaries: vec![Summary {
                id: "s1".to_string(),
                kind: "daily".to_string(),
                timestamp: "2025-01-15T00:00:00Z".to_string(),
                data: None,
            }],
            insights: Vec::new(),
        }
    }

    #[test]
    fn test_valid_export_passes() {
        assert!(valid_export().validate().is_ok());
    }

    #[test]
    fn test_wrong_schema_names_field() {
        let mut export = valid_export();
        export.schema = "synheart.hsi.export.v2".to_string();
        let error = export.validate().unwrap_err();
        assert_eq!(error.field, "schema");
    }

    #[test]
    fn test_missing_export_id() {
        let mut export = valid_export();
        export.export_id = String::new();
        assert_eq!(export.validate().unwrap_err().field, "export_id");
    }

    #[test]
    fn test_unparseable_created_at() {
        let mut export = valid_export();
        export.created_at_utc = "yesterday".to_string();
        assert_eq!(export.validate().unwrap_err().field, "created_at_utc");
    }

    #[test]
    fn test_missing_range_bounds() {
        let mut export = valid_export();
        export.range.to_utc = String::new();
        assert_eq!(export.validate().unwrap_err().field, "range");
    }

    #[test]
    fn test_missing_device_fields() {
        let mut export = valid_export();
        export.device.platform = String::new();
        assert_eq!(export.validate().unwrap_err().field, "device.platform");

        let mut export = valid_export();
        export.device.app_version = String::new();
        assert_eq!(export.validate().unwrap_err().field, "device.app_version");
    }

    #[test]
    fn test_receipt_counts_and_range() {
        let export = valid_export();
        let receipt = ExportReceipt::new(&export, true);
        assert_eq!(receipt.export_id, "exp-001");
        assert_eq!(receipt.summary_count, 1);
        assert_eq!(receipt.insight_count, 0);
        assert_eq!(receipt.platform, "ios");
        assert!(receipt.duplicate);
        assert_eq!(
            receipt.range,
            "2025-01-14T10:00:00Z to 2025-01-15T10:00:00Z"
        );
    }

    #[test]
    fn test_export_deserializes_summary_type_field() {
        let json = r#"{
            "schema": "synheart.hsi.export.v1",
            "export_id": "exp-2",
            "created_at_utc": "2025-01-15T10:00:00Z",
            "range": {"from_utc": "a", "to_utc": "b"},
            "device": {"platform": "android", "app_version": "1.0"},
            "summaries": [{"id": "s", "type": "hrv_daily", "timestamp": "t", "data": {"mean": 61.2}}],
            "insights": []
        }"#;
        let export: HsiExport = serde_json::from_str(json).unwrap();
        assert_eq!(export.summaries[0].kind, "hrv_daily");
        assert!(export.summaries[0].data.is_some());
    }
}
