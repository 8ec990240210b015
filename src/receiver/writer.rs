//! Output writers for received exports.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::MockError;

use super::export::HsiExport;

/// Output serialization for received exports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Newline-delimited compact JSON
    Ndjson,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, MockError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "ndjson" => Ok(OutputFormat::Ndjson),
            other => Err(MockError::Config(format!(
                "invalid format {other:?} (expected: json|ndjson)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Ndjson => "ndjson",
        }
    }

    fn serialize(&self, export: &HsiExport) -> Result<Vec<u8>, MockError> {
        let mut data = match self {
            OutputFormat::Json => serde_json::to_vec_pretty(export)?,
            OutputFormat::Ndjson => serde_json::to_vec(export)?,
        };
        data.push(b'\n');
        Ok(data)
    }
}

/// Destination for validated export payloads
pub trait ExportWriter: Send + Sync {
    fn write(&self, export: &HsiExport) -> Result<(), MockError>;

    fn close(&self) -> Result<(), MockError> {
        Ok(())
    }
}

/// Writes exports to an output stream (stdout by default)
pub struct StdoutWriter {
    out: Mutex<Box<dyn Write + Send>>,
    format: OutputFormat,
}

impl StdoutWriter {
    pub fn new(format: OutputFormat) -> Self {
        StdoutWriter::with_output(Box::new(std::io::stdout()), format)
    }

    pub fn with_output(out: Box<dyn Write + Send>, format: OutputFormat) -> Self {
        StdoutWriter {
            out: Mutex::new(out),
            format,
        }
    }
}

impl ExportWriter for StdoutWriter {
    fn write(&self, export: &HsiExport) -> Result<(), MockError> {
        let data = self.format.serialize(export)?;
        let mut out = self.out.lock().unwrap();
        out.write_all(&data)?;
        out.flush()?;
        Ok(())
    }
}

/// Writes each export to `synheart_export_<export_id>.json` in a
/// directory
pub struct FileWriter {
    dir: PathBuf,
    format: OutputFormat,
}

impl FileWriter {
    /// Creates the output directory when missing.
    pub fn new(dir: &Path, format: OutputFormat) -> Result<Self, MockError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            MockError::Config(format!(
                "failed to create output directory {}: {e}",
                dir.display()
            ))
        })?;

        Ok(FileWriter {
            dir: dir.to_path_buf(),
            format,
        })
    }
}

impl ExportWriter for FileWriter {
    fn write(&self, export: &HsiExport) -> Result<(), MockError> {
        let path = self
            .dir
            .join(format!("synheart_export_{}.json", export.export_id));
        std::fs::write(&path, self.format.serialize(export)?)?;
        Ok(())
    }
}

/// Fans every export out to multiple writers
pub struct MultiWriter {
    writers: Vec<Box<dyn ExportWriter>>,
}

impl MultiWriter {
    pub fn new(writers: Vec<Box<dyn ExportWriter>>) -> Self {
        MultiWriter { writers }
    }
}

impl ExportWriter for MultiWriter {
    fn write(&self, export: &HsiExport) -> Result<(), MockError> {
        for writer in &self.writers {
            writer.write(export)?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), MockError> {
        for writer in &self.writers {
            writer.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::export::{ExportDevice, ExportRange};
    use std::sync::Arc;

    fn sample_export(id: &str) -> HsiExport {
        HsiExport {
            schema: super::super::export::EXPORT_SCHEMA.to_string(),
            export_id: id.to_string(),
            created_at_utc: "2025-01-15T10:00:00Z".to_string(),
            range: ExportRange {
                from_utc: "2025-01-14T10:00:00Z".to_string(),
                to_utc: "2025-01-15T10:00:00Z".to_string(),
            },
            device: ExportDevice {
                platform: "ios".to_string(),
                app_version: "2.4.1".to_string(),
            },
            summaries: Vec::new(),
            insights: Vec::new(),
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(OutputFormat::parse("json").unwrap(), OutputFormat::Json);
        assert_eq!(
            OutputFormat::parse(" NDJSON ").unwrap(),
            OutputFormat::Ndjson
        );
        assert!(OutputFormat::parse("yaml").is_err());
    }

    #[test]
    fn test_ndjson_writer_emits_single_line() {
        let buffer = SharedBuffer::default();
        let writer =
            StdoutWriter::with_output(Box::new(buffer.clone()), OutputFormat::Ndjson);
        writer.write(&sample_export("exp-1")).unwrap();

        let contents = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        let parsed: HsiExport = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(parsed.export_id, "exp-1");
    }

    #[test]
    fn test_json_writer_pretty_prints() {
        let buffer = SharedBuffer::default();
        let writer = StdoutWriter::with_output(Box::new(buffer.clone()), OutputFormat::Json);
        writer.write(&sample_export("exp-2")).unwrap();

        let contents = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(contents.lines().count() > 1);
    }

    #[test]
    fn test_file_writer_names_file_after_export_id() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("exports");

        let writer = FileWriter::new(&out_dir, OutputFormat::Json).unwrap();
        writer.write(&sample_export("abc123")).unwrap();

        let path = out_dir.join("synheart_export_abc123.json");
        let parsed: HsiExport =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.export_id, "abc123");
    }

    #[test]
    fn test_multi_writer_fans_out() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = SharedBuffer::default();

        let writer = MultiWriter::new(vec![
            Box::new(StdoutWriter::with_output(
                Box::new(buffer.clone()),
                OutputFormat::Ndjson,
            )),
            Box::new(FileWriter::new(dir.path(), OutputFormat::Json).unwrap()),
        ]);
        writer.write(&sample_export("multi")).unwrap();
        writer.close().unwrap();

        assert!(!buffer.0.lock().unwrap().is_empty());
        assert!(dir.path().join("synheart_export_multi.json").exists());
    }
}
