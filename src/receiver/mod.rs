//! Local HTTP receiver for HSI exports: payload model, output
//! writers, and the ingestion server.

pub mod export;
pub mod server;
pub mod writer;

pub use export::{ExportReceipt, HsiExport, ValidationError, EXPORT_SCHEMA};
pub use server::{generate_token, ReceiverConfig, ReceiverServer, Stats};
pub use writer::{ExportWriter, FileWriter, MultiWriter, OutputFormat, StdoutWriter};
