//! Synheart Mock - Synthetic HSI sensor-data generator and broadcaster
//!
//! Replaces physical wearable/phone devices during SDK development
//! with a scenario-driven real-time pipeline: seeded signal generation
//! → correlation shaping → fan-out dispatch → WebSocket / SSE / UDP
//! broadcast, plus a symmetrical record/replay subsystem and a local
//! receiver endpoint for derived-summary exports.
//!
//! ## Modules
//!
//! - **scenario**: declarative phase timelines and effective signal
//!   configuration
//! - **generator**: seeded signal generators, correlations, and the
//!   tick orchestrator
//! - **dispatcher**: non-blocking multi-subscriber fan-out
//! - **transport**: WebSocket, Server-Sent Events, and UDP broadcast
//!   servers
//! - **recorder**: NDJSON recording and timing-preserving replay
//! - **receiver**: validating, idempotent HTTP import endpoint

pub mod dispatcher;
pub mod encoding;
pub mod error;
pub mod event;
pub mod flux;
pub mod generator;
pub mod receiver;
pub mod recorder;
pub mod scenario;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use error::MockError;
pub use event::{Event, Signal, SignalValue, Source, SourceSide, SourceType, SCHEMA_VERSION};
pub use generator::{Generator, GeneratorConfig};
pub use scenario::{Engine, Registry, Scenario};

/// Mock version embedded in banners and the receiver identity payload
pub const MOCK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for operator-facing output
pub const PRODUCER_NAME: &str = "synheart-mock";

/// Default base port; SSE binds base+1, UDP base+2
pub const DEFAULT_PORT: u16 = 8787;
