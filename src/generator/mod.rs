//! Generator orchestrator: drives the scenario engine at a fixed tick,
//! runs the per-signal generators, applies the correlation pass, and
//! emits envelopes on a bounded channel.

pub mod correlations;
pub mod signals;
pub mod vendor;

pub use correlations::CorrelationBag;
pub use vendor::{VendorAggregator, VendorKind};

use std::collections::HashMap;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::MockError;
use crate::event::{Event, Session, Signal, Source, SourceSide, SourceType};
use crate::scenario::{parse_rate, Engine, SignalConfig};

/// Capacity of the generator's output channel
pub const OUTPUT_CHANNEL_CAPACITY: usize = 100;

/// Generator configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Seed for the deterministic value stream
    pub seed: i64,
    /// Tick period of the generation loop
    pub tick_period: Duration,
    pub source_type: SourceType,
    pub source_id: String,
    pub source_side: Option<SourceSide>,
}

/// Produces timed signal envelopes from a scenario
pub struct Generator {
    engine: Engine,
    rng: ChaCha8Rng,
    run_id: String,
    seed: i64,
    tick_period: Duration,
    source: Source,
    sequence: u64,
    last_emit: HashMap<&'static str, Duration>,
}

impl Generator {
    /// Build a generator with a fresh run id. Wearable sources default
    /// to the left side when none is given.
    pub fn new(engine: Engine, config: GeneratorConfig) -> Self {
        let side = match (config.source_side, config.source_type) {
            (None, SourceType::Wearable) => Some(SourceSide::Left),
            (side, _) => side,
        };

        Generator {
            engine,
            rng: ChaCha8Rng::seed_from_u64(config.seed as u64),
            run_id: Uuid::new_v4().to_string(),
            seed: config.seed,
            tick_period: config.tick_period,
            source: Source {
                kind: config.source_type,
                id: config.source_id,
                side,
            },
            sequence: 0,
            last_emit: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run the generation loop until the scenario completes or the
    /// token is cancelled. A full output channel blocks the generator,
    /// never the dispatcher behind it.
    pub async fn run(
        &mut self,
        cancel: CancellationToken,
        output: mpsc::Sender<Event>,
    ) -> Result<(), MockError> {
        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            run_id = %self.run_id,
            scenario = %self.engine.scenario().name,
            seed = self.seed,
            "generator started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(run_id = %self.run_id, "generator cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let elapsed = start.elapsed();
                    if self.engine.is_complete(elapsed) {
                        info!(run_id = %self.run_id, emitted = self.sequence, "scenario complete");
                        return Ok(());
                    }

                    for event in self.tick_at(elapsed) {
                        tokio::select! {
                            sent = output.send(event) => {
                                if sent.is_err() {
                                    return Err(MockError::ChannelClosed);
                                }
                            }
                            _ = cancel.cancelled() => return Ok(()),
                        }
                    }
                }
            }
        }
    }

    /// Generate all envelopes due at the given elapsed time.
    ///
    /// This is the whole per-tick algorithm with the clock supplied by
    /// the caller, so tests can run it against simulated time.
    pub fn tick_at(&mut self, elapsed: Duration) -> Vec<Event> {
        let elapsed_secs = elapsed.as_secs_f64();
        let mut bag = CorrelationBag::new();

        // One generation round for every signal that is due.
        for name in signals::SIGNAL_NAMES {
            let Some(config) = self.engine.effective_config(name, elapsed) else {
                continue;
            };

            let period = signal_period(&config);
            if let Some(last) = self.last_emit.get(name) {
                if elapsed.saturating_sub(*last) < period {
                    continue;
                }
            }

            if let Some(value) = signals::generate(name, &mut self.rng, &config, elapsed_secs) {
                bag.insert(name, value);
                self.last_emit.insert(name, elapsed);
            }
        }

        bag.apply_correlations();

        // Envelope construction from the correlated values.
        let mut events = Vec::new();
        for name in signals::SIGNAL_NAMES {
            let Some(value) = bag.get(name).cloned() else {
                continue;
            };
            let Some(config) = self.engine.effective_config(name, elapsed) else {
                continue;
            };

            self.sequence += 1;
            let unit = config
                .unit
                .clone()
                .unwrap_or_else(|| signals::default_unit(name).to_string());

            events.push(Event::new(
                Uuid::new_v4().to_string(),
                self.source.clone(),
                Session {
                    run_id: self.run_id.clone(),
                    scenario: self.engine.scenario().name.clone(),
                    seed: self.seed,
                },
                Signal {
                    name: name.to_string(),
                    unit,
                    value,
                    quality: 0.9 + self.rng.gen::<f64>() * 0.1,
                },
                self.sequence,
            ));
        }

        events
    }
}

/// Minimum emission period for a signal: its configured rate, else 1 Hz.
fn signal_period(config: &SignalConfig) -> Duration {
    config
        .rate
        .as_deref()
        .and_then(|rate| parse_rate(rate).ok())
        .unwrap_or(Duration::from_secs(1))
}
