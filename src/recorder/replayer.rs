//! Replays NDJSON recordings with their original inter-record timing.
//!
//! Records are emitted as raw lines so heterogeneous recordings
//! (envelopes, vendor payloads, HSI snapshots) all replay. Pacing
//! comes from whichever timestamp the record carries: the envelope
//! `ts` field, else a nested `provenance.observed_at_utc`, else a
//! fixed fallback delay.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::MockError;
use crate::event::Event;

/// Delay between records that carry no usable timestamp
const FALLBACK_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct RecordingInfo {
    count: usize,
    first_event: Option<Event>,
}

/// Replays a recording file at a configurable speed
pub struct Replayer {
    path: PathBuf,
    speed: f64,
    loop_playback: bool,
    info: Option<RecordingInfo>,
}

impl Replayer {
    pub fn new(path: impl Into<PathBuf>, speed: f64, loop_playback: bool) -> Self {
        Replayer {
            path: path.into(),
            speed,
            loop_playback,
            info: None,
        }
    }

    /// Number of records in the file. Scans once and caches.
    pub fn count(&mut self) -> Result<usize, MockError> {
        Ok(self.load_info()?.count)
    }

    /// First record parsed as an envelope, when it is one.
    pub fn first_record(&mut self) -> Result<Option<Event>, MockError> {
        Ok(self.load_info()?.first_event.clone())
    }

    fn load_info(&mut self) -> Result<&RecordingInfo, MockError> {
        if self.info.is_none() {
            let contents = std::fs::read_to_string(&self.path).map_err(|e| {
                MockError::Replay(format!(
                    "failed to open recording {}: {e}",
                    self.path.display()
                ))
            })?;

            let mut count = 0;
            let mut first_event = None;
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                count += 1;
                if count == 1 {
                    first_event = serde_json::from_str::<Event>(line).ok();
                }
            }

            self.info = Some(RecordingInfo { count, first_event });
        }

        Ok(self.info.as_ref().unwrap())
    }

    /// Replay the recording, sending each raw line to `output` with
    /// the original pacing scaled by `1/speed`. Loops from the start
    /// when configured, until cancelled.
    pub async fn replay(
        &mut self,
        cancel: CancellationToken,
        output: mpsc::Sender<String>,
    ) -> Result<(), MockError> {
        loop {
            self.replay_once(&cancel, &output).await?;

            if !self.loop_playback || cancel.is_cancelled() {
                return Ok(());
            }
            debug!(path = %self.path.display(), "looping replay");
        }
    }

    async fn replay_once(
        &self,
        cancel: &CancellationToken,
        output: &mpsc::Sender<String>,
    ) -> Result<(), MockError> {
        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            MockError::Replay(format!(
                "failed to open recording {}: {e}",
                self.path.display()
            ))
        })?;
        let mut lines = tokio::io::BufReader::new(file).lines();

        let mut last_timestamp: Option<DateTime<Utc>> = None;
        let mut emitted = 0usize;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let timestamp = extract_timestamp(&line);

            if emitted > 0 {
                let delay = match (last_timestamp, timestamp) {
                    (Some(previous), Some(current)) => {
                        let delta = (current - previous)
                            .to_std()
                            .unwrap_or(Duration::ZERO);
                        if self.speed != 1.0 {
                            delta.div_f64(self.speed)
                        } else {
                            delta
                        }
                    }
                    _ => FALLBACK_DELAY,
                };

                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }

            if timestamp.is_some() {
                last_timestamp = timestamp;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                sent = output.send(line) => {
                    if sent.is_err() {
                        return Err(MockError::ChannelClosed);
                    }
                }
            }
            emitted += 1;
        }

        info!(records = emitted, path = %self.path.display(), "replay pass complete");
        Ok(())
    }
}

/// Timestamp of a record: envelope `ts`, else
/// `provenance.observed_at_utc`, else none.
fn extract_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;

    let raw = value["ts"]
        .as_str()
        .or_else(|| value["provenance"]["observed_at_utc"].as_str())?;

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Instant;

    fn envelope_line(sequence: u64, ts: &str) -> String {
        format!(
            r#"{{"schema_version":"hsi.input.v1","event_id":"evt-{sequence}","ts":"{ts}","source":{{"type":"wearable","id":"mock-watch-01"}},"session":{{"run_id":"run","scenario":"baseline","seed":42}},"signal":{{"name":"ppg.hr_bpm","unit":"bpm","value":72.0,"quality":1.0}},"meta":{{"sequence":{sequence}}}}}"#
        )
    }

    fn write_recording(lines: &[String]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.ndjson");
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        (dir, path)
    }

    async fn collect(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = rx.recv().await {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_count_and_first_record_cached_scan() {
        let (_dir, path) = write_recording(&[
            envelope_line(1, "2025-01-15T10:00:00.000000000Z"),
            envelope_line(2, "2025-01-15T10:00:00.100000000Z"),
            envelope_line(3, "2025-01-15T10:00:00.200000000Z"),
        ]);

        let mut replayer = Replayer::new(&path, 1.0, false);
        assert_eq!(replayer.count().unwrap(), 3);

        let first = replayer.first_record().unwrap().unwrap();
        assert_eq!(first.meta.sequence, 1);
        assert_eq!(first.session.scenario, "baseline");
    }

    #[test]
    fn test_first_record_none_for_non_envelope_lines() {
        let (_dir, path) = write_recording(&[r#"{"dailies":[]}"#.to_string()]);
        let mut replayer = Replayer::new(&path, 1.0, false);
        assert_eq!(replayer.count().unwrap(), 1);
        assert!(replayer.first_record().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replay_preserves_order_and_count() {
        let (_dir, path) = write_recording(&[
            envelope_line(1, "2025-01-15T10:00:00.000000000Z"),
            envelope_line(2, "2025-01-15T10:00:00.010000000Z"),
            envelope_line(3, "2025-01-15T10:00:00.020000000Z"),
        ]);

        let (tx, rx) = mpsc::channel(16);
        let mut replayer = Replayer::new(&path, 1.0, false);
        replayer.replay(CancellationToken::new(), tx).await.unwrap();

        let lines = collect(rx).await;
        assert_eq!(lines.len(), 3);
        for (i, line) in lines.iter().enumerate() {
            let event: Event = serde_json::from_str(line).unwrap();
            assert_eq!(event.meta.sequence, i as u64 + 1);
        }
    }

    #[tokio::test]
    async fn test_speed_scales_intervals() {
        // 400ms of recorded spacing replayed at 2x should take ~200ms.
        let (_dir, path) = write_recording(&[
            envelope_line(1, "2025-01-15T10:00:00.000000000Z"),
            envelope_line(2, "2025-01-15T10:00:00.200000000Z"),
            envelope_line(3, "2025-01-15T10:00:00.400000000Z"),
        ]);

        let (tx, rx) = mpsc::channel(16);
        let mut replayer = Replayer::new(&path, 2.0, false);

        let started = Instant::now();
        replayer.replay(CancellationToken::new(), tx).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(collect(rx).await.len(), 3);
        assert!(
            elapsed >= Duration::from_millis(150) && elapsed < Duration::from_millis(400),
            "elapsed {elapsed:?} outside expected window"
        );
    }

    #[tokio::test]
    async fn test_provenance_timestamps_pace_vendor_recordings() {
        let (_dir, path) = write_recording(&[
            r#"{"provenance":{"observed_at_utc":"2025-01-15T10:00:00Z"},"windows":[]}"#
                .to_string(),
            r#"{"provenance":{"observed_at_utc":"2025-01-15T10:00:00.050Z"},"windows":[]}"#
                .to_string(),
        ]);

        let (tx, rx) = mpsc::channel(16);
        let mut replayer = Replayer::new(&path, 1.0, false);
        replayer.replay(CancellationToken::new(), tx).await.unwrap();
        assert_eq!(collect(rx).await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_timestamps_use_fallback_delay() {
        let (_dir, path) = write_recording(&[
            r#"{"a":1}"#.to_string(),
            r#"{"a":2}"#.to_string(),
        ]);

        let (tx, rx) = mpsc::channel(16);
        let mut replayer = Replayer::new(&path, 1.0, false);

        let started = Instant::now();
        replayer.replay(CancellationToken::new(), tx).await.unwrap();

        assert_eq!(collect(rx).await.len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_loop_replays_until_cancelled() {
        let (_dir, path) = write_recording(&[
            envelope_line(1, "2025-01-15T10:00:00.000000000Z"),
            envelope_line(2, "2025-01-15T10:00:00.001000000Z"),
        ]);

        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let mut replayer = Replayer::new(&path, 1.0, true);

        let replay_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            replayer.replay(replay_cancel, tx).await
        });

        // More lines than one pass holds proves it looped.
        let mut received = 0;
        while received < 6 {
            if rx.recv().await.is_some() {
                received += 1;
            } else {
                break;
            }
        }
        assert!(received >= 6);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("looping replay did not stop on cancel")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_recorded_run_replays_in_original_order() {
        use crate::generator::{Generator, GeneratorConfig};
        use crate::recorder::Recorder;
        use crate::scenario::{Engine, ScalarOrVec3, Scenario, SignalConfig};
        use std::collections::HashMap;

        let mut signals = HashMap::new();
        signals.insert(
            "ppg.hr_bpm".to_string(),
            SignalConfig {
                baseline: Some(ScalarOrVec3::Scalar(72.0)),
                noise: Some(ScalarOrVec3::Scalar(3.0)),
                rate: Some("1hz".to_string()),
                ..Default::default()
            },
        );
        signals.insert(
            "eda.us".to_string(),
            SignalConfig {
                baseline: Some(ScalarOrVec3::Scalar(2.0)),
                rate: Some("1hz".to_string()),
                ..Default::default()
            },
        );

        let mut generator = Generator::new(
            Engine::new(Scenario {
                name: "baseline".to_string(),
                duration: "unlimited".to_string(),
                signals,
                ..Default::default()
            }),
            GeneratorConfig {
                seed: 42,
                tick_period: Duration::from_secs(1),
                source_type: crate::event::SourceType::Wearable,
                source_id: "mock-watch-01".to_string(),
                source_side: None,
            },
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.ndjson");
        let recorder = Recorder::create(&path).unwrap();

        let mut produced = 0;
        for second in 0..5 {
            for event in generator.tick_at(Duration::from_secs(second)) {
                recorder.record(&event).unwrap();
                produced += 1;
            }
        }
        recorder.close().unwrap();

        let (tx, rx) = mpsc::channel(64);
        let mut replayer = Replayer::new(&path, 1.0, false);
        assert_eq!(replayer.count().unwrap(), produced);

        replayer.replay(CancellationToken::new(), tx).await.unwrap();

        let lines = collect(rx).await;
        assert_eq!(lines.len(), produced);
        let sequences: Vec<u64> = lines
            .iter()
            .map(|line| serde_json::from_str::<Event>(line).unwrap().meta.sequence)
            .collect();
        for (index, sequence) in sequences.iter().enumerate() {
            assert_eq!(*sequence, index as u64 + 1);
        }
    }

    #[test]
    fn test_missing_file_errors() {
        let mut replayer = Replayer::new("/nonexistent/recording.ndjson", 1.0, false);
        assert!(matches!(replayer.count(), Err(MockError::Replay(_))));
    }
}
