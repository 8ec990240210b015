//! Pure signal generators.
//!
//! Each generator maps (RNG, effective config, elapsed seconds) to a
//! value. Generators never touch shared state; the orchestrator owns
//! the seeded RNG and iterates signals in a fixed order so that a
//! given seed always produces the same value stream.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::event::SignalValue;
use crate::scenario::{ScalarOrVec3, SignalConfig};

/// All signal names, in generation order.
pub const SIGNAL_NAMES: [&str; 9] = [
    "ppg.hr_bpm",
    "ppg.hrv_rmssd_ms",
    "accel.xyz_mps2",
    "gyro.xyz_rps",
    "temp.skin_c",
    "eda.us",
    "screen.state",
    "app.activity",
    "motion.activity",
];

/// Default unit for a signal when the scenario does not set one.
pub fn default_unit(signal: &str) -> &'static str {
    match signal {
        "ppg.hr_bpm" => "bpm",
        "ppg.hrv_rmssd_ms" => "ms",
        "accel.xyz_mps2" => "m/s²",
        "gyro.xyz_rps" => "rad/s",
        "temp.skin_c" => "°C",
        "eda.us" => "µS",
        _ => "",
    }
}

/// Run the generator for `signal`, or `None` for unknown names.
pub fn generate(
    signal: &str,
    rng: &mut ChaCha8Rng,
    config: &SignalConfig,
    elapsed_secs: f64,
) -> Option<SignalValue> {
    let value = match signal {
        "ppg.hr_bpm" => heart_rate(rng, config),
        "ppg.hrv_rmssd_ms" => hrv(rng, config),
        "accel.xyz_mps2" => acceleration(rng, config),
        "gyro.xyz_rps" => gyroscope(rng, config),
        "temp.skin_c" => skin_temperature(rng, config, elapsed_secs),
        "eda.us" => electrodermal(rng, config),
        "screen.state" => screen_state(rng, config),
        "app.activity" => app_activity(rng, config),
        "motion.activity" => motion_activity(rng, config),
        _ => return None,
    };
    Some(value)
}

fn heart_rate(rng: &mut ChaCha8Rng, config: &SignalConfig) -> SignalValue {
    let baseline = scalar(&config.baseline, 72.0);
    let noise = scalar(&config.noise, 3.0);

    let mut value = baseline;
    if let Some(add) = config.add {
        value += add;
    }
    if let Some(multiply) = config.multiply {
        value *= multiply;
    }
    value += normal(rng) * noise;

    SignalValue::Scalar(value.clamp(40.0, 200.0))
}

fn hrv(rng: &mut ChaCha8Rng, config: &SignalConfig) -> SignalValue {
    let baseline = scalar(&config.baseline, 50.0);
    let noise = scalar(&config.noise, 8.0);

    let mut value = baseline;
    if let Some(multiply) = config.multiply {
        value *= multiply;
    }
    value += normal(rng) * noise;

    SignalValue::Scalar(value.clamp(10.0, 150.0))
}

fn acceleration(rng: &mut ChaCha8Rng, config: &SignalConfig) -> SignalValue {
    let baseline = vector(&config.baseline, [0.0, 0.0, 9.81]);
    let noise = scalar(&config.noise, 0.05);

    SignalValue::Vector([
        baseline[0] + normal(rng) * noise,
        baseline[1] + normal(rng) * noise,
        baseline[2] + normal(rng) * noise,
    ])
}

fn gyroscope(rng: &mut ChaCha8Rng, config: &SignalConfig) -> SignalValue {
    let baseline = vector(&config.baseline, [0.0, 0.0, 0.0]);
    let noise = scalar(&config.noise, 0.02);

    SignalValue::Vector([
        baseline[0] + normal(rng) * noise,
        baseline[1] + normal(rng) * noise,
        baseline[2] + normal(rng) * noise,
    ])
}

fn skin_temperature(rng: &mut ChaCha8Rng, config: &SignalConfig, elapsed_secs: f64) -> SignalValue {
    let baseline = scalar(&config.baseline, 33.0);
    let noise = scalar(&config.noise, 0.1);

    // Slow sinusoidal drift on a ten-minute period.
    let drift = (elapsed_secs / 600.0).sin() * 0.3;
    let value = baseline + drift + normal(rng) * noise;

    SignalValue::Scalar(value.clamp(30.0, 37.0))
}

fn electrodermal(rng: &mut ChaCha8Rng, config: &SignalConfig) -> SignalValue {
    let baseline = scalar(&config.baseline, 2.0);
    let noise = scalar(&config.noise, 0.2);

    let mut value = baseline;
    if let Some(add) = config.add {
        value += add;
    }
    value += normal(rng) * noise;

    SignalValue::Scalar(value.clamp(0.1, 20.0))
}

fn screen_state(rng: &mut ChaCha8Rng, config: &SignalConfig) -> SignalValue {
    if let Some(value) = &config.value {
        return SignalValue::Label(value.clone());
    }

    let label = if rng.gen::<f64>() > 0.95 { "off" } else { "on" };
    SignalValue::Label(label.to_string())
}

fn app_activity(rng: &mut ChaCha8Rng, config: &SignalConfig) -> SignalValue {
    if let Some(value) = &config.value {
        return SignalValue::Label(value.clone());
    }

    const ACTIVITIES: [&str; 4] = ["foreground", "background", "typing", "scrolling"];
    let index = rng.gen_range(0..ACTIVITIES.len());
    SignalValue::Label(ACTIVITIES[index].to_string())
}

fn motion_activity(rng: &mut ChaCha8Rng, config: &SignalConfig) -> SignalValue {
    if let Some(value) = &config.value {
        return SignalValue::Label(value.clone());
    }

    const ACTIVITIES: [(&str, f64); 3] = [("still", 0.70), ("walk", 0.25), ("run", 0.05)];
    let roll = rng.gen::<f64>();
    let mut cumulative = 0.0;
    for (label, weight) in ACTIVITIES {
        cumulative += weight;
        if roll < cumulative {
            return SignalValue::Label(label.to_string());
        }
    }
    SignalValue::Label("still".to_string())
}

fn normal(rng: &mut ChaCha8Rng) -> f64 {
    rng.sample(StandardNormal)
}

fn scalar(field: &Option<ScalarOrVec3>, default: f64) -> f64 {
    field.map(|v| v.scalar_or(default)).unwrap_or(default)
}

fn vector(field: &Option<ScalarOrVec3>, default: [f64; 3]) -> [f64; 3] {
    field.map(|v| v.vector_or(default)).unwrap_or(default)
}
