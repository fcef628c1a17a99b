// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! Telemetry data model - per-generator records and cycle batches

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::codec::RawMeasurements;
use crate::model::Excitation;

/// One generator's current telemetry, raw and derived.
///
/// Raw fields are written only by the acquisition pipeline, derived fields
/// only by the model invocation that immediately follows a raw update.
/// Consumers receive complete copies inside a [`GeneratorBatch`] snapshot
/// and never observe a half-written record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorRecord {
    /// Stable unit number, 1..N
    pub generator_id: u16,

    // Raw measurements
    /// Phase A current (A)
    pub phase_a_current: f64,
    /// Phase B current (A)
    pub phase_b_current: f64,
    /// Phase C current (A)
    pub phase_c_current: f64,
    /// Electrical frequency (Hz)
    pub frequency: f64,
    /// Reactive power (kvar)
    pub reactive_power: f64,
    /// Active power (kW)
    pub active_power: f64,
    /// Line-to-line voltage (kV)
    pub line_voltage: f64,
    /// Field winding voltage (V)
    pub excitation_voltage: f64,
    /// Measured field current (A)
    pub excitation_current: f64,

    // Derived by the excitation model
    /// Model-estimated field current (A)
    pub estimated_excitation_current: f64,
    /// `|measured - estimated| / estimated`; the fault-detection signal
    pub deviation_ratio: f64,
    /// Mean deviation ratio over the recent window
    pub ratio_rolling_avg: f64,

    /// Wall-clock time of the last update, non-decreasing per generator
    pub last_update: Option<DateTime<Utc>>,
}

impl GeneratorRecord {
    pub fn new(generator_id: u16) -> Self {
        Self {
            generator_id,
            phase_a_current: 0.0,
            phase_b_current: 0.0,
            phase_c_current: 0.0,
            frequency: 0.0,
            reactive_power: 0.0,
            active_power: 0.0,
            line_voltage: 0.0,
            excitation_voltage: 0.0,
            excitation_current: 0.0,
            estimated_excitation_current: 0.0,
            deviation_ratio: 0.0,
            ratio_rolling_avg: 0.0,
            last_update: None,
        }
    }

    /// Apply one cycle's decoded measurements and model output.
    ///
    /// The timestamp is clamped so `last_update` never moves backwards even
    /// if the wall clock does.
    pub fn apply(&mut self, raw: &RawMeasurements, excitation: Excitation, now: DateTime<Utc>) {
        self.phase_a_current = raw.phase_a_current;
        self.phase_b_current = raw.phase_b_current;
        self.phase_c_current = raw.phase_c_current;
        self.frequency = raw.frequency;
        self.reactive_power = raw.reactive_power;
        self.active_power = raw.active_power;
        self.line_voltage = raw.line_voltage;
        self.excitation_voltage = raw.excitation_voltage;
        self.excitation_current = raw.excitation_current;

        self.estimated_excitation_current = excitation.estimated;
        self.deviation_ratio = excitation.deviation_ratio;

        self.last_update = Some(match self.last_update {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }

    /// True when the derived fields hold a usable fault signal.
    ///
    /// A NaN estimate means the model hit a degenerate reading; consumers
    /// must treat it as "no signal available", not as zero deviation.
    pub fn is_valid(&self) -> bool {
        self.estimated_excitation_current.is_finite() && self.deviation_ratio.is_finite()
    }
}

/// Immutable snapshot of every generator after one poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorBatch {
    /// Monotonic cycle counter
    pub sequence: u64,
    /// Cycle completion time
    pub timestamp: DateTime<Utc>,
    /// One record per configured generator, ordered by id
    pub generators: Vec<GeneratorRecord>,
}

impl GeneratorBatch {
    pub fn generator(&self, generator_id: u16) -> Option<&GeneratorRecord> {
        self.generators.iter().find(|g| g.generator_id == generator_id)
    }
}

/// Fixed-capacity rolling mean of the deviation ratio.
///
/// Non-finite samples are skipped so one invalid cycle cannot poison the
/// average.
#[derive(Debug, Clone)]
pub struct RatioWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RatioWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, ratio: f64) {
        if !ratio.is_finite() {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(ratio);
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Excitation;

    #[test]
    fn test_timestamp_never_regresses() {
        let mut record = GeneratorRecord::new(1);
        let raw = RawMeasurements::default();
        let exc = Excitation { estimated: 0.0, deviation_ratio: 0.0 };

        let later = Utc::now();
        let earlier = later - chrono::Duration::seconds(5);

        record.apply(&raw, exc, later);
        record.apply(&raw, exc, earlier);
        assert_eq!(record.last_update, Some(later));
    }

    #[test]
    fn test_invalid_estimate_flags_record() {
        let mut record = GeneratorRecord::new(3);
        let raw = RawMeasurements::default();
        record.apply(
            &raw,
            Excitation { estimated: f64::NAN, deviation_ratio: f64::NAN },
            Utc::now(),
        );
        assert!(!record.is_valid());
    }

    #[test]
    fn test_ratio_window_rolls() {
        let mut window = RatioWindow::new(3);
        for r in [0.01, 0.02, 0.03, 0.04] {
            window.push(r);
        }
        // First sample evicted, mean of the last three
        assert!((window.mean() - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_ratio_window_skips_non_finite() {
        let mut window = RatioWindow::new(4);
        window.push(0.02);
        window.push(f64::NAN);
        window.push(0.04);
        assert!((window.mean() - 0.03).abs() < 1e-12);
    }
}
