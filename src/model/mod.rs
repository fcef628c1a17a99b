// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! Excitation model - closed-form synchronous-machine field current estimator
//!
//! Estimates the rotor field current a healthy generator would draw for its
//! present electrical output, using a per-unit phasor model of the armature
//! reaction and an empirical saturation curve. The relative deviation between
//! the measured and the estimated field current is the plant's fault signal:
//! operators flag a unit when it exceeds 5%.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Empirical EMF-to-field-current mapping, a quartic fit of the machine's
/// saturation curve. Coefficients are calibration data for one machine
/// family; evaluated on EMF scaled by 1/10 (the normalization the fit was
/// produced with).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SaturationCurve {
    pub c4: f64,
    pub c3: f64,
    pub c2: f64,
    pub c1: f64,
    pub c0: f64,
}

impl SaturationCurve {
    /// Field current (A) for an internal EMF magnitude (V).
    pub fn field_current(&self, emf: f64) -> f64 {
        let e = emf / 10.0;
        self.c4 * e.powi(4) + self.c3 * e.powi(3) + self.c2 * e.powi(2) + self.c1 * e + self.c0
    }
}

impl Default for SaturationCurve {
    fn default() -> Self {
        // Reference machine fit (22 kV, 17583 A base)
        Self {
            c4: 0.0000000007273,
            c3: -0.000004801,
            c2: 0.01191,
            c1: -12.41,
            c0: 5300.0,
        }
    }
}

/// Immutable nameplate parameters for one generator pair.
///
/// Units in the plant share a constants set pairwise, mirroring the physical
/// layout where twin units are the same machine model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MachineConstants {
    /// Stator pole count
    pub poles: f64,
    /// Stator winding DC resistance (ohm)
    pub stator_resistance: f64,
    /// Coil pitch (slots)
    pub coil_pitch: f64,
    /// Stator leakage reactance (per-unit)
    pub leakage_reactance: f64,
    /// Fraction of each rotor pole carrying embedded winding
    pub rotor_winding_fraction: f64,
    /// Rotor winding turns
    pub rotor_turns: f64,
    /// Stator slots per pole per phase
    pub slots_per_pole_phase: f64,
    /// Saturation curve for this machine family
    pub saturation: SaturationCurve,
}

impl Default for MachineConstants {
    fn default() -> Self {
        Self {
            poles: 42.0,
            stator_resistance: 0.00154,
            coil_pitch: 18.0,
            leakage_reactance: 0.135,
            rotor_winding_fraction: 0.666667,
            rotor_turns: 56.0,
            slots_per_pole_phase: 7.0,
            saturation: SaturationCurve::default(),
        }
    }
}

/// Result of one model evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Excitation {
    /// Estimated field current (A)
    pub estimated: f64,
    /// `|measured - estimated| / estimated`, 0 when the estimate is not positive
    pub deviation_ratio: f64,
}

/// Rated line voltage substituted when the measured value reads zero (V).
const DEFAULT_LINE_VOLTAGE: f64 = 22000.0;
/// Active power substituted when the measured value reads zero (kW).
const DEFAULT_ACTIVE_POWER: f64 = 100.0;
/// Armature MMF per ampere-turn constant (3*sqrt(2)/pi, fundamental of a
/// three-phase distributed winding)
const MMF_CONSTANT: f64 = 1.35047447;
/// Reference voltage (V) the leakage reactance was rebased against
const BASE_VOLTAGE: f64 = 22000.0;
/// Reference current (A) the leakage reactance was rebased against
const BASE_CURRENT: f64 = 17583.0;

/// Estimate the field current from instantaneous electrical output.
///
/// `reactive_power` in kvar, `active_power` in kW, `line_voltage` in volts,
/// `measured` field current in amperes. Zero power or voltage readings get
/// the nameplate substitutions rather than producing a degenerate phasor
/// angle. All trigonometry is in radians; a negative square-root domain
/// yields NaN, which propagates to the caller as an invalid reading.
pub fn estimate_excitation(
    constants: &MachineConstants,
    reactive_power: f64,
    active_power: f64,
    line_voltage: f64,
    measured: f64,
) -> Excitation {
    let active_power = if active_power == 0.0 { DEFAULT_ACTIVE_POWER } else { active_power };
    let line_voltage = if line_voltage == 0.0 { DEFAULT_LINE_VOLTAGE } else { line_voltage };

    // Winding geometry factors
    let pole_pitch = constants.poles / 2.0;
    let slots = constants.slots_per_pole_phase;
    let coil_pitch_factor = (constants.coil_pitch * PI / 2.0 / pole_pitch).sin();
    let distribution_factor = 0.5 / (slots * (PI / 6.0 / slots).sin());
    let winding_factor = coil_pitch_factor * distribution_factor;
    let ka = 9.8696 * constants.rotor_winding_fraction
        / (8.0 * (constants.rotor_winding_fraction * PI / 2.0).sin());

    // Power-factor angle
    let phi = reactive_power.atan2(active_power);

    // Armature current from apparent power; the 1000^2 factor carries the
    // kvar/kW inputs to VA against a volt-denominated line voltage
    let armature_current = (reactive_power.powi(2) + active_power.powi(2)).sqrt()
        / 3f64.sqrt()
        / line_voltage
        * 1000f64.powi(2);

    // Armature MMF and its equivalent field current
    let mmf = MMF_CONSTANT * constants.slots_per_pole_phase * winding_factor * armature_current;
    let mmf_field_current = mmf * ka / constants.rotor_turns;

    // Synchronous impedance, leakage reactance rebased from the reference
    // voltage/current pair
    let reactance = constants.leakage_reactance * BASE_VOLTAGE / BASE_CURRENT / 3f64.sqrt();
    let impedance = (constants.stator_resistance.powi(2) + reactance.powi(2)).sqrt();
    let delta = reactance.atan2(constants.stator_resistance);
    let impedance_voltage = 3f64.sqrt() * impedance * armature_current;

    // Internal EMF phasor: terminal voltage plus the impedance drop rotated
    // by the power-factor angle
    let emf = ((impedance_voltage * (delta - phi).sin()).powi(2)
        + (line_voltage + impedance_voltage * (delta - phi).cos()).powi(2))
    .sqrt();
    let delta1 = (impedance_voltage * (delta - phi).sin())
        .atan2(line_voltage + impedance_voltage * (delta - phi).cos());
    let alpha = delta1 + PI / 2.0 + phi;

    let emf_field_current = constants.saturation.field_current(emf);

    // Law of cosines combination of the two field-current contributions
    let estimated = (emf_field_current.powi(2) + mmf_field_current.powi(2)
        - 2.0 * emf_field_current * mmf_field_current * alpha.cos())
    .sqrt();

    let deviation_ratio = if estimated > 0.0 {
        ((measured - estimated) / estimated).abs()
    } else {
        0.0
    };

    Excitation { estimated, deviation_ratio }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) {
        assert!(
            (a - b).abs() <= b.abs() * 1e-9,
            "expected {b}, got {a}"
        );
    }

    #[test]
    fn test_zero_inputs_use_nameplate_defaults() {
        // Regression pin: all-zero telemetry must not produce a degenerate
        // angle; with the substituted 100 kW / 22 kV operating point the
        // reference machine estimates this exact current.
        let c = MachineConstants::default();
        let e = estimate_excitation(&c, 0.0, 0.0, 0.0, 0.0);
        close(e.estimated, 1616.381465058902);
        close(e.deviation_ratio, 1.0);
    }

    #[test]
    fn test_golden_operating_point() {
        // Pinned from the reference formula: Q=-100 kvar, P=200 kW,
        // 20 kV line voltage, 2000 A measured field current.
        let c = MachineConstants::default();
        let e = estimate_excitation(&c, -100.0, 200.0, 20000.0, 2000.0);
        close(e.estimated, 1277.1213927101219);
        close(e.deviation_ratio, 0.5660218452342184);
    }

    #[test]
    fn test_ratio_non_negative() {
        let c = MachineConstants::default();
        for (q, p, v, m) in [
            (500.0, 1500.0, 22000.0, 4000.0),
            (-800.0, 300.0, 21000.0, 100.0),
            (0.0, 2500.0, 19500.0, 9000.0),
            (1200.0, 0.0, 0.0, 0.0),
        ] {
            let e = estimate_excitation(&c, q, p, v, m);
            assert!(e.deviation_ratio >= 0.0, "ratio negative for ({q},{p},{v},{m})");
        }
    }

    #[test]
    fn test_deterministic() {
        let c = MachineConstants::default();
        let a = estimate_excitation(&c, 500.0, 1500.0, 22000.0, 4000.0);
        let b = estimate_excitation(&c, 500.0, 1500.0, 22000.0, 4000.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_measured_equals_estimate_gives_zero_ratio() {
        let c = MachineConstants::default();
        let first = estimate_excitation(&c, -100.0, 200.0, 20000.0, 0.0);
        let second = estimate_excitation(&c, -100.0, 200.0, 20000.0, first.estimated);
        close(second.deviation_ratio + 1.0, 1.0);
    }

    #[test]
    fn test_saturation_curve_open_circuit_point() {
        // At zero EMF the fit returns the c0 intercept.
        let s = SaturationCurve::default();
        assert_eq!(s.field_current(0.0), 5300.0);
    }
}
