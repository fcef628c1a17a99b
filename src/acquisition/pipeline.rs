// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! Acquisition pipeline - one poll cycle: read, decode, model, commit

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{AcquisitionError, RegisterTransport};
use crate::codec::{self, RawMeasurements, RegisterLayout};
use crate::config::{AcquisitionConfig, TransportConfig};
use crate::model::{estimate_excitation, MachineConstants};
use crate::telemetry::{GeneratorBatch, GeneratorRecord, RatioWindow};

/// Drives the acquire -> decode -> model -> commit cycle for the whole
/// generator set.
///
/// A cycle is atomic with respect to the set: raw registers for every
/// generator are read before any record is touched, so a transport error
/// leaves all records at their previous values. A bad register slice for
/// one generator is isolated - that unit keeps its previous values while
/// the rest of the batch updates.
pub struct AcquisitionPipeline {
    transport: Box<dyn RegisterTransport>,
    layout: RegisterLayout,
    base_address: u16,
    records: Vec<GeneratorRecord>,
    windows: Vec<RatioWindow>,
    constants: Vec<MachineConstants>,
    sequence: u64,
}

impl AcquisitionPipeline {
    /// Build the pipeline with records pre-created for every configured
    /// generator. Configuration is validated before this is called; the
    /// constants arena covers every generator pair.
    pub fn new(
        transport: Box<dyn RegisterTransport>,
        transport_config: &TransportConfig,
        acquisition_config: &AcquisitionConfig,
        constants: Vec<MachineConstants>,
    ) -> Self {
        let count = transport_config.generator_count as usize;
        Self {
            transport,
            layout: transport_config.layout,
            base_address: transport_config.base_address,
            records: (1..=transport_config.generator_count).map(GeneratorRecord::new).collect(),
            windows: (0..count).map(|_| RatioWindow::new(acquisition_config.ratio_window)).collect(),
            constants,
            sequence: 0,
        }
    }

    pub fn generator_count(&self) -> usize {
        self.records.len()
    }

    /// Current records, for inspection; consumers get snapshots from
    /// [`poll_once`](Self::poll_once).
    pub fn records(&self) -> &[GeneratorRecord] {
        &self.records
    }

    /// Run one full poll cycle and return the committed snapshot.
    ///
    /// Errors are transport-level only; they abort the cycle before any
    /// record is modified, and the caller retries at its next tick.
    pub async fn poll_once(&mut self) -> Result<Arc<GeneratorBatch>, AcquisitionError> {
        let stride = self.layout.stride();

        // Reading: fetch every generator's block up front. Devices cap a
        // single Modbus read at 125 registers, so the set is read one
        // generator at a time.
        let mut blocks = Vec::with_capacity(self.records.len());
        for i in 0..self.records.len() {
            let address = self.base_address + i as u16 * stride;
            let regs = self.transport.read_registers(address, stride).await?;
            blocks.push(regs);
        }

        // Decoding + modeling: commit per generator, isolating bad slices.
        let now = Utc::now();
        for (i, regs) in blocks.iter().enumerate() {
            let generator_id = self.records[i].generator_id;
            let raw = match self.decode_generator(generator_id, regs) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("{e}; keeping previous values");
                    continue;
                }
            };

            let constants = &self.constants[i / 2];
            // Records carry line voltage in kV; the model takes volts.
            let excitation = estimate_excitation(
                constants,
                raw.reactive_power,
                raw.active_power,
                raw.line_voltage * 1000.0,
                raw.excitation_current,
            );
            if !excitation.estimated.is_finite() {
                warn!(
                    "generator {}: model produced a non-finite estimate, reading marked invalid",
                    generator_id
                );
            }

            let record = &mut self.records[i];
            record.apply(&raw, excitation, now);
            self.windows[i].push(excitation.deviation_ratio);
            record.ratio_rolling_avg = self.windows[i].mean();
        }

        self.sequence += 1;
        debug!("Cycle {} committed for {} generators", self.sequence, self.records.len());

        Ok(Arc::new(GeneratorBatch {
            sequence: self.sequence,
            timestamp: now,
            generators: self.records.clone(),
        }))
    }

    fn decode_generator(
        &self,
        generator_id: u16,
        regs: &[u16],
    ) -> Result<RawMeasurements, AcquisitionError> {
        codec::decode_block(self.layout, regs).ok_or(AcquisitionError::Decode {
            generator_id,
            expected: self.layout.stride() as usize,
            got: regs.len(),
        })
    }

    /// Release the transport connection. Called once the driving loop has
    /// stopped, never mid-cycle.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Transport disconnect failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::TransportError;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct MockTransport {
        responses: VecDeque<Result<Vec<u16>, TransportError>>,
    }

    impl MockTransport {
        fn new(responses: Vec<Result<Vec<u16>, TransportError>>) -> Self {
            Self { responses: responses.into() }
        }
    }

    #[async_trait]
    impl RegisterTransport for MockTransport {
        async fn read_registers(
            &mut self,
            _address: u16,
            _count: u16,
        ) -> Result<Vec<u16>, TransportError> {
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connection("script exhausted".into())))
        }
    }

    fn wide_block(values: [f32; 9]) -> Vec<u16> {
        let mut regs = Vec::with_capacity(18);
        for v in values {
            let bits = v.to_bits();
            regs.push((bits >> 16) as u16);
            regs.push((bits & 0xFFFF) as u16);
        }
        regs
    }

    /// Q=-100 kvar, P=200 kW, 20 kV, 2000 A measured field current.
    fn golden_block() -> Vec<u16> {
        wide_block([4200.0, 4180.0, 4210.0, 50.0, -100.0, 200.0, 20.0, 310.0, 2000.0])
    }

    fn test_configs(count: u16) -> (TransportConfig, AcquisitionConfig) {
        let transport = TransportConfig {
            generator_count: count,
            layout: RegisterLayout::Wide,
            ..TransportConfig::default()
        };
        (transport, AcquisitionConfig::default())
    }

    fn pairs_for(count: u16) -> Vec<MachineConstants> {
        vec![MachineConstants::default(); (count as usize).div_ceil(2)]
    }

    #[tokio::test]
    async fn test_clean_cycle_updates_all_records() {
        let transport = MockTransport::new(vec![Ok(golden_block()), Ok(golden_block())]);
        let (tc, ac) = test_configs(2);
        let mut pipeline = AcquisitionPipeline::new(Box::new(transport), &tc, &ac, pairs_for(2));

        let batch = pipeline.poll_once().await.unwrap();
        assert_eq!(batch.sequence, 1);
        assert_eq!(batch.generators.len(), 2);

        for record in &batch.generators {
            assert_eq!(record.reactive_power, -100.0);
            assert_eq!(record.active_power, 200.0);
            assert_eq!(record.line_voltage, 20.0);
            // Golden operating point pinned from the reference model
            assert!((record.estimated_excitation_current - 1277.1213927101219).abs() < 1e-6);
            assert!((record.deviation_ratio - 0.5660218452342184).abs() < 1e-9);
            assert!(record.last_update.is_some());
        }
    }

    #[tokio::test]
    async fn test_transport_error_leaves_records_untouched() {
        let transport = MockTransport::new(vec![
            Ok(golden_block()),
            Ok(golden_block()),
            // Second cycle: first generator reads fine, second dies mid-set
            Ok(golden_block()),
            Err(TransportError::Connection("read timeout".into())),
            // Third cycle recovers
            Ok(golden_block()),
            Ok(golden_block()),
        ]);
        let (tc, ac) = test_configs(2);
        let mut pipeline = AcquisitionPipeline::new(Box::new(transport), &tc, &ac, pairs_for(2));

        let first = pipeline.poll_once().await.unwrap();
        let err = pipeline.poll_once().await;
        assert!(matches!(err, Err(AcquisitionError::Transport(_))));

        // No partial corruption: every record still matches cycle 1
        for (record, before) in pipeline.records().iter().zip(first.generators.iter()) {
            assert_eq!(record.last_update, before.last_update);
            assert_eq!(record.estimated_excitation_current, before.estimated_excitation_current);
        }

        let third = pipeline.poll_once().await.unwrap();
        assert_eq!(third.sequence, 2);
    }

    #[tokio::test]
    async fn test_short_block_isolated_to_one_generator() {
        let mut truncated = golden_block();
        truncated.truncate(17);
        // Cycle 2 carries a new operating point for generator 1 only
        let changed = wide_block([4200.0, 4180.0, 4210.0, 50.0, -100.0, 300.0, 20.0, 310.0, 2000.0]);

        let transport = MockTransport::new(vec![
            Ok(golden_block()),
            Ok(golden_block()),
            Ok(changed),
            Ok(truncated),
        ]);
        let (tc, ac) = test_configs(2);
        let mut pipeline = AcquisitionPipeline::new(Box::new(transport), &tc, &ac, pairs_for(2));

        let first = pipeline.poll_once().await.unwrap();
        let second = pipeline.poll_once().await.unwrap();

        // Generator 1 moved to the new operating point, generator 2 kept
        // cycle 1's values
        assert_eq!(second.generators[0].active_power, 300.0);
        assert_eq!(second.generators[1].active_power, 200.0);
        assert_eq!(second.generators[1].last_update, first.generators[1].last_update);
        assert_eq!(
            second.generators[1].estimated_excitation_current,
            first.generators[1].estimated_excitation_current
        );
    }

    #[tokio::test]
    async fn test_rolling_average_tracks_ratio() {
        let transport =
            MockTransport::new(vec![Ok(golden_block()), Ok(golden_block()), Ok(golden_block())]);
        let tc = TransportConfig {
            generator_count: 1,
            layout: RegisterLayout::Wide,
            ..TransportConfig::default()
        };
        let ac = AcquisitionConfig::default();
        let mut pipeline = AcquisitionPipeline::new(Box::new(transport), &tc, &ac, pairs_for(1));

        for _ in 0..3 {
            let batch = pipeline.poll_once().await.unwrap();
            let record = &batch.generators[0];
            // Identical input every cycle, so the window mean equals the ratio
            assert!((record.ratio_rolling_avg - record.deviation_ratio).abs() < 1e-12);
        }
    }
}
