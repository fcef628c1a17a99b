// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! Engine - owns the polling loop and dispatches cycle results

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use super::{Broadcaster, SystemState};
use crate::acquisition::AcquisitionPipeline;
use crate::config::Config;
use crate::db::Database;

/// Single owner of the acquisition pipeline and its driving loop.
///
/// The loop never overlaps poll cycles: persistence and fan-out are
/// triggered at the end of each successful cycle but run off the loop
/// (blocking SQLite work on a worker thread, fan-out as non-blocking
/// sends), so the next tick is never delayed by a slow consumer.
pub struct Engine {
    config: Arc<Config>,
    pipeline: AcquisitionPipeline,
    database: Option<Arc<Database>>,
    broadcaster: Arc<Broadcaster>,
    state: Arc<RwLock<SystemState>>,
}

impl Engine {
    pub fn new(
        config: Arc<Config>,
        pipeline: AcquisitionPipeline,
        database: Option<Arc<Database>>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            config,
            pipeline,
            database,
            broadcaster,
            state: Arc::new(RwLock::new(SystemState::default())),
        }
    }

    pub fn state_handle(&self) -> Arc<RwLock<SystemState>> {
        self.state.clone()
    }

    /// Drive poll cycles until the shutdown channel fires, then let the
    /// in-flight cycle finish and release the transport.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let period = self.config.acquisition.interval();
        info!(
            "Engine started: {} generators every {:?}",
            self.pipeline.generator_count(),
            period
        );

        {
            let mut state = self.state.write().await;
            state.running = true;
        }

        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Engine shutting down...");
                    break;
                }
            }
        }

        self.pipeline.shutdown().await;

        let mut state = self.state.write().await;
        state.running = false;
        info!(
            "Engine stopped after {} cycles ({} transport errors)",
            state.total_cycles, state.transport_errors
        );
        Ok(())
    }

    async fn cycle(&mut self) {
        match self.pipeline.poll_once().await {
            Ok(batch) => {
                {
                    let mut state = self.state.write().await;
                    state.total_cycles += 1;
                    state.total_readings += batch.generators.len() as u64;
                    state.last_cycle = Some(Utc::now());
                }

                if let Some(database) = &self.database {
                    let database = database.clone();
                    let snapshot = batch.clone();
                    tokio::task::spawn_blocking(move || {
                        if let Err(e) = database.append_batch(&snapshot) {
                            error!("Failed to persist cycle {}: {e}", snapshot.sequence);
                        }
                    });
                }

                self.broadcaster.publish(batch).await;
            }
            Err(e) => {
                warn!("Poll cycle failed: {e}; retrying next tick");
                let mut state = self.state.write().await;
                state.transport_errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{RegisterTransport, TransportError};
    use crate::codec::RegisterLayout;
    use crate::config::TransportConfig;
    use crate::model::MachineConstants;
    use async_trait::async_trait;
    use std::time::Duration;

    struct SteadyTransport;

    #[async_trait]
    impl RegisterTransport for SteadyTransport {
        async fn read_registers(
            &mut self,
            _address: u16,
            count: u16,
        ) -> Result<Vec<u16>, TransportError> {
            // 20 kV line voltage register pair, everything else zero
            let mut regs = vec![0u16; count as usize];
            let bits = 20.0f32.to_bits();
            regs[12] = (bits >> 16) as u16;
            regs[13] = (bits & 0xFFFF) as u16;
            Ok(regs)
        }
    }

    #[tokio::test]
    async fn test_engine_publishes_each_cycle_and_stops_cleanly() {
        let mut config = Config::default();
        config.transport = TransportConfig {
            generator_count: 2,
            layout: RegisterLayout::Wide,
            ..TransportConfig::default()
        };
        config.acquisition.interval_secs = 0.1;
        config.database.enabled = false;
        let config = Arc::new(config);

        let pipeline = AcquisitionPipeline::new(
            Box::new(SteadyTransport),
            &config.transport,
            &config.acquisition,
            vec![MachineConstants::default()],
        );
        let broadcaster = Arc::new(Broadcaster::new(16));
        let mut subscription = broadcaster.subscribe().await;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut engine = Engine::new(config, pipeline, None, broadcaster.clone());
        let state = engine.state_handle();
        let handle = tokio::spawn(async move { engine.run(shutdown_rx).await });

        let first = subscription.receiver.recv().await.unwrap();
        let second = subscription.receiver.recv().await.unwrap();
        assert_eq!(first.sequence + 1, second.sequence);
        assert_eq!(first.generators.len(), 2);
        // Zero power readings hit the nameplate substitutions; the estimate
        // is finite and usable
        assert!(first.generators[0].estimated_excitation_current.is_finite());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let state = state.read().await;
        assert!(!state.running);
        assert!(state.total_cycles >= 2);
        assert_eq!(state.transport_errors, 0);
    }
}
