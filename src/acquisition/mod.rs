// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! Acquisition module - register transport and the polling pipeline

mod pipeline;
mod transport;

pub use pipeline::AcquisitionPipeline;
pub use transport::{ModbusTransport, RegisterTransport};

use thiserror::Error;

/// Transport-level failures: the whole poll cycle is abandoned and retried
/// at the next tick, never fatal to the process.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("protocol exception: {0}")]
    Protocol(String),
}

/// Failures inside one poll cycle.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// One generator's register slice was unusable. Isolated by the
    /// pipeline: that generator keeps its previous values and the cycle
    /// continues.
    #[error("generator {generator_id}: short register block, expected {expected} words, got {got}")]
    Decode {
        generator_id: u16,
        expected: usize,
        got: usize,
    },
}
