// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! FieldWatch - Generator Excitation Monitoring System
//!
//! A high-performance telemetry pipeline for synchronous generator fleets:
//! - Modbus TCP register acquisition (binary16 and binary32 device generations)
//! - Closed-form per-unit excitation current estimation per generator
//! - Deviation-ratio fault signal (flagged beyond 5%)
//! - Append-only SQLite persistence of every computed reading
//! - Real-time WebSocket fan-out to connected viewers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      FieldWatch Engine                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐   ┌─────────┐   ┌─────────┐   ┌────────────┐   │
//! │  │ Modbus  │ → │ Register│ → │Excita-  │ → │ Generator  │   │
//! │  │Transport│   │  Codec  │   │tion     │   │  Records   │   │
//! │  └─────────┘   └─────────┘   │Model    │   └────────────┘   │
//! │                              └─────────┘         ↓          │
//! │                              ┌───────────────────────────┐  │
//! │                              │   Batch Snapshot (Arc)    │  │
//! │                              └───────────────────────────┘  │
//! │                                   ↓               ↓         │
//! │                              ┌─────────┐   ┌────────────┐   │
//! │                              │ SQLite  │   │ WebSocket  │   │
//! │                              │  Store  │   │  Fan-out   │   │
//! │                              └─────────┘   └────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod acquisition;
pub mod codec;
pub mod config;
pub mod core;
pub mod db;
pub mod model;
pub mod streaming;
pub mod telemetry;

// Re-exports for convenience
pub use acquisition::{AcquisitionPipeline, ModbusTransport, RegisterTransport};
pub use codec::RegisterLayout;
pub use config::Config;
pub use core::{Broadcaster, Engine, Subscription};
pub use db::Database;
pub use model::{estimate_excitation, Excitation, MachineConstants};
pub use streaming::WebSocketServer;
pub use telemetry::{GeneratorBatch, GeneratorRecord};

/// FieldWatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// FieldWatch name
pub const NAME: &str = "FieldWatch";

/// Deviation-ratio magnitude beyond which a generator is flagged faulty
pub const FAULT_RATIO_THRESHOLD: f64 = 0.05;
