// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! Register transport - the single stateful connection to the plant RTU

use async_trait::async_trait;
use tokio_modbus::client::{tcp, Client, Context, Reader};
use tokio_modbus::Slave;
use tracing::info;

use super::TransportError;
use crate::config::TransportConfig;

/// Source of contiguous 16-bit holding registers.
///
/// The connection is exclusively owned by the acquisition pipeline; reads
/// are serialized by the pipeline's single-owner loop, so implementations
/// need no internal locking.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Read `count` contiguous holding registers starting at `address`.
    async fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, TransportError>;

    /// Release the underlying connection.
    async fn disconnect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Modbus TCP transport over a single long-lived connection.
pub struct ModbusTransport {
    ctx: Context,
    peer: String,
}

impl ModbusTransport {
    /// Connect to the configured Modbus TCP endpoint.
    pub async fn connect(config: &TransportConfig) -> Result<Self, TransportError> {
        let peer = format!("{}:{}", config.host, config.port);
        let addr = peer
            .parse()
            .map_err(|e| TransportError::Connection(format!("invalid address {peer}: {e}")))?;

        let ctx = tcp::connect_slave(addr, Slave(config.unit_id))
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        info!("Connected to Modbus endpoint {} (unit {})", peer, config.unit_id);
        Ok(Self { ctx, peer })
    }
}

#[async_trait]
impl RegisterTransport for ModbusTransport {
    async fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        self.ctx
            .read_holding_registers(address, count)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.ctx
            .disconnect()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        info!("Disconnected from Modbus endpoint {}", self.peer);
        Ok(())
    }
}
