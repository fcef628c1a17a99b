//! Streaming module - WebSocket fan-out to live viewers

mod websocket;

pub use websocket::WebSocketServer;

use serde::{Deserialize, Serialize};

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Enable the WebSocket server
    pub websocket_enabled: bool,
    /// Bind address
    pub websocket_bind: String,
    /// Listen port
    pub websocket_port: u16,
    /// Connection cap; further clients are rejected
    pub websocket_max_clients: usize,
    /// Protocol-level ping cadence for dead-subscriber detection
    pub ping_interval_secs: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            websocket_enabled: true,
            websocket_bind: "0.0.0.0".to_string(),
            websocket_port: 8765,
            websocket_max_clients: 32,
            ping_interval_secs: 30,
        }
    }
}
