// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! WebSocket server for real-time streaming

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::StreamingConfig;
use crate::core::{Broadcaster, Subscription};

/// WebSocket server
///
/// Each connected viewer gets its own [`Subscription`] to the broadcaster,
/// so every client sees cycle snapshots in publish order and a stalled or
/// dead client only ever loses its own messages.
pub struct WebSocketServer {
    config: StreamingConfig,
    broadcaster: Arc<Broadcaster>,
    clients: Arc<RwLock<HashMap<String, SocketAddr>>>,
}

impl WebSocketServer {
    pub fn new(config: StreamingConfig, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            config,
            broadcaster,
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr = format!("{}:{}", self.config.websocket_bind, self.config.websocket_port);
        let listener = TcpListener::bind(&addr).await?;

        info!("WebSocket server listening on ws://{}", addr);

        let clients = self.clients.clone();
        let broadcaster = self.broadcaster.clone();
        let max_clients = self.config.websocket_max_clients;
        let ping_interval = Duration::from_secs(self.config.ping_interval_secs.max(1));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, addr)) => {
                                let client_count = clients.read().await.len();
                                if client_count >= max_clients {
                                    warn!("Max clients reached, rejecting connection from {}", addr);
                                    continue;
                                }

                                let subscription = broadcaster.subscribe().await;
                                tokio::spawn(handle_connection(
                                    stream,
                                    addr,
                                    clients.clone(),
                                    broadcaster.clone(),
                                    subscription,
                                    ping_interval,
                                ));
                            }
                            Err(e) => {
                                error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("WebSocket server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    clients: Arc<RwLock<HashMap<String, SocketAddr>>>,
    broadcaster: Arc<Broadcaster>,
    mut subscription: Subscription,
    ping_interval: Duration,
) {
    let client_id = uuid::Uuid::new_v4().to_string();

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            broadcaster.unsubscribe(subscription.id).await;
            return;
        }
    };

    info!("New WebSocket connection from {} (id: {})", addr, client_id);

    {
        let mut clients = clients.write().await;
        clients.insert(client_id.clone(), addr);
    }

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let welcome = serde_json::json!({
        "type": "welcome",
        "client_id": client_id,
        "server": "FieldWatch",
        "version": env!("CARGO_PKG_VERSION"),
    });

    if let Err(e) = ws_sender.send(Message::Text(welcome.to_string().into())).await {
        warn!("Failed to send welcome: {}", e);
    }

    let mut ping_tick = interval(ping_interval);
    // First tick fires immediately; skip it so pings start one period in
    ping_tick.tick().await;

    loop {
        tokio::select! {
            // Incoming messages from the viewer
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received from {}: {}", addr, text);

                        if let Ok(cmd) = serde_json::from_str::<serde_json::Value>(&text) {
                            if let Some(cmd_type) = cmd.get("type").and_then(|v| v.as_str()) {
                                if cmd_type == "ping" {
                                    let pong = serde_json::json!({
                                        "type": "pong",
                                        "timestamp": chrono::Utc::now().to_rfc3339(),
                                    });
                                    let _ = ws_sender.send(Message::Text(pong.to_string().into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by client {}", addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            // One message per poll cycle from the broadcaster
            batch = subscription.receiver.recv() => {
                match batch {
                    Some(batch) => {
                        let wrapper = serde_json::json!({
                            "type": "batch",
                            "sequence": batch.sequence,
                            "timestamp": batch.timestamp.to_rfc3339(),
                            "data": &batch.generators,
                        });
                        if let Err(e) = ws_sender.send(Message::Text(wrapper.to_string().into())).await {
                            warn!("Failed to send to {}: {}", addr, e);
                            break;
                        }
                    }
                    // Broadcaster evicted us or went away
                    None => break,
                }
            }

            // Dead-subscriber detection
            _ = ping_tick.tick() => {
                if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                    warn!("Ping to {} failed, dropping client", addr);
                    break;
                }
            }
        }
    }

    broadcaster.unsubscribe(subscription.id).await;
    {
        let mut clients = clients.write().await;
        clients.remove(&client_id);
    }

    info!("WebSocket client {} disconnected", addr);
}
