//! Live push service.
//!
//! WebSocket server where each client message is a bare building id. For a
//! valid id the latest snapshot of that building is sent back, as one text
//! message, to the connection that asked. Anything else is ignored without
//! reply and the connection stays open.
//!
//! Every connection runs in its own task and handles its messages one at a
//! time. The only blocking work, the store query, runs on tokio's blocking
//! pool so a slow query never stalls other connections.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::latest::fetch_latest;
use crate::logging::{self, Component};
use crate::model::{BuildingId, LatestSnapshot, StoreError};
use crate::store::ReadingStore;

#[derive(Debug, Clone, Default)]
pub struct PushConfig {
    /// Messages arriving sooner than this after the last served one are
    /// dropped. Zero disables the limit.
    pub min_message_interval: Duration,
}

/// Accepts connections on `listener` until the task is dropped.
pub async fn serve(
    listener: TcpListener,
    store: Arc<dyn ReadingStore>,
    config: PushConfig,
) -> std::io::Result<()> {
    logging::info(
        Component::Push,
        None,
        &format!("push service listening on {}", listener.local_addr()?),
    );

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(stream, peer, store.clone(), config.clone()));
            }
            Err(e) => {
                // Per-connection failures (EMFILE, aborted handshakes) must not stop the server
                logging::warn(Component::Push, None, &format!("accept failed: {}", e));
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: Arc<dyn ReadingStore>,
    config: PushConfig,
) {
    let peer_label = peer.to_string();
    let context = Some(peer_label.as_str());

    let mut ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            logging::debug(Component::Push, context, &format!("handshake failed: {}", e));
            return;
        }
    };
    logging::debug(Component::Push, context, "client connected");

    let mut last_served: Option<Instant> = None;

    while let Some(message) = ws.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                logging::debug(Component::Push, context, &format!("connection error: {}", e));
                break;
            }
        };

        let Some(building) = BuildingId::parse(&text) else {
            continue;
        };

        if let Some(last) = last_served {
            if last.elapsed() < config.min_message_interval {
                logging::debug(Component::Push, context, "message dropped by rate limit");
                continue;
            }
        }

        let snapshot = match latest_snapshot(store.clone(), building).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let context = format!("{} building {}", peer_label, building);
                logging::log_store_failure(Component::Push, Some(&context), "latest reading", &e);
                continue;
            }
        };
        last_served = Some(Instant::now());

        let payload = match serde_json::to_string(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                logging::error(Component::Push, context, &format!("cannot serialize snapshot: {}", e));
                continue;
            }
        };

        if let Err(e) = ws.send(Message::Text(payload)).await {
            logging::debug(Component::Push, context, &format!("send failed: {}", e));
            break;
        }
    }

    logging::debug(Component::Push, context, "client disconnected");
}

async fn latest_snapshot(
    store: Arc<dyn ReadingStore>,
    building: BuildingId,
) -> Result<LatestSnapshot, StoreError> {
    tokio::task::spawn_blocking(move || fetch_latest(store.as_ref(), building)).await?
}
