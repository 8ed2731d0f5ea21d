use std::collections::HashMap;

use async_trait::async_trait;
use formulate_contracts::{ConnectionId, ServerEvent};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;

#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn send(&self, connection: &ConnectionId, event: ServerEvent) -> bool;
}

#[derive(Default)]
pub struct SocketRegistry {
    senders: RwLock<HashMap<ConnectionId, UnboundedSender<ServerEvent>>>,
}

impl SocketRegistry {
    pub async fn register(&self) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let id = ConnectionId::generate();
        let (tx, rx) = unbounded_channel();
        self.senders.write().await.insert(id.clone(), tx);
        (id, rx)
    }

    pub async fn unregister(&self, connection: &ConnectionId) {
        self.senders.write().await.remove(connection);
    }

    pub async fn connection_count(&self) -> usize {
        self.senders.read().await.len()
    }
}

#[async_trait]
impl ConnectionRegistry for SocketRegistry {
    async fn send(&self, connection: &ConnectionId, event: ServerEvent) -> bool {
        let senders = self.senders.read().await;
        match senders.get(connection) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                tracing::debug!(
                    connection = %connection,
                    event = event.name(),
                    "connection gone, event dropped"
                );
                false
            }
        }
    }
}
