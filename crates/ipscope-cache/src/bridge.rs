//! Client messaging bridge.
//!
//! Tracks the open application instances, which worker version controls
//! each of them, and delivers outbound broadcasts over per-client channels.

use ipscope_core::{ClientId, IpSnapshot, OutboundMessage};
use std::collections::HashMap;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

struct ClientSlot {
    controller: Option<String>,
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

/// A connected application instance's end of the bridge.
pub struct ClientConnection {
    pub id: ClientId,
    pub rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

/// Registry of open application instances.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientSlot>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new, uncontrolled client.
    pub async fn connect(&self) -> ClientConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ClientId::new();
        self.clients.write().await.insert(
            id,
            ClientSlot {
                controller: None,
                tx,
            },
        );
        debug!(client_id = %id, "Client connected");
        ClientConnection { id, rx }
    }

    /// Returns whether the client was connected.
    pub async fn disconnect(&self, id: ClientId) -> bool {
        let removed = self.clients.write().await.remove(&id).is_some();
        if removed {
            debug!(client_id = %id, "Client disconnected");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Make `version` the controller of every open client.
    pub async fn claim(&self, version: &str) -> usize {
        let mut clients = self.clients.write().await;
        for slot in clients.values_mut() {
            slot.controller = Some(version.to_string());
        }
        info!(version = %version, clients = clients.len(), "Claimed open clients");
        clients.len()
    }

    /// Version controlling a client, if any.
    pub async fn controller_of(&self, id: ClientId) -> Option<String> {
        self.clients
            .read()
            .await
            .get(&id)
            .and_then(|slot| slot.controller.clone())
    }

    /// Send a message to every open client. Clients whose receiving end
    /// is gone are dropped. Returns the number of deliveries.
    pub async fn broadcast(&self, message: OutboundMessage) -> usize {
        let mut clients = self.clients.write().await;
        let mut delivered = 0;
        clients.retain(|id, slot| match slot.tx.send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                debug!(client_id = %id, "Dropping closed client");
                false
            }
        });
        delivered
    }
}

/// An application instance's view of the bridge: decides on its own
/// whether a broadcast snapshot is news.
#[derive(Debug, Clone, Default)]
pub struct ClientSession {
    last_ip: Option<String>,
}

impl ClientSession {
    pub fn new(last_ip: Option<String>) -> Self {
        Self { last_ip }
    }

    pub fn last_ip(&self) -> Option<&str> {
        self.last_ip.as_deref()
    }

    /// Record an observed snapshot; returns whether the address changed.
    pub fn observe(&mut self, snapshot: &IpSnapshot) -> bool {
        let changed = self.last_ip.as_deref() != Some(snapshot.ip.as_str());
        self.last_ip = Some(snapshot.ip.clone());
        changed
    }

    /// Handle an outbound message. Returns the snapshot when it carries a
    /// new address.
    pub fn handle(&mut self, message: &OutboundMessage) -> Option<IpSnapshot> {
        match message {
            OutboundMessage::IpUpdate(snapshot) => {
                if self.observe(snapshot) {
                    Some(snapshot.clone())
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let registry = ClientRegistry::new();
        let a = registry.connect().await;
        let b = registry.connect().await;
        assert_eq!(registry.len().await, 2);

        assert!(registry.disconnect(a.id).await);
        assert!(!registry.disconnect(a.id).await);
        assert_eq!(registry.len().await, 1);

        registry.disconnect(b.id).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_claim_sets_controller() {
        let registry = ClientRegistry::new();
        let client = registry.connect().await;
        assert_eq!(registry.controller_of(client.id).await, None);

        assert_eq!(registry.claim("ipscope-v2").await, 1);
        assert_eq!(
            registry.controller_of(client.id).await.as_deref(),
            Some("ipscope-v2")
        );
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let registry = ClientRegistry::new();
        let mut a = registry.connect().await;
        let mut b = registry.connect().await;

        let msg = OutboundMessage::IpUpdate(IpSnapshot::new("203.0.113.7"));
        assert_eq!(registry.broadcast(msg.clone()).await, 2);

        assert_eq!(a.rx.recv().await, Some(msg.clone()));
        assert_eq!(b.rx.recv().await, Some(msg));
    }

    #[tokio::test]
    async fn test_broadcast_drops_closed_clients() {
        let registry = ClientRegistry::new();
        let a = registry.connect().await;
        let _b = registry.connect().await;
        drop(a.rx);

        let msg = OutboundMessage::IpUpdate(IpSnapshot::new("203.0.113.7"));
        assert_eq!(registry.broadcast(msg).await, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[test]
    fn test_session_reports_only_changes() {
        let mut session = ClientSession::new(Some("203.0.113.7".into()));

        let same = OutboundMessage::IpUpdate(IpSnapshot::new("203.0.113.7"));
        assert!(session.handle(&same).is_none());

        let changed = OutboundMessage::IpUpdate(IpSnapshot::new("198.51.100.9"));
        let snapshot = session.handle(&changed).unwrap();
        assert_eq!(snapshot.ip, "198.51.100.9");
        assert_eq!(session.last_ip(), Some("198.51.100.9"));
    }

    #[test]
    fn test_session_without_history_treats_first_update_as_change() {
        let mut session = ClientSession::default();
        let msg = OutboundMessage::IpUpdate(IpSnapshot::new("203.0.113.7"));
        assert!(session.handle(&msg).is_some());
    }
}
