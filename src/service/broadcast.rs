//! WebSocket broadcast hub.
//!
//! Connected clients register with their session info (currently the
//! username). Broadcasts serialize one JSON message and fan it out to
//! every client passing the filter.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use uuid::Uuid;

struct Client {
    /// Session values broadcast filters match against, e.g.
    /// `username -> jest`.
    info: HashMap<String, String>,
    tx: UnboundedSender<String>,
}

#[derive(Default)]
pub struct Broadcaster {
    clients: RwLock<HashMap<Uuid, Client>>,
}

impl Broadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a connected client; the returned receiver yields the
    /// serialized messages to forward over the socket.
    pub async fn register(&self, info: HashMap<String, String>) -> (Uuid, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let id = Uuid::new_v4();
        self.clients.write().await.insert(id, Client { info, tx });
        tracing::debug!(client = %id, "broadcast client registered");
        (id, rx)
    }

    pub async fn unregister(&self, id: Uuid) {
        self.clients.write().await.remove(&id);
        tracing::debug!(client = %id, "broadcast client removed");
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Sends `{name, params}` to every client whose session info matches
    /// all of `scope`. An empty scope addresses every client.
    pub async fn broadcast_scoped(&self, name: &str, params: Value, scope: &HashMap<String, String>) {
        let message = json!({ "name": name, "params": params }).to_string();

        let clients = self.clients.read().await;
        for client in clients.values() {
            let matched = scope
                .iter()
                .all(|(key, value)| client.info.get(key) == Some(value));
            if matched {
                // A closed receiver just means the socket is going away
                let _ = client.tx.send(message.clone());
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(username: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("username".to_string(), username.to_string());
        map
    }

    #[tokio::test]
    async fn test_scoped_broadcast_filters_clients() {
        let hub = Broadcaster::new();
        let (_jest, mut jest_rx) = hub.register(info("jest")).await;
        let (_other, mut other_rx) = hub.register(info("other")).await;

        hub.broadcast_scoped("osjs/vfs:watch:change", json!([{"path": "home:/x"}]), &info("jest"))
            .await;

        let received = jest_rx.recv().await.unwrap();
        assert!(received.contains("osjs/vfs:watch:change"));
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_scope_reaches_everyone() {
        let hub = Broadcaster::new();
        let (_a, mut a_rx) = hub.register(info("a")).await;
        let (_b, mut b_rx) = hub.register(info("b")).await;

        hub.broadcast_scoped("event", json!([]), &HashMap::new()).await;

        assert!(a_rx.recv().await.is_some());
        assert!(b_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_unregister() {
        let hub = Broadcaster::new();
        let (id, _rx) = hub.register(info("a")).await;
        assert_eq!(hub.client_count().await, 1);
        hub.unregister(id).await;
        assert_eq!(hub.client_count().await, 0);
    }
}
