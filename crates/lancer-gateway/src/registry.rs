use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use lancer_types::events::GatewayEvent;

struct Registration {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Maps each online user to their single active connection. Constructed
/// per server instance, never a module-level static.
///
/// Last connection wins: a second `register` for the same user replaces
/// the first, and the superseded connection's id can no longer unregister
/// or reach the user.
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<Uuid, Registration>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection for `user_id`, superseding any prior one.
    /// Returns the new connection id and the receiving half of the
    /// per-user event channel.
    pub async fn register(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .write()
            .await
            .insert(user_id, Registration { conn_id, tx });
        (conn_id, rx)
    }

    /// Remove the registration, but only if `conn_id` still owns it — a
    /// stale connection tearing down must not evict its successor.
    /// Returns whether anything was removed; calling again is a no-op.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut map = self.inner.write().await;
        if map.get(&user_id).is_some_and(|r| r.conn_id == conn_id) {
            map.remove(&user_id);
            true
        } else {
            false
        }
    }

    /// The sender for the user's current connection. Absence means the
    /// user is simply not connected — deliver nothing, not an error.
    pub async fn lookup(&self, user_id: Uuid) -> Option<mpsc::UnboundedSender<GatewayEvent>> {
        self.inner.read().await.get(&user_id).map(|r| r.tx.clone())
    }

    /// Deliver an event to the user's registered connection, if any.
    pub async fn send_to(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        match self.inner.read().await.get(&user_id) {
            Some(r) => r.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver an event to every currently registered connection.
    pub async fn broadcast(&self, event: GatewayEvent) {
        let map = self.inner.read().await;
        for r in map.values() {
            let _ = r.tx.send(event.clone());
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_event(text: &str) -> GatewayEvent {
        GatewayEvent::Error {
            message: text.to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        assert!(registry.lookup(user).await.is_none());

        let (conn_id, mut rx) = registry.register(user).await;
        assert!(registry.lookup(user).await.is_some());

        assert!(registry.send_to(user, error_event("ping")).await);
        assert!(matches!(rx.recv().await, Some(GatewayEvent::Error { .. })));
        assert!(registry.unregister(user, conn_id).await);
    }

    #[tokio::test]
    async fn last_connection_wins() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (old_conn, mut old_rx) = registry.register(user).await;
        let (new_conn, mut new_rx) = registry.register(user).await;
        assert_ne!(old_conn, new_conn);

        // The superseded connection is no longer reachable
        registry.send_to(user, error_event("hello")).await;
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err());

        // And its teardown must not evict the successor
        assert!(!registry.unregister(user, old_conn).await);
        assert!(registry.lookup(user).await.is_some());
    }

    #[tokio::test]
    async fn unregister_silences_delivery() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (conn_id, _rx) = registry.register(user).await;
        assert!(registry.unregister(user, conn_id).await);

        // Silent skip, not an error
        assert!(!registry.send_to(user, error_event("gone")).await);
        // Idempotent
        assert!(!registry.unregister(user, conn_id).await);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_registered() {
        let registry = ConnectionRegistry::new();
        let (_, mut rx_a) = registry.register(Uuid::new_v4()).await;
        let (_, mut rx_b) = registry.register(Uuid::new_v4()).await;

        registry.broadcast(error_event("everyone")).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }
}
