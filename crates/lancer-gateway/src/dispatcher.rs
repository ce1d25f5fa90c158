use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::warn;
use uuid::Uuid;

use lancer_db::Database;
use lancer_types::events::{GatewayEvent, PresenceStatus};

use crate::fanout::FanoutError;
use crate::registry::ConnectionRegistry;

/// Owns the connection registry and the store handle, and translates
/// connection lifecycle into presence state plus a broadcast.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) db: Arc<Database>,

    /// Usernames of currently online users, for the presence snapshot a
    /// freshly connected client receives.
    online_users: RwLock<HashMap<Uuid, String>>,
}

impl Dispatcher {
    pub fn new(registry: ConnectionRegistry, db: Arc<Database>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                db,
                online_users: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    /// OFFLINE -> ONLINE. Registers the connection, persists the online
    /// flag and broadcasts the status change to every registered
    /// connection (the transitioning user's own included, harmlessly).
    pub async fn connect(
        &self,
        user_id: Uuid,
        username: String,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (conn_id, rx) = self.inner.registry.register(user_id).await;

        self.inner
            .online_users
            .write()
            .await
            .insert(user_id, username.clone());

        self.persist_presence(user_id, true).await;

        self.inner
            .registry
            .broadcast(GatewayEvent::UserStatusChanged {
                user_id,
                username,
                status: PresenceStatus::Online,
            })
            .await;

        (conn_id, rx)
    }

    /// ONLINE -> OFFLINE. A no-op when a newer connection has already
    /// taken over for this user. The registry's conn-id guard is the only
    /// arbiter here; a takeover landing mid-teardown cannot be marked
    /// offline by the connection it superseded.
    pub async fn disconnect(&self, user_id: Uuid, conn_id: Uuid) {
        if !self.inner.registry.unregister(user_id, conn_id).await {
            return;
        }

        let username = self
            .inner
            .online_users
            .write()
            .await
            .remove(&user_id)
            .unwrap_or_default();

        self.persist_presence(user_id, false).await;

        self.inner
            .registry
            .broadcast(GatewayEvent::UserStatusChanged {
                user_id,
                username,
                status: PresenceStatus::Offline,
            })
            .await;
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .online_users
            .read()
            .await
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }

    /// Report a failure back to the sender only — never fanned out.
    pub async fn send_error(&self, user_id: Uuid, message: impl Into<String>) {
        self.inner
            .registry
            .send_to(
                user_id,
                GatewayEvent::Error {
                    message: message.into(),
                },
            )
            .await;
    }

    /// Presence is best-effort: a store failure is logged and never blocks
    /// the broadcast or connection teardown.
    async fn persist_presence(&self, user_id: Uuid, online: bool) {
        let result = self
            .blocking(move |db| {
                let uid = user_id.to_string();
                if online {
                    db.set_presence(&uid, true, None)
                } else {
                    db.set_presence(&uid, false, Some(&lancer_db::now_rfc3339()))
                }
            })
            .await;

        if let Err(e) = result {
            warn!("Failed to persist presence for {}: {}", user_id, e);
        }
    }

    /// Run a store operation off the async runtime. rusqlite is blocking,
    /// same pattern the REST handlers use.
    pub(crate) async fn blocking<T, F>(&self, f: F) -> Result<T, FanoutError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.inner.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| FanoutError::Storage(anyhow::anyhow!("join error: {}", e)))?
            .map_err(FanoutError::Storage)
    }
}
