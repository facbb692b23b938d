use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use circle_types::events::GatewayEvent;

/// Tracks the live gateway session of every online user and routes events
/// to them.
///
/// Delivery is fire-and-forget: an event for a user without a session is
/// dropped, and nothing waits for the socket to flush. Durable state
/// (notifications, edges) lives in the database, never here.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Events every connected client receives (online list updates)
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> (session_id, sender). One session per user; a newer login
    /// replaces the older one.
    sessions: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to events addressed to everyone.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    pub fn broadcast(&self, event: GatewayEvent) {
        // No receivers just means nobody is connected.
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Bind a new session to `user_id`, displacing any previous one. The old
    /// session's receiver closes, which ends its socket loop.
    pub async fn register_session(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .inner
            .sessions
            .write()
            .await
            .insert(user_id, (session_id, tx));

        if let Some((old_id, _)) = previous {
            info!("Session {} for {} displaced by {}", old_id, user_id, session_id);
        }
        (session_id, rx)
    }

    /// Drop the user's session, but only if `session_id` is still the current
    /// one. Returns whether anything was removed.
    pub async fn unregister_session(&self, user_id: Uuid, session_id: Uuid) -> bool {
        let mut sessions = self.inner.sessions.write().await;
        match sessions.get(&user_id) {
            Some((current, _)) if *current == session_id => {
                sessions.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Current session of `user_id`, if the user is online.
    pub async fn session_for(&self, user_id: Uuid) -> Option<Uuid> {
        self.inner
            .sessions
            .read()
            .await
            .get(&user_id)
            .map(|(session_id, _)| *session_id)
    }

    /// Push an event to one user. Returns false (and drops the event) when
    /// the user has no live session.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let sessions = self.inner.sessions.read().await;
        let Some((_, tx)) = sessions.get(&user_id) else {
            debug!("{} is offline, dropping {}", user_id, event.name());
            return false;
        };
        tx.send(event).is_ok()
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.sessions.read().await.keys().copied().collect()
    }

    /// Tell every client who is online now.
    pub async fn broadcast_online_users(&self) {
        let user_ids = self.online_users().await;
        self.broadcast(GatewayEvent::GetOnlineUsers { user_ids });
    }
}
