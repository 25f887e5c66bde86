use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use tandem_types::{RoomId, UserId};

use crate::hub::{ConnId, Hub};

/// Which connection currently speaks for each user.
///
/// At most one handle is kept per user: a later `register` replaces the
/// earlier one. A single handle may be registered under several users.
#[derive(Clone)]
pub struct PresenceRegistry {
    users: Arc<RwLock<HashMap<UserId, ConnId>>>,
    hub: Hub,
}

impl PresenceRegistry {
    pub fn new(hub: Hub) -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            hub,
        }
    }

    /// Bind `user_id` to `conn_id`. Returns the handle it replaced, if any.
    pub async fn register(&self, user_id: UserId, conn_id: ConnId) -> Option<ConnId> {
        self.users.write().await.insert(user_id, conn_id)
    }

    pub async fn lookup(&self, user_id: &UserId) -> Option<ConnId> {
        self.users.read().await.get(user_id).copied()
    }

    /// Remove every entry that points at `conn_id`. Returns the users that
    /// lost their presence.
    pub async fn unregister(&self, conn_id: ConnId) -> Vec<UserId> {
        let mut users = self.users.write().await;
        let gone: Vec<UserId> = users
            .iter()
            .filter(|(_, c)| **c == conn_id)
            .map(|(u, _)| u.clone())
            .collect();
        for user_id in &gone {
            users.remove(user_id);
        }
        gone
    }

    /// True when the user's current connection is a member of the room.
    pub async fn is_present_in_room(&self, user_id: &UserId, room_id: &RoomId) -> bool {
        match self.lookup(user_id).await {
            Some(conn_id) => self.hub.is_member(room_id, conn_id).await,
            None => false,
        }
    }

    pub async fn registered_count(&self) -> usize {
        self.users.read().await.len()
    }
}
