use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use tandem_types::RoomId;
use tandem_types::events::ServerEvent;

use crate::error::DeliveryError;

/// Handle of one live transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transport layer: live connections and the rooms they have joined.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    /// Outbound queue per connection: conn_id -> sender
    connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<ServerEvent>>>,

    /// Room broadcast groups: room_id -> members
    rooms: RwLock<HashMap<RoomId, HashSet<ConnId>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection. Returns its handle and the queue of events to
    /// write to the socket.
    pub async fn connect(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = ConnId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop a connection and remove it from every room it joined.
    pub async fn disconnect(&self, conn_id: ConnId) {
        self.inner.connections.write().await.remove(&conn_id);

        let mut rooms = self.inner.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    /// Push an event to one connection.
    pub async fn send(&self, conn_id: ConnId, event: ServerEvent) -> Result<(), DeliveryError> {
        let connections = self.inner.connections.read().await;
        let tx = connections
            .get(&conn_id)
            .ok_or(DeliveryError::UnknownConnection(conn_id))?;
        tx.send(event).map_err(|_| DeliveryError::Closed(conn_id))
    }

    pub async fn join(&self, conn_id: ConnId, room_id: RoomId) {
        self.inner
            .rooms
            .write()
            .await
            .entry(room_id)
            .or_default()
            .insert(conn_id);
    }

    pub async fn leave(&self, conn_id: ConnId, room_id: &RoomId) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(members) = rooms.get_mut(room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    pub async fn is_member(&self, room_id: &RoomId, conn_id: ConnId) -> bool {
        self.inner
            .rooms
            .read()
            .await
            .get(room_id)
            .is_some_and(|members| members.contains(&conn_id))
    }

    /// Push an event to every connection in the room. Failed pushes are
    /// logged and skipped. Returns how many connections received it.
    pub async fn broadcast_room(&self, room_id: &RoomId, event: ServerEvent) -> usize {
        let members: Vec<ConnId> = match self.inner.rooms.read().await.get(room_id) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for conn_id in members {
            match self.send(conn_id, event.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Room {} {} push failed: {}", room_id, event.name(), e),
            }
        }
        debug!("Room {} {} delivered to {} connections", room_id, event.name(), delivered);
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_reaches_only_the_target() {
        let hub = Hub::new();
        let (a, mut rx_a) = hub.connect().await;
        let (_b, mut rx_b) = hub.connect().await;

        hub.send(a, ServerEvent::UpdateMatches).await.unwrap();

        assert_eq!(rx_a.try_recv().unwrap(), ServerEvent::UpdateMatches);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_disconnected_handle_fails() {
        let hub = Hub::new();
        let (a, _rx) = hub.connect().await;
        hub.disconnect(a).await;

        assert_eq!(
            hub.send(a, ServerEvent::UpdateChats).await,
            Err(DeliveryError::UnknownConnection(a))
        );
    }

    #[tokio::test]
    async fn send_to_dropped_receiver_fails() {
        let hub = Hub::new();
        let (a, rx) = hub.connect().await;
        drop(rx);

        assert_eq!(
            hub.send(a, ServerEvent::UpdateChats).await,
            Err(DeliveryError::Closed(a))
        );
    }

    #[tokio::test]
    async fn join_and_leave_are_idempotent() {
        let hub = Hub::new();
        let room = RoomId::from("room-1");
        let (a, _rx) = hub.connect().await;

        hub.join(a, room.clone()).await;
        hub.join(a, room.clone()).await;
        assert!(hub.is_member(&room, a).await);

        hub.leave(a, &room).await;
        hub.leave(a, &room).await;
        assert!(!hub.is_member(&room, a).await);
    }

    #[tokio::test]
    async fn broadcast_reaches_room_members_only() {
        let hub = Hub::new();
        let room = RoomId::from("room-1");
        let (a, mut rx_a) = hub.connect().await;
        let (b, mut rx_b) = hub.connect().await;
        let (_c, mut rx_c) = hub.connect().await;
        hub.join(a, room.clone()).await;
        hub.join(b, room.clone()).await;

        assert_eq!(hub.broadcast_room(&room, ServerEvent::UpdateChats).await, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_leaves_every_room() {
        let hub = Hub::new();
        let r1 = RoomId::from("r1");
        let r2 = RoomId::from("r2");
        let (a, _rx) = hub.connect().await;
        hub.join(a, r1.clone()).await;
        hub.join(a, r2.clone()).await;

        hub.disconnect(a).await;

        assert!(!hub.is_member(&r1, a).await);
        assert!(!hub.is_member(&r2, a).await);
        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.broadcast_room(&r1, ServerEvent::UpdateChats).await, 0);
    }
}
