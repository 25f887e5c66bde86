use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tandem_db::Database;
use tandem_db::changes::{self, WatchedTable};
use tandem_types::events::{ClientCommand, ServerEvent};

use crate::aggregator::Aggregator;
use crate::error::SendError;
use crate::hub::{ConnId, Hub};
use crate::listener::ChangeListener;
use crate::presence::PresenceRegistry;
use crate::router::ChatRouter;
use crate::store::NotificationStore;

/// Session coordinator: owns the presence registry and wires client
/// commands, connection lifecycle and the change feeds to the components.
#[derive(Clone)]
pub struct Relay {
    hub: Hub,
    registry: PresenceRegistry,
    store: NotificationStore,
    aggregator: Aggregator,
    router: ChatRouter,
}

impl Relay {
    pub fn new(db: Arc<Database>) -> Self {
        let hub = Hub::new();
        let registry = PresenceRegistry::new(hub.clone());
        let store = NotificationStore::new(db);
        let aggregator = Aggregator::new(store.clone());
        let router = ChatRouter::new(store.clone(), hub.clone(), registry.clone());
        Self {
            hub,
            registry,
            store,
            aggregator,
            router,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn change_listener(&self) -> ChangeListener {
        ChangeListener::new(self.aggregator.clone(), self.registry.clone(), self.hub.clone())
    }

    /// Subscribe to both notification tables and start one listener task
    /// per table. Everything stops once `cancel` fires.
    pub async fn start_change_feeds(
        &self,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<JoinHandle<()>>> {
        let listener = self.change_listener();
        let mut tasks = Vec::new();
        for table in [WatchedTable::MatchNotifications, WatchedTable::ChatNotifications] {
            let events =
                changes::subscribe(self.store.db().clone(), table, poll_interval, cancel.clone()).await?;
            tasks.push(listener.spawn(events));
        }
        Ok(tasks)
    }

    pub async fn connect(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (conn_id, rx) = self.hub.connect().await;
        info!("A user connected: {}", conn_id);
        (conn_id, rx)
    }

    /// Drop every presence entry of the connection, then the connection.
    pub async fn disconnect(&self, conn_id: ConnId) {
        let users = self.registry.unregister(conn_id).await;
        self.hub.disconnect(conn_id).await;
        info!(
            "A user disconnected: {} (users: {:?}, {} connections and {} users still online)",
            conn_id,
            users,
            self.hub.connection_count().await,
            self.registry.registered_count().await
        );
    }

    /// Handle one client command. Failures are logged, never returned.
    pub async fn handle_command(&self, conn_id: ConnId, cmd: ClientCommand) {
        match cmd {
            ClientCommand::RegisterUser(user_id) => {
                if user_id.is_empty() {
                    warn!("Connection {} sent registerUser without a user id", conn_id);
                    return;
                }
                info!("User {} registered on connection {}", user_id, conn_id);
                self.registry.register(user_id, conn_id).await;
            }

            ClientCommand::FetchNotifications(user_id) => {
                let feed = self.aggregator.build_feed(&user_id).await;
                if let Err(e) = self.hub.send(conn_id, ServerEvent::NewNotifications(feed)).await {
                    warn!("Error sending notifications to {}: {}", user_id, e);
                }
            }

            ClientCommand::MarkNotificationsAsRead(user_id) => {
                info!("markNotificationsAsRead for user {}", user_id);
                self.store.mark_all_read(&user_id).await;
            }

            ClientCommand::JoinRoom(room_id) => {
                self.router.join_room(conn_id, room_id).await;
            }

            ClientCommand::LeaveRoom(room_id) => {
                self.router.leave_room(conn_id, &room_id).await;
            }

            ClientCommand::SendMessage(msg) => match self.router.send_message(msg.clone()).await {
                Ok(message_id) => info!("Message {} sent by connection {}", message_id, conn_id),
                Err(SendError::Validation(e)) => {
                    warn!("Invalid data for sending message ({}): {:?}", e, msg);
                }
                Err(SendError::Store(e)) => warn!("Error storing message: {}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tandem_types::events::SendMessage;
    use tandem_types::models::Notification;
    use tandem_types::{RoomId, UserId};

    fn relay() -> (Relay, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (Relay::new(db.clone()), db)
    }

    #[tokio::test]
    async fn register_then_disconnect_clears_presence() {
        let (relay, _db) = relay();
        let (conn, _rx) = relay.connect().await;
        let alice = UserId::from("alice");

        relay.handle_command(conn, ClientCommand::RegisterUser(alice.clone())).await;
        assert_eq!(relay.registry().lookup(&alice).await, Some(conn));

        relay.disconnect(conn).await;
        assert_eq!(relay.registry().lookup(&alice).await, None);
        assert_eq!(relay.hub().connection_count().await, 0);
    }

    #[tokio::test]
    async fn empty_user_id_is_not_registered() {
        let (relay, _db) = relay();
        let (conn, _rx) = relay.connect().await;

        relay.handle_command(conn, ClientCommand::RegisterUser(UserId::from(""))).await;
        assert_eq!(relay.registry().registered_count().await, 0);
    }

    #[tokio::test]
    async fn fetch_replies_to_the_asking_connection() {
        let (relay, db) = relay();
        db.insert_match_notification("alice", "bob").unwrap();
        let (conn, mut rx) = relay.connect().await;

        relay
            .handle_command(conn, ClientCommand::FetchNotifications(UserId::from("alice")))
            .await;

        let ServerEvent::NewNotifications(feed) = rx.try_recv().unwrap() else {
            panic!("expected newNotifications");
        };
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn mark_read_then_fetch_shows_only_new_rows_unread() {
        let (relay, db) = relay();
        let (chat_id, _) = db.create_chat("R", "bob", "alice").unwrap();
        db.insert_match_notification("alice", "bob").unwrap();
        db.insert_chat_notification(chat_id, Some("hi"), "bob", "alice", "m-1")
            .unwrap();
        let (conn, mut rx) = relay.connect().await;
        let alice = UserId::from("alice");

        relay
            .handle_command(conn, ClientCommand::MarkNotificationsAsRead(alice.clone()))
            .await;
        let fresh = db.insert_match_notification("alice", "carol").unwrap();
        relay.handle_command(conn, ClientCommand::FetchNotifications(alice)).await;

        let ServerEvent::NewNotifications(feed) = rx.try_recv().unwrap() else {
            panic!("expected newNotifications");
        };
        assert_eq!(feed.len(), 3);
        for n in &feed {
            let is_fresh = matches!(n, Notification::Match(m) if m.counterpart_id == UserId::from("carol"));
            assert_eq!(n.is_read(), !is_fresh, "row {:?} (fresh id {})", n, fresh);
        }
    }

    #[tokio::test]
    async fn room_commands_route_messages() {
        let (relay, db) = relay();
        db.create_chat_room("R").unwrap();
        db.create_chat("R", "A", "B").unwrap();
        let (h1, mut rx1) = relay.connect().await;
        let (h2, mut rx2) = relay.connect().await;
        relay.handle_command(h1, ClientCommand::RegisterUser("A".into())).await;
        relay.handle_command(h2, ClientCommand::RegisterUser("B".into())).await;
        relay.handle_command(h1, ClientCommand::JoinRoom(RoomId::from("R"))).await;
        relay.handle_command(h2, ClientCommand::JoinRoom(RoomId::from("R"))).await;
        relay.handle_command(h2, ClientCommand::LeaveRoom(RoomId::from("R"))).await;

        relay
            .handle_command(
                h1,
                ClientCommand::SendMessage(SendMessage {
                    room_id: Some("R".into()),
                    content: Some("hi".into()),
                    image_urls: vec![],
                    user_id: Some("A".into()),
                    kind: Some("text".into()),
                }),
            )
            .await;

        assert!(matches!(rx1.try_recv().unwrap(), ServerEvent::ReceiveMessage(_)));
        assert!(rx2.try_recv().is_err());
        assert_eq!(relay.store().chat_notifications(&"B".into()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn change_feeds_push_new_rows_to_registered_users() {
        let (relay, db) = relay();
        let cancel = CancellationToken::new();
        let tasks = relay
            .start_change_feeds(Duration::from_millis(10), cancel.clone())
            .await
            .unwrap();

        let (conn, mut rx) = relay.connect().await;
        relay.handle_command(conn, ClientCommand::RegisterUser("alice".into())).await;
        db.insert_match_notification("alice", "bob").unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, ServerEvent::NewNotifications(ref feed) if feed.len() == 1));
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, ServerEvent::UpdateMatches);

        cancel.cancel();
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        }
    }
}
