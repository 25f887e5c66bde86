use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{info, warn};

use tandem_db::Database;
use tandem_db::models::{ChatFeedRow, ChatRow, MatchFeedRow};
use tandem_types::models::{ChatMessage, ChatNotification, MatchNotification, Notification};
use tandem_types::{RoomId, UserId};

use crate::error::StoreError;

/// Async data access over the notification tables, the room linkage table
/// and the room documents. No policy lives here.
#[derive(Clone)]
pub struct NotificationStore {
    db: Arc<Database>,
}

impl NotificationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run a blocking DB call off the async runtime.
    async fn blocking<F, T>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::new(op, e))?
            .map_err(|e| StoreError::new(op, e))
    }

    pub async fn match_notifications(&self, user_id: &UserId) -> Result<Vec<Notification>, StoreError> {
        let uid = user_id.to_string();
        let rows = self
            .blocking("match_notifications", move |db| db.get_match_notifications(&uid))
            .await?;
        Ok(rows.into_iter().map(match_notification).collect())
    }

    pub async fn chat_notifications(&self, user_id: &UserId) -> Result<Vec<Notification>, StoreError> {
        let uid = user_id.to_string();
        let rows = self
            .blocking("chat_notifications", move |db| db.get_chat_notifications(&uid))
            .await?;
        Ok(rows.into_iter().map(chat_notification).collect())
    }

    /// Store an unread chat notification for `recipient_id`.
    pub async fn insert_chat_notification(
        &self,
        chat_id: i64,
        content: Option<String>,
        sender_id: &UserId,
        recipient_id: &UserId,
        message_id: String,
    ) -> Result<i64, StoreError> {
        let sender = sender_id.to_string();
        let recipient = recipient_id.to_string();
        self.blocking("insert_chat_notification", move |db| {
            db.insert_chat_notification(chat_id, content.as_deref(), &sender, &recipient, &message_id)
        })
        .await
    }

    pub async fn mark_match_read(&self, user_id: &UserId) -> Result<usize, StoreError> {
        let uid = user_id.to_string();
        self.blocking("mark_match_read", move |db| db.mark_match_notifications_read(&uid))
            .await
    }

    pub async fn mark_chat_read(&self, user_id: &UserId) -> Result<usize, StoreError> {
        let uid = user_id.to_string();
        self.blocking("mark_chat_read", move |db| db.mark_chat_notifications_read(&uid))
            .await
    }

    /// Issue both read-marks together. Each failure is logged on its own;
    /// a failure of one does not undo the other.
    pub async fn mark_all_read(&self, user_id: &UserId) {
        let (matches, chats) = tokio::join!(self.mark_match_read(user_id), self.mark_chat_read(user_id));

        match (&matches, &chats) {
            (Ok(m), Ok(c)) => info!(
                "Notifications marked as read for user {} ({} match, {} chat)",
                user_id, m, c
            ),
            _ => {
                if let Err(e) = &matches {
                    warn!("Error marking match notifications as read for {}: {}", user_id, e);
                }
                if let Err(e) = &chats {
                    warn!("Error marking chat notifications as read for {}: {}", user_id, e);
                }
            }
        }
    }

    /// The room linkage row as seen from `sender_id`.
    pub async fn find_chat(&self, room_id: &RoomId, sender_id: &UserId) -> Result<Option<ChatRow>, StoreError> {
        let rid = room_id.to_string();
        let sid = sender_id.to_string();
        self.blocking("find_chat", move |db| db.get_chat_for_sender(&rid, &sid))
            .await
    }

    /// Append to the room log and set the room's last message in one mutation.
    pub async fn append_room_message(&self, room_id: &RoomId, message: &ChatMessage) -> Result<(), StoreError> {
        let rid = room_id.to_string();
        let message = message.clone();
        self.blocking("append_room_message", move |db| db.append_room_message(&rid, &message))
            .await
    }
}

fn match_notification(row: MatchFeedRow) -> Notification {
    Notification::Match(MatchNotification {
        created_at: parse_timestamp(&row.created_at, row.id),
        recipient_id: row.user_master_id.into(),
        counterpart_id: row.user_other_id.into(),
        counterpart_name: row.other_name,
        counterpart_image: row.other_image,
        is_read: row.is_read,
        chat_room_id: row.chat_room_id.map(RoomId::from),
    })
}

fn chat_notification(row: ChatFeedRow) -> Notification {
    Notification::Chat(ChatNotification {
        created_at: parse_timestamp(&row.created_at, row.id),
        recipient_id: row.user_receiver_id.into(),
        sender_id: row.user_sender_id.into(),
        content: row.content_chat,
        sender_name: row.sender_name,
        sender_image: row.sender_image,
        chat_room_id: row.chat_room_id.map(RoomId::from),
        message_id: row.message_id,
        is_read: row.is_read,
    })
}

/// Rows are written as RFC 3339; plain SQLite `datetime('now')` values are
/// accepted as naive UTC.
fn parse_timestamp(raw: &str, row_id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on notification {}: {}", raw, row_id, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> NotificationStore {
        NotificationStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn parses_both_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2026-03-01T08:30:00.000Z", 1), expected);
        assert_eq!(parse_timestamp("2026-03-01 08:30:00", 1), expected);
        assert_eq!(parse_timestamp("garbage", 1), DateTime::<Utc>::default());
    }

    #[tokio::test]
    async fn reads_map_rows_to_notifications() {
        let store = store();
        let db = store.db().clone();
        db.upsert_user_profile("bob", "Bob", &["b.png".into()]).unwrap();
        let (chat_id, _) = db.create_chat("room-1", "bob", "alice").unwrap();
        db.insert_match_notification("alice", "bob").unwrap();
        db.insert_chat_notification(chat_id, Some("hey"), "bob", "alice", "m-1")
            .unwrap();

        let alice = UserId::from("alice");
        let matches = store.match_notifications(&alice).await.unwrap();
        let Notification::Match(m) = &matches[0] else {
            panic!("expected a match notification");
        };
        assert_eq!(m.counterpart_id, UserId::from("bob"));
        assert_eq!(m.counterpart_image.as_deref(), Some("b.png"));
        // The pair row is (bob -> alice); alice's match has no room yet
        assert!(m.chat_room_id.is_none());

        let chats = store.chat_notifications(&alice).await.unwrap();
        let Notification::Chat(c) = &chats[0] else {
            panic!("expected a chat notification");
        };
        assert_eq!(c.sender_id, UserId::from("bob"));
        assert_eq!(c.sender_name.as_deref(), Some("Bob"));
        assert_eq!(c.chat_room_id, Some(RoomId::from("room-1")));
        assert!(!c.is_read);
    }

    #[tokio::test]
    async fn mark_all_read_flips_both_kinds() {
        let store = store();
        let db = store.db().clone();
        let (chat_id, _) = db.create_chat("room-1", "bob", "alice").unwrap();
        db.insert_match_notification("alice", "bob").unwrap();
        db.insert_chat_notification(chat_id, Some("hey"), "bob", "alice", "m-1")
            .unwrap();

        let alice = UserId::from("alice");
        store.mark_all_read(&alice).await;

        let matches = store.match_notifications(&alice).await.unwrap();
        let chats = store.chat_notifications(&alice).await.unwrap();
        assert!(matches.iter().chain(chats.iter()).all(Notification::is_read));
    }

    #[tokio::test]
    async fn one_failed_mark_does_not_block_the_other() {
        let store = store();
        let db = store.db().clone();
        db.insert_match_notification("alice", "bob").unwrap();
        db.with_conn_mut(|conn| {
            conn.execute_batch("DROP TABLE notification_chats")?;
            Ok(())
        })
        .unwrap();

        let alice = UserId::from("alice");
        assert!(store.mark_chat_read(&alice).await.is_err());
        store.mark_all_read(&alice).await;

        let matches = store.match_notifications(&alice).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].is_read());
    }

    #[tokio::test]
    async fn append_to_unknown_room_is_a_store_error() {
        let store = store();
        let message = ChatMessage {
            message_id: uuid::Uuid::new_v4(),
            sender_id: UserId::from("alice"),
            kind: "text".into(),
            content: Some("hi".into()),
            image_urls: vec![],
            timestamp: Utc::now(),
        };

        let err = store
            .append_room_message(&RoomId::from("missing"), &message)
            .await
            .unwrap_err();
        assert_eq!(err.op, "append_room_message");
    }
}
