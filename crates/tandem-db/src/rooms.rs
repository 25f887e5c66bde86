use anyhow::{Result, anyhow};
use rusqlite::OptionalExtension;
use tandem_types::models::ChatMessage;

use crate::Database;

/// A room document: its full message log and the most recent message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRoomDoc {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub last_message: Option<ChatMessage>,
}

impl Database {
    /// Create an empty room document. No-op if the room already exists.
    pub fn create_chat_room(&self, room_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("INSERT OR IGNORE INTO chat_rooms (id) VALUES (?1)", [room_id])?;
            Ok(())
        })
    }

    /// Append `message` to the room log and make it the room's last message.
    ///
    /// Both fields change in one UPDATE statement, so no reader can observe
    /// the appended message without the matching `last_message`. Fails if
    /// the room document does not exist.
    pub fn append_room_message(&self, room_id: &str, message: &ChatMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE chat_rooms
                 SET messages = json_insert(messages, '$[#]', json(?1)),
                     last_message = json(?1)
                 WHERE id = ?2",
                (&json, room_id),
            )?;
            if updated == 0 {
                return Err(anyhow!("Chat room not found: {}", room_id));
            }
            Ok(())
        })
    }

    pub fn get_chat_room(&self, room_id: &str) -> Result<Option<ChatRoomDoc>> {
        let raw: Option<(String, Option<String>)> = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT messages, last_message FROM chat_rooms WHERE id = ?1",
                    [room_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(row)
        })?;

        let Some((messages, last_message)) = raw else {
            return Ok(None);
        };

        Ok(Some(ChatRoomDoc {
            id: room_id.to_string(),
            messages: serde_json::from_str(&messages)?,
            last_message: last_message
                .map(|m| serde_json::from_str(&m))
                .transpose()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tandem_types::UserId;
    use uuid::Uuid;

    fn message(content: &str) -> ChatMessage {
        ChatMessage {
            message_id: Uuid::new_v4(),
            sender_id: UserId::from("alice"),
            kind: "text".into(),
            content: Some(content.into()),
            image_urls: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn append_updates_log_and_last_message() {
        let db = Database::open_in_memory().unwrap();
        db.create_chat_room("room-1").unwrap();

        let first = message("one");
        let second = message("two");
        db.append_room_message("room-1", &first).unwrap();
        db.append_room_message("room-1", &second).unwrap();

        let room = db.get_chat_room("room-1").unwrap().unwrap();
        assert_eq!(room.messages, vec![first, second.clone()]);
        assert_eq!(room.last_message, Some(second));
    }

    #[test]
    fn append_to_missing_room_fails() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.append_room_message("nope", &message("hi")).is_err());
        assert!(db.get_chat_room("nope").unwrap().is_none());
    }

    #[test]
    fn create_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.create_chat_room("room-1").unwrap();
        db.append_room_message("room-1", &message("hi")).unwrap();
        db.create_chat_room("room-1").unwrap();

        let room = db.get_chat_room("room-1").unwrap().unwrap();
        assert_eq!(room.messages.len(), 1);
    }
}
