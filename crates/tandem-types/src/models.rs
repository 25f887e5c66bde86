use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{RoomId, UserId};

/// A "you have a new match" entry for `recipient_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchNotification {
    pub recipient_id: UserId,
    pub counterpart_id: UserId,
    pub counterpart_name: Option<String>,
    pub counterpart_image: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    /// Present once a chat room has been opened between the two users.
    pub chat_room_id: Option<RoomId>,
}

/// A chat message that arrived while the recipient was not in the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatNotification {
    pub recipient_id: UserId,
    pub sender_id: UserId,
    pub content: Option<String>,
    pub sender_name: Option<String>,
    pub sender_image: Option<String>,
    pub chat_room_id: Option<RoomId>,
    pub message_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// One entry of a user's merged notification feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Match(MatchNotification),
    Chat(ChatNotification),
}

impl Notification {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Match(n) => n.created_at,
            Self::Chat(n) => n.created_at,
        }
    }

    pub fn is_read(&self) -> bool {
        match self {
            Self::Match(n) => n.is_read,
            Self::Chat(n) => n.is_read,
        }
    }

    pub fn recipient_id(&self) -> &UserId {
        match self {
            Self::Match(n) => &n.recipient_id,
            Self::Chat(n) => &n.recipient_id,
        }
    }
}

/// A message appended to a room's log. Never edited once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub sender_id: UserId,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
