//! Database row types. These map directly to SQLite rows and are distinct
//! from the tandem-types models to keep the DB layer independent.

/// Raw `notification_matching` row, as delivered by the change feed.
#[derive(Debug, Clone)]
pub struct MatchNotificationRow {
    pub id: i64,
    pub user_master_id: String,
    pub user_other_id: String,
    pub is_read: bool,
    pub created_at: String,
}

/// Raw `notification_chats` row, as delivered by the change feed.
#[derive(Debug, Clone)]
pub struct ChatNotificationRow {
    pub id: i64,
    pub chat_id: i64,
    pub content_chat: Option<String>,
    pub user_sender_id: String,
    pub user_receiver_id: String,
    pub message_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// Match notification joined with the counterpart's profile and, when one
/// exists, the room opened between the pair.
pub struct MatchFeedRow {
    pub id: i64,
    pub user_master_id: String,
    pub user_other_id: String,
    pub other_name: Option<String>,
    pub other_image: Option<String>,
    pub is_read: bool,
    pub created_at: String,
    pub chat_room_id: Option<String>,
}

/// Chat notification joined with the sender's profile and the room id.
pub struct ChatFeedRow {
    pub id: i64,
    pub user_receiver_id: String,
    pub user_sender_id: String,
    pub content_chat: Option<String>,
    pub sender_name: Option<String>,
    pub sender_image: Option<String>,
    pub chat_room_id: Option<String>,
    pub message_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// One direction of a conversation in the `chats` linkage table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRow {
    pub chat_id: i64,
    pub chat_room_id: String,
    pub user_master: String,
    pub user_other: String,
}
