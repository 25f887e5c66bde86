use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tandem_types::events::{SendMessage, ServerEvent};
use tandem_types::models::ChatMessage;
use tandem_types::{RoomId, UserId};

use crate::error::{SendError, ValidationError};
use crate::hub::{ConnId, Hub};
use crate::presence::PresenceRegistry;
use crate::store::NotificationStore;

/// A `sendMessage` payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidMessage {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub kind: String,
    pub content: Option<String>,
    pub image_urls: Vec<String>,
}

impl TryFrom<SendMessage> for ValidMessage {
    type Error = ValidationError;

    fn try_from(msg: SendMessage) -> Result<Self, Self::Error> {
        let room_id = msg
            .room_id
            .filter(|r| !r.is_empty())
            .ok_or(ValidationError::MissingRoom)?;
        let sender_id = msg
            .user_id
            .filter(|u| !u.is_empty())
            .ok_or(ValidationError::MissingSender)?;
        let kind = msg
            .kind
            .filter(|k| !k.is_empty())
            .ok_or(ValidationError::MissingType)?;
        // An empty string counts as no content
        let content = msg.content.filter(|c| !c.is_empty());
        if content.is_none() && msg.image_urls.is_empty() {
            return Err(ValidationError::EmptyBody);
        }

        Ok(Self {
            room_id,
            sender_id,
            kind,
            content,
            image_urls: msg.image_urls,
        })
    }
}

/// Persists chat messages, fans them out to the room, and leaves a chat
/// notification behind when the other participant is not in the room.
#[derive(Clone)]
pub struct ChatRouter {
    store: NotificationStore,
    hub: Hub,
    registry: PresenceRegistry,
}

impl ChatRouter {
    pub fn new(store: NotificationStore, hub: Hub, registry: PresenceRegistry) -> Self {
        Self {
            store,
            hub,
            registry,
        }
    }

    pub async fn join_room(&self, conn_id: ConnId, room_id: RoomId) {
        info!("Connection {} joined room {}", conn_id, room_id);
        self.hub.join(conn_id, room_id).await;
    }

    pub async fn leave_room(&self, conn_id: ConnId, room_id: &RoomId) {
        info!("Connection {} left room {}", conn_id, room_id);
        self.hub.leave(conn_id, room_id).await;
    }

    /// Validate, persist and broadcast a message. Returns its id.
    ///
    /// Nothing is written or broadcast for invalid input or when the room
    /// append fails. Notification bookkeeping after the broadcast never
    /// fails the send.
    pub async fn send_message(&self, msg: SendMessage) -> Result<Uuid, SendError> {
        let valid = ValidMessage::try_from(msg)?;

        let message = ChatMessage {
            message_id: Uuid::new_v4(),
            sender_id: valid.sender_id,
            kind: valid.kind,
            content: valid.content,
            image_urls: valid.image_urls,
            timestamp: Utc::now(),
        };

        self.store.append_room_message(&valid.room_id, &message).await?;

        self.hub
            .broadcast_room(&valid.room_id, ServerEvent::ReceiveMessage(message.clone()))
            .await;
        self.hub.broadcast_room(&valid.room_id, ServerEvent::UpdateChats).await;

        self.notify_if_absent(&valid.room_id, &message).await;

        Ok(message.message_id)
    }

    /// Write a chat notification for the other participant unless their
    /// current connection is in the room.
    async fn notify_if_absent(&self, room_id: &RoomId, message: &ChatMessage) {
        let sender_id = &message.sender_id;
        let chat = match self.store.find_chat(room_id, sender_id).await {
            Ok(Some(chat)) => chat,
            Ok(None) => {
                warn!("No chat row for room {} and sender {}, skipping notification", room_id, sender_id);
                return;
            }
            Err(e) => {
                warn!("Error resolving participants of room {}: {}", room_id, e);
                return;
            }
        };

        let recipient_id = if sender_id.as_str() == chat.user_master {
            UserId::new(chat.user_other)
        } else {
            UserId::new(chat.user_master)
        };

        if self.registry.is_present_in_room(&recipient_id, room_id).await {
            debug!("{} is in room {}, no notification", recipient_id, room_id);
            return;
        }

        match self
            .store
            .insert_chat_notification(
                chat.chat_id,
                message.content.clone(),
                sender_id,
                &recipient_id,
                message.message_id.to_string(),
            )
            .await
        {
            Ok(_) => info!("Notification stored for user {} in chat {}", recipient_id, chat.chat_id),
            Err(e) => warn!("Error handling chat notification for {}: {}", recipient_id, e),
        }
    }
}
