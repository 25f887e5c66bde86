use serde::{Deserialize, Serialize};

use crate::ids::{RoomId, UserId};
use crate::models::{ChatMessage, Notification};

/// Events pushed FROM server TO client over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// The recipient's full merged feed, newest first
    NewNotifications(Vec<Notification>),

    /// Signal: the match list changed, refetch it
    UpdateMatches,

    /// Signal: the chat list changed, refetch it
    UpdateChats,

    /// A message posted to a room this connection has joined
    ReceiveMessage(ChatMessage),
}

impl ServerEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewNotifications(_) => "newNotifications",
            Self::UpdateMatches => "updateMatches",
            Self::UpdateChats => "updateChats",
            Self::ReceiveMessage(_) => "receiveMessage",
        }
    }
}

/// Commands sent FROM client TO server over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Bind this connection to a user id
    RegisterUser(UserId),

    /// Ask for the merged feed; answered with `newNotifications`
    FetchNotifications(UserId),

    /// Flip every unread notification of the user to read
    MarkNotificationsAsRead(UserId),

    JoinRoom(RoomId),

    LeaveRoom(RoomId),

    SendMessage(SendMessage),
}

/// Payload of `sendMessage`. Every field is optional on the wire so that
/// malformed requests reach validation instead of failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}
