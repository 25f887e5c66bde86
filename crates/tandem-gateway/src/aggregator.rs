use tracing::warn;

use tandem_types::UserId;
use tandem_types::models::Notification;

use crate::store::NotificationStore;

/// Builds a user's merged notification feed.
#[derive(Clone)]
pub struct Aggregator {
    store: NotificationStore,
}

impl Aggregator {
    pub fn new(store: NotificationStore) -> Self {
        Self { store }
    }

    /// Match and chat notifications of `user_id`, newest first.
    ///
    /// Both reads run concurrently. A failed read contributes nothing, so
    /// the feed is empty rather than an error when both fail.
    pub async fn build_feed(&self, user_id: &UserId) -> Vec<Notification> {
        let (matches, chats) = tokio::join!(
            self.store.match_notifications(user_id),
            self.store.chat_notifications(user_id),
        );

        let matches = matches.unwrap_or_else(|e| {
            warn!("Error fetching match notifications for {}: {}", user_id, e);
            Vec::new()
        });
        let chats = chats.unwrap_or_else(|e| {
            warn!("Error fetching chat notifications for {}: {}", user_id, e);
            Vec::new()
        });

        merge_feed(matches, chats)
    }
}

/// Concatenate both sources and order by `created_at` descending. The sort
/// is stable: equal timestamps keep arrival order, match entries first.
pub fn merge_feed(matches: Vec<Notification>, chats: Vec<Notification>) -> Vec<Notification> {
    let mut feed = matches;
    feed.extend(chats);
    feed.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    feed
}
