use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tandem_db::changes::InsertEvent;
use tandem_types::UserId;
use tandem_types::events::ServerEvent;

use crate::aggregator::Aggregator;
use crate::hub::Hub;
use crate::presence::PresenceRegistry;

/// Pushes a fresh feed to the recipient of every new notification row.
///
/// Delivery is best-effort: a recipient without a live connection, or a
/// push that fails, is logged and the event counts as handled. The row in
/// the store stays the durable record for the next explicit fetch.
#[derive(Clone)]
pub struct ChangeListener {
    aggregator: Aggregator,
    registry: PresenceRegistry,
    hub: Hub,
}

impl ChangeListener {
    pub fn new(aggregator: Aggregator, registry: PresenceRegistry, hub: Hub) -> Self {
        Self {
            aggregator,
            registry,
            hub,
        }
    }

    /// Consume one table's insert stream until it closes.
    pub fn spawn(&self, events: mpsc::Receiver<InsertEvent>) -> JoinHandle<()> {
        let listener = self.clone();
        tokio::spawn(listener.run(events))
    }

    pub async fn run(self, mut events: mpsc::Receiver<InsertEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(&event).await;
        }
        info!("Change listener stopped");
    }

    /// Handle one insert: rebuild the recipient's feed and push it, then
    /// push the table's list-changed signal.
    pub async fn dispatch(&self, event: &InsertEvent) {
        let (recipient, signal) = match event {
            InsertEvent::Match(row) => (UserId::new(row.user_master_id.as_str()), ServerEvent::UpdateMatches),
            InsertEvent::Chat(row) => (UserId::new(row.user_receiver_id.as_str()), ServerEvent::UpdateChats),
        };

        info!("New notification {} on {} for {}", event.row_id(), event.table().name(), recipient);

        let Some(conn_id) = self.registry.lookup(&recipient).await else {
            debug!("{} has no live connection, skipping push", recipient);
            return;
        };

        let feed = self.aggregator.build_feed(&recipient).await;
        if let Err(e) = self.hub.send(conn_id, ServerEvent::NewNotifications(feed)).await {
            warn!("Error emitting notifications to {}: {}", recipient, e);
            return;
        }
        if let Err(e) = self.hub.send(conn_id, signal).await {
            warn!("Error emitting update signal to {}: {}", recipient, e);
        }
    }
}
