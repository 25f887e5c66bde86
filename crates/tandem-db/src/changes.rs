//! Insert change feed over the notification tables.
//!
//! SQLite has no cross-process change stream, so a subscription is a poller
//! that remembers the highest row id it has seen and forwards every newer
//! row, in id order, over an mpsc channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rusqlite::Connection;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Database;
use crate::models::{ChatNotificationRow, MatchNotificationRow};

/// Buffered insert events per subscription before the poller waits.
const FEED_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchedTable {
    MatchNotifications,
    ChatNotifications,
}

impl WatchedTable {
    pub fn name(self) -> &'static str {
        match self {
            Self::MatchNotifications => "notification_matching",
            Self::ChatNotifications => "notification_chats",
        }
    }
}

/// A newly inserted row with its full field set.
#[derive(Debug, Clone)]
pub enum InsertEvent {
    Match(MatchNotificationRow),
    Chat(ChatNotificationRow),
}

impl InsertEvent {
    pub fn row_id(&self) -> i64 {
        match self {
            Self::Match(row) => row.id,
            Self::Chat(row) => row.id,
        }
    }

    pub fn table(&self) -> WatchedTable {
        match self {
            Self::Match(_) => WatchedTable::MatchNotifications,
            Self::Chat(_) => WatchedTable::ChatNotifications,
        }
    }
}

impl Database {
    pub fn max_row_id(&self, table: WatchedTable) -> Result<i64> {
        self.with_conn(|conn| {
            let sql = format!("SELECT COALESCE(MAX(id), 0) FROM {}", table.name());
            let id = conn.query_row(&sql, [], |r| r.get(0))?;
            Ok(id)
        })
    }

    /// Rows of `table` with an id greater than `after`, oldest first.
    pub fn inserts_after(&self, table: WatchedTable, after: i64) -> Result<Vec<InsertEvent>> {
        self.with_conn(|conn| match table {
            WatchedTable::MatchNotifications => query_match_inserts(conn, after),
            WatchedTable::ChatNotifications => query_chat_inserts(conn, after),
        })
    }
}

/// Subscribe to INSERT events on `table`.
///
/// Only rows inserted after this call are delivered. The poller stops when
/// `cancel` fires or the returned receiver is dropped. A failed poll is
/// logged and retried on the next tick without moving the cursor, so
/// delivery is at-least-once within a table.
pub async fn subscribe(
    db: Arc<Database>,
    table: WatchedTable,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<InsertEvent>> {
    let start_db = db.clone();
    let mut cursor = tokio::task::spawn_blocking(move || start_db.max_row_id(table)).await??;

    let (tx, rx) = mpsc::channel(FEED_BUFFER);
    info!("Subscribed to inserts on {} (after id {})", table.name(), cursor);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tx.closed() => break,
                _ = ticker.tick() => {}
            }

            let poll_db = db.clone();
            let polled =
                tokio::task::spawn_blocking(move || poll_db.inserts_after(table, cursor)).await;

            let events = match polled {
                Ok(Ok(events)) => events,
                Ok(Err(e)) => {
                    warn!("Change feed poll on {} failed: {}", table.name(), e);
                    continue;
                }
                Err(e) => {
                    warn!("Change feed poll task on {} failed: {}", table.name(), e);
                    continue;
                }
            };

            for event in events {
                let id = event.row_id();
                debug!("Insert on {} (id {})", table.name(), id);
                if tx.send(event).await.is_err() {
                    break;
                }
                cursor = id;
            }
        }

        info!("Change feed on {} stopped", table.name());
    });

    Ok(rx)
}

fn query_match_inserts(conn: &Connection, after: i64) -> Result<Vec<InsertEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_master_id, user_other_id, is_read, created_at
         FROM notification_matching
         WHERE id > ?1
         ORDER BY id",
    )?;

    let rows = stmt
        .query_map([after], |row| {
            Ok(InsertEvent::Match(MatchNotificationRow {
                id: row.get(0)?,
                user_master_id: row.get(1)?,
                user_other_id: row.get(2)?,
                is_read: row.get(3)?,
                created_at: row.get(4)?,
            }))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_chat_inserts(conn: &Connection, after: i64) -> Result<Vec<InsertEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, content_chat, user_sender_id, user_receiver_id, message_id,
                is_read, created_at
         FROM notification_chats
         WHERE id > ?1
         ORDER BY id",
    )?;

    let rows = stmt
        .query_map([after], |row| {
            Ok(InsertEvent::Chat(ChatNotificationRow {
                id: row.get(0)?,
                chat_id: row.get(1)?,
                content_chat: row.get(2)?,
                user_sender_id: row.get(3)?,
                user_receiver_id: row.get(4)?,
                message_id: row.get(5)?,
                is_read: row.get(6)?,
                created_at: row.get(7)?,
            }))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
