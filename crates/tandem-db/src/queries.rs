use crate::Database;
use crate::models::{ChatFeedRow, ChatRow, MatchFeedRow};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

impl Database {
    // -- Profiles --

    pub fn upsert_user_profile(&self, user_id: &str, name: &str, images: &[String]) -> Result<()> {
        let images = serde_json::to_string(images)?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO user_profiles (user_id, name, image_profile) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET name = excluded.name, image_profile = excluded.image_profile",
                (user_id, name, &images),
            )?;
            Ok(())
        })
    }

    // -- Chats (room linkage) --

    /// Link two users to a room. Writes both direction rows in one
    /// transaction and returns their chat ids as (a -> b, b -> a).
    pub fn create_chat(&self, chat_room_id: &str, user_a: &str, user_b: &str) -> Result<(i64, i64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chats (chat_room_id, user_master, user_other) VALUES (?1, ?2, ?3)",
                (chat_room_id, user_a, user_b),
            )?;
            let forward = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO chats (chat_room_id, user_master, user_other) VALUES (?1, ?2, ?3)",
                (chat_room_id, user_b, user_a),
            )?;
            let backward = tx.last_insert_rowid();
            tx.commit()?;
            Ok((forward, backward))
        })
    }

    /// The linkage row of `chat_room_id` as seen from `sender`.
    pub fn get_chat_for_sender(&self, chat_room_id: &str, sender: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT chat_id, chat_room_id, user_master, user_other
                     FROM chats
                     WHERE chat_room_id = ?1 AND user_master = ?2",
                    (chat_room_id, sender),
                    |row| {
                        Ok(ChatRow {
                            chat_id: row.get(0)?,
                            chat_room_id: row.get(1)?,
                            user_master: row.get(2)?,
                            user_other: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Match notifications --

    pub fn insert_match_notification(&self, recipient: &str, counterpart: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notification_matching (user_master_id, user_other_id) VALUES (?1, ?2)",
                (recipient, counterpart),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_match_notifications(&self, recipient: &str) -> Result<Vec<MatchFeedRow>> {
        self.with_conn(|conn| query_match_feed(conn, recipient))
    }

    /// Returns the number of rows flipped to read.
    pub fn mark_match_notifications_read(&self, recipient: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE notification_matching SET is_read = 1
                 WHERE user_master_id = ?1 AND is_read = 0",
                [recipient],
            )?;
            Ok(n)
        })
    }

    // -- Chat notifications --

    pub fn insert_chat_notification(
        &self,
        chat_id: i64,
        content: Option<&str>,
        sender: &str,
        recipient: &str,
        message_id: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notification_chats
                 (chat_id, content_chat, user_sender_id, user_receiver_id, message_id, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                rusqlite::params![chat_id, content, sender, recipient, message_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_chat_notifications(&self, recipient: &str) -> Result<Vec<ChatFeedRow>> {
        self.with_conn(|conn| query_chat_feed(conn, recipient))
    }

    /// Returns the number of rows flipped to read.
    pub fn mark_chat_notifications_read(&self, recipient: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE notification_chats SET is_read = 1
                 WHERE user_receiver_id = ?1 AND is_read = 0",
                [recipient],
            )?;
            Ok(n)
        })
    }
}

fn query_match_feed(conn: &Connection, recipient: &str) -> Result<Vec<MatchFeedRow>> {
    // Profile and room come from LEFT JOINs so a missing profile never hides a row
    let mut stmt = conn.prepare(
        "SELECT n.id, n.user_master_id, n.user_other_id, p.name,
                json_extract(p.image_profile, '$[0]'), n.is_read, n.created_at,
                (SELECT c.chat_room_id FROM chats c
                  WHERE c.user_master = n.user_master_id AND c.user_other = n.user_other_id
                  ORDER BY c.chat_id DESC LIMIT 1)
         FROM notification_matching n
         LEFT JOIN user_profiles p ON n.user_other_id = p.user_id
         WHERE n.user_master_id = ?1
         ORDER BY n.created_at DESC, n.id ASC",
    )?;

    let rows = stmt
        .query_map([recipient], |row| {
            Ok(MatchFeedRow {
                id: row.get(0)?,
                user_master_id: row.get(1)?,
                user_other_id: row.get(2)?,
                other_name: row.get(3)?,
                other_image: row.get(4)?,
                is_read: row.get(5)?,
                created_at: row.get(6)?,
                chat_room_id: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_chat_feed(conn: &Connection, recipient: &str) -> Result<Vec<ChatFeedRow>> {
    let mut stmt = conn.prepare(
        "SELECT n.id, n.user_receiver_id, n.user_sender_id, n.content_chat, p.name,
                json_extract(p.image_profile, '$[0]'), c.chat_room_id, n.message_id,
                n.is_read, n.created_at
         FROM notification_chats n
         LEFT JOIN user_profiles p ON n.user_sender_id = p.user_id
         LEFT JOIN chats c ON c.chat_id = n.chat_id
         WHERE n.user_receiver_id = ?1
         ORDER BY n.created_at DESC, n.id ASC",
    )?;

    let rows = stmt
        .query_map([recipient], |row| {
            Ok(ChatFeedRow {
                id: row.get(0)?,
                user_receiver_id: row.get(1)?,
                user_sender_id: row.get(2)?,
                content_chat: row.get(3)?,
                sender_name: row.get(4)?,
                sender_image: row.get(5)?,
                chat_room_id: row.get(6)?,
                message_id: row.get(7)?,
                is_read: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
