use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE user_profiles (
                user_id         TEXT PRIMARY KEY,
                name            TEXT,
                image_profile   TEXT NOT NULL DEFAULT '[]'
            );

            -- One row per direction of a conversation: (room, A, B) and (room, B, A)
            CREATE TABLE chats (
                chat_id         INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_room_id    TEXT NOT NULL,
                user_master     TEXT NOT NULL,
                user_other      TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(chat_room_id, user_master)
            );

            CREATE INDEX idx_chats_pair ON chats(user_master, user_other);

            CREATE TABLE notification_matching (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_master_id  TEXT NOT NULL,
                user_other_id   TEXT NOT NULL,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_notification_matching_recipient
                ON notification_matching(user_master_id, created_at);

            CREATE TABLE notification_chats (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id             INTEGER NOT NULL REFERENCES chats(chat_id),
                content_chat        TEXT,
                user_sender_id      TEXT NOT NULL,
                user_receiver_id    TEXT NOT NULL,
                message_id          TEXT,
                is_read             INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_notification_chats_recipient
                ON notification_chats(user_receiver_id, created_at);

            -- Room documents: the message log is a JSON array, last_message a JSON object
            CREATE TABLE chat_rooms (
                id              TEXT PRIMARY KEY,
                messages        TEXT NOT NULL DEFAULT '[]',
                last_message    TEXT
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
