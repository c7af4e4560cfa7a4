//! Chat assistant history operations

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{ChatMessage, ChatRole};

impl Database {
    pub fn insert_chat_message(&self, role: ChatRole, content: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO chat_messages (role, content) VALUES (?, ?)",
            params![role.as_str(), content],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent chat turns in chronological order.
    pub fn recent_chat_messages(&self, limit: i64) -> Result<Vec<ChatMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, role, content, created_at FROM (
                SELECT id, role, content, created_at
                FROM chat_messages ORDER BY id DESC LIMIT ?
            ) ORDER BY id ASC
            "#,
        )?;
        let messages = stmt
            .query_map(params![limit], |row| {
                let role: String = row.get(1)?;
                let created_at: String = row.get(3)?;
                Ok(ChatMessage {
                    id: row.get(0)?,
                    role: role.parse().unwrap_or(ChatRole::User),
                    content: row.get(2)?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}
