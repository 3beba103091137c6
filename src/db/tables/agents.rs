//! Database methods for the agents table

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use crate::db::Database;
use crate::models::Agent;

impl Database {
    /// Register an agent with its custody wallet address. No-op if the agent
    /// already exists; the stored wallet address is never overwritten.
    pub fn insert_agent(&self, id: &str, wallet_address: &str) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO agents (id, wallet_address, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, wallet_address, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_agent(&self, id: &str) -> SqliteResult<Option<Agent>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, wallet_address, created_at FROM agents WHERE id = ?1")?;

        let agent = stmt
            .query_row([id], |row| {
                let created_at_str: String = row.get(2)?;
                Ok(Agent {
                    id: row.get(0)?,
                    wallet_address: row.get(1)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at_str)
                        .unwrap()
                        .with_timezone(&Utc),
                })
            })
            .ok();

        Ok(agent)
    }

    /// Look up an agent by its wallet address (case-insensitive).
    pub fn get_agent_by_wallet(&self, wallet_address: &str) -> SqliteResult<Option<Agent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, wallet_address, created_at FROM agents WHERE LOWER(wallet_address) = LOWER(?1)",
        )?;

        let agent = stmt
            .query_row([wallet_address], |row| {
                let created_at_str: String = row.get(2)?;
                Ok(Agent {
                    id: row.get(0)?,
                    wallet_address: row.get(1)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at_str)
                        .unwrap()
                        .with_timezone(&Utc),
                })
            })
            .ok();

        Ok(agent)
    }
}
