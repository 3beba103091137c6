//! Database methods for the api_keys table

use chrono::Utc;
use rusqlite::Result as SqliteResult;

use crate::db::Database;

impl Database {
    pub fn insert_api_key(
        &self,
        key_hash: &str,
        agent_id: &str,
        label: Option<&str>,
    ) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO api_keys (key_hash, agent_id, label, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![key_hash, agent_id, label, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Resolve a key digest to its owning agent.
    pub fn agent_id_for_key_hash(&self, key_hash: &str) -> SqliteResult<Option<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT agent_id FROM api_keys WHERE key_hash = ?1")?;
        Ok(stmt.query_row([key_hash], |row| row.get(0)).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn key_hash_resolves_to_agent() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("test.db").to_str().unwrap()).unwrap();

        db.insert_api_key("deadbeef", "agent_alpha", Some("ci")).unwrap();
        assert_eq!(
            db.agent_id_for_key_hash("deadbeef").unwrap().as_deref(),
            Some("agent_alpha")
        );
        assert!(db.agent_id_for_key_hash("cafebabe").unwrap().is_none());
    }
}
