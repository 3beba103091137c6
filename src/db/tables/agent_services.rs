//! Database methods for the agent_services table (market listings)

use chrono::{DateTime, Utc};
use rusqlite::{Result as SqliteResult, Row};

use crate::db::Database;
use crate::models::AgentService;

fn service_from_row(row: &Row) -> rusqlite::Result<AgentService> {
    let created_at_str: String = row.get(8)?;
    Ok(AgentService {
        id: row.get(0)?,
        provider_agent_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        price: row.get(4)?,
        currency: row.get(5)?,
        endpoint_url: row.get(6)?,
        collateral_amount: row.get(7)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const SERVICE_COLUMNS: &str =
    "id, provider_agent_id, name, description, price, currency, endpoint_url, collateral_amount, created_at";

impl Database {
    pub fn insert_service(&self, service: &AgentService) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO agent_services ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                SERVICE_COLUMNS
            ),
            rusqlite::params![
                service.id,
                service.provider_agent_id,
                service.name,
                service.description,
                service.price,
                service.currency,
                service.endpoint_url,
                service.collateral_amount,
                service.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_services(&self) -> SqliteResult<Vec<AgentService>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agent_services ORDER BY created_at DESC",
            SERVICE_COLUMNS
        ))?;
        let rows = stmt.query_map([], |row| service_from_row(row))?;
        rows.collect()
    }

    pub fn get_service(&self, id: &str) -> SqliteResult<Option<AgentService>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agent_services WHERE id = ?1",
            SERVICE_COLUMNS
        ))?;
        Ok(stmt.query_row([id], |row| service_from_row(row)).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn list_returns_inserted_services() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("test.db").to_str().unwrap()).unwrap();

        let service = AgentService {
            id: "srv_1".to_string(),
            provider_agent_id: "agent_seller".to_string(),
            name: "summarize".to_string(),
            description: None,
            price: 0.25,
            currency: "USDC".to_string(),
            endpoint_url: "https://seller.example/run".to_string(),
            collateral_amount: 0.0,
            created_at: Utc::now(),
        };
        db.insert_service(&service).unwrap();

        let all = db.list_services().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "summarize");
        assert_eq!(db.get_service("srv_1").unwrap().unwrap().price, 0.25);
    }
}
