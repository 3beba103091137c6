//! Database methods for the payments table

use chrono::{DateTime, Utc};
use rusqlite::{Result as SqliteResult, Row};

use crate::db::Database;
use crate::models::{Payment, PaymentStatus};

fn payment_from_row(row: &Row) -> rusqlite::Result<Payment> {
    let status_str: String = row.get(5)?;
    let created_at_str: String = row.get(11)?;
    Ok(Payment {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        amount: row.get(2)?,
        currency: row.get(3)?,
        recipient: row.get(4)?,
        status: status_str.parse().unwrap_or(PaymentStatus::Confirmed),
        hash: row.get(6)?,
        memo: row.get(7)?,
        gas_used: row.get(8)?,
        gas_price: row.get(9)?,
        product_id: row.get(10)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const PAYMENT_COLUMNS: &str =
    "id, agent_id, amount, currency, recipient, status, hash, memo, gas_used, gas_price, product_id, created_at";

impl Database {
    pub fn insert_payment(&self, payment: &Payment) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            &format!("INSERT INTO payments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)", PAYMENT_COLUMNS),
            rusqlite::params![
                payment.id,
                payment.agent_id,
                payment.amount,
                payment.currency,
                payment.recipient,
                payment.status.to_string(),
                payment.hash,
                payment.memo,
                payment.gas_used,
                payment.gas_price,
                payment.product_id,
                payment.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_payment(&self, id: &str) -> SqliteResult<Option<Payment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM payments WHERE id = ?1",
            PAYMENT_COLUMNS
        ))?;
        Ok(stmt.query_row([id], |row| payment_from_row(row)).ok())
    }

    /// Attach a gas cost to a payment. Returns false when the payment is
    /// missing or already carries a cost, so recording stays at-most-once.
    pub fn record_payment_gas(
        &self,
        payment_id: &str,
        gas_used: &str,
        gas_price: &str,
    ) -> SqliteResult<bool> {
        let conn = self.conn();
        let affected = conn.execute(
            "UPDATE payments SET gas_used = ?2, gas_price = ?3 WHERE id = ?1 AND gas_used IS NULL",
            [payment_id, gas_used, gas_price],
        )?;
        Ok(affected > 0)
    }

    /// Gas columns for every sponsored payment of an agent, as decimal
    /// strings. Summation happens in the ledger with 256-bit math.
    pub fn sponsored_gas_for_agent(&self, agent_id: &str) -> SqliteResult<Vec<(String, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT gas_used, gas_price FROM payments
             WHERE agent_id = ?1 AND gas_used IS NOT NULL AND gas_price IS NOT NULL",
        )?;
        let rows = stmt.query_map([agent_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::new(path.to_str().unwrap()).unwrap();
        (db, dir)
    }

    fn sample_payment(id: &str) -> Payment {
        Payment {
            id: id.to_string(),
            agent_id: "agent_alpha".to_string(),
            amount: 0.5,
            currency: "USDC".to_string(),
            recipient: "0x1111111111111111111111111111111111111111".to_string(),
            status: PaymentStatus::Confirmed,
            hash: Some("0xabc".to_string()),
            memo: None,
            gas_used: None,
            gas_price: None,
            product_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let (db, _dir) = test_db();
        db.insert_payment(&sample_payment("pay_1")).unwrap();

        let stored = db.get_payment("pay_1").unwrap().unwrap();
        assert_eq!(stored.agent_id, "agent_alpha");
        assert_eq!(stored.status, PaymentStatus::Confirmed);
        assert_eq!(stored.hash.as_deref(), Some("0xabc"));
        assert!(db.get_payment("pay_missing").unwrap().is_none());
    }

    #[test]
    fn gas_is_recorded_at_most_once() {
        let (db, _dir) = test_db();
        db.insert_payment(&sample_payment("pay_1")).unwrap();

        assert!(db.record_payment_gas("pay_1", "21000", "1000000000").unwrap());
        assert!(!db.record_payment_gas("pay_1", "99999", "9").unwrap());
        assert!(!db.record_payment_gas("pay_missing", "1", "1").unwrap());

        let stored = db.get_payment("pay_1").unwrap().unwrap();
        assert_eq!(stored.gas_used.as_deref(), Some("21000"));
        assert_eq!(stored.gas_price.as_deref(), Some("1000000000"));
    }

    #[test]
    fn sponsored_gas_only_returns_recorded_rows() {
        let (db, _dir) = test_db();
        db.insert_payment(&sample_payment("pay_1")).unwrap();
        db.insert_payment(&sample_payment("pay_2")).unwrap();
        db.record_payment_gas("pay_1", "21000", "2").unwrap();

        let rows = db.sponsored_gas_for_agent("agent_alpha").unwrap();
        assert_eq!(rows, vec![("21000".to_string(), "2".to_string())]);
        assert!(db.sponsored_gas_for_agent("agent_other").unwrap().is_empty());
    }
}
