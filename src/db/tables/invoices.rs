//! Database methods for the invoices table

use chrono::{DateTime, Utc};
use rusqlite::{Result as SqliteResult, Row};

use crate::db::Database;
use crate::models::{Invoice, InvoiceStatus};

fn invoice_from_row(row: &Row) -> rusqlite::Result<Invoice> {
    let status_str: String = row.get(5)?;
    let created_at_str: String = row.get(8)?;
    Ok(Invoice {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        amount: row.get(2)?,
        currency: row.get(3)?,
        description: row.get(4)?,
        status: status_str.parse().unwrap_or(InvoiceStatus::Pending),
        payer_id: row.get(6)?,
        payment_hash: row.get(7)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const INVOICE_COLUMNS: &str =
    "id, agent_id, amount, currency, description, status, payer_id, payment_hash, created_at";

impl Database {
    pub fn insert_invoice(&self, invoice: &Invoice) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO invoices ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                INVOICE_COLUMNS
            ),
            rusqlite::params![
                invoice.id,
                invoice.agent_id,
                invoice.amount,
                invoice.currency,
                invoice.description,
                invoice.status.to_string(),
                invoice.payer_id,
                invoice.payment_hash,
                invoice.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_invoice(&self, id: &str) -> SqliteResult<Option<Invoice>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM invoices WHERE id = ?1",
            INVOICE_COLUMNS
        ))?;
        Ok(stmt.query_row([id], |row| invoice_from_row(row)).ok())
    }

    /// Claim the pending -> paid transition. Returns false when the invoice
    /// was already settled (or cancelled), so exactly one caller wins a race.
    pub fn mark_invoice_paid(&self, id: &str, payment_hash: &str) -> SqliteResult<bool> {
        let conn = self.conn();
        let affected = conn.execute(
            "UPDATE invoices SET status = 'paid', payment_hash = ?2
             WHERE id = ?1 AND status = 'pending'",
            [id, payment_hash],
        )?;
        Ok(affected > 0)
    }
}
