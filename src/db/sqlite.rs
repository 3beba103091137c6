use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(database_url)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn();

        // Agent identities; wallet_address is assigned once and never updated
        conn.execute(
            "CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                wallet_address TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Settled payments. Rows are written only after on-chain confirmation,
        // gas columns are decimal strings filled in by the sponsorship ledger.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                recipient TEXT NOT NULL,
                status TEXT NOT NULL,
                hash TEXT,
                memo TEXT,
                gas_used TEXT,
                gas_price TEXT,
                product_id TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS invoices (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                payer_id TEXT,
                payment_hash TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS agent_services (
                id TEXT PRIMARY KEY,
                provider_agent_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                price REAL NOT NULL,
                currency TEXT NOT NULL,
                endpoint_url TEXT NOT NULL,
                collateral_amount REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Only the sha256 digest of a key is ever stored
        conn.execute(
            "CREATE TABLE IF NOT EXISTS api_keys (
                key_hash TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                label TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}
