use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use ethers::types::Address;
use std::sync::Arc;
use std::time::Duration;

mod auth;
mod chain;
mod config;
mod controllers;
mod db;
mod error;
mod models;
mod settlement;
mod wallet;
mod x402;

use chain::{EvmRpc, HttpChainGateway};
use config::Config;
use db::Database;
use settlement::SettlementEngine;
use wallet::{CustodyClient, NoCustody, WalletCustody, WalletDirectory};

/// Base Sepolia
const CHAIN_ID: u64 = 84532;

pub struct AppState {
    pub db: Arc<Database>,
    pub engine: Arc<SettlementEngine>,
    pub directory: Arc<WalletDirectory>,
}

fn parse_address(label: &str, value: &str) -> std::io::Result<Address> {
    value.parse().map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Invalid {} address: {}", label, value),
        )
    })
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url).expect("Failed to initialize database");
    let db = Arc::new(db);

    let usdc = parse_address("USDC", &config.usdc_address)?;
    let escrow = parse_address("escrow", &config.escrow_address)?;
    let forwarder = parse_address("forwarder", &config.forwarder_address)?;

    // Custody, chain gateway and engine are built here and injected; nothing
    // reads the environment after this point.
    let custody: Arc<dyn WalletCustody> = match config.custody_url.as_deref() {
        Some(url) => {
            log::info!("Using wallet custody service at {}", url);
            Arc::new(CustodyClient::new(url, config.custody_api_key.clone()))
        }
        None => Arc::new(NoCustody),
    };

    let receipt_timeout = Duration::from_secs(config.receipt_timeout_secs);
    let rpc = EvmRpc::new(&config.rpc_url, CHAIN_ID);
    let gateway = HttpChainGateway::new(
        rpc,
        custody.clone(),
        config.relayer_private_key.as_deref(),
        receipt_timeout,
    )
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let directory = Arc::new(WalletDirectory::new(db.clone(), custody));
    let engine = Arc::new(SettlementEngine::new(
        db.clone(),
        Arc::new(gateway),
        directory.clone(),
        usdc,
        escrow,
        forwarder,
        config.explorer_base_url.clone(),
        receipt_timeout,
    ));

    log::info!("Starting Weppo API server on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                engine: Arc::clone(&engine),
                directory: Arc::clone(&directory),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::auth_keys::config)
            .configure(controllers::payments::config)
            .configure(controllers::wallets::config)
            .configure(controllers::market::config)
            .configure(controllers::invoices::config)
            .configure(controllers::x402::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
