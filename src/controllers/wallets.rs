use actix_web::{web, HttpResponse};

use crate::error::ApiError;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1/wallets")
            .route("/{agent_id}/balance", web::get().to(get_balance))
            .route("/{agent_id}/sponsorship", web::get().to(get_sponsorship)),
    );
}

async fn get_balance(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let agent_id = path.into_inner();
    let balance = state.engine.wallet_balance(&agent_id).await?;
    Ok(HttpResponse::Ok().json(balance))
}

/// How much gas the platform has sponsored for this agent, derived from the
/// payments table on every read.
async fn get_sponsorship(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let agent_id = path.into_inner();
    let stats = state.engine.paymaster().stats_for(&agent_id)?;
    Ok(HttpResponse::Ok().json(stats))
}
