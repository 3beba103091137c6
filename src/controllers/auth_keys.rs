//! API-key issuance. Creating a key also provisions the agent's custody
//! wallet, so a fresh agent is ready to transact immediately.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateKeyRequest {
    agent_id: String,
    #[serde(default)]
    label: Option<String>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/auth/keys").route(web::post().to(create_key)));
}

async fn create_key(
    state: web::Data<AppState>,
    body: web::Json<CreateKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    if body.agent_id.trim().is_empty() {
        return Err(ApiError::Validation("agentId must not be empty".to_string()));
    }

    let agent = state.directory.ensure_agent(&body.agent_id).await?;
    let api_key = auth::create_key_for_agent(&state.db, &agent.id, body.label.as_deref())?;

    log::info!("[Auth] Issued API key for {}", agent.id);

    // The plaintext key appears in this response and nowhere else
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "apiKey": api_key,
        "agentId": agent.id,
        "label": body.label,
        "walletAddress": agent.wallet_address
    })))
}
