//! API-key issuance and request identification. Keys are `sk_live_<48 hex>`;
//! only the sha256 digest is stored, so a key is shown exactly once.

use actix_web::HttpRequest;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::db::Database;
use crate::error::ApiError;

const KEY_PREFIX: &str = "sk_live_";

pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}{}", KEY_PREFIX, hex::encode(bytes))
}

pub fn hash_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Issue a key for an agent and store its digest. Returns the plaintext key,
/// the only time it is ever visible.
pub fn create_key_for_agent(
    db: &Database,
    agent_id: &str,
    label: Option<&str>,
) -> Result<String, ApiError> {
    let api_key = generate_api_key();
    db.insert_api_key(&hash_key(&api_key), agent_id, label)?;
    Ok(api_key)
}

/// Identify the calling agent. A bearer API key is authoritative; the
/// `X-Agent-Id` header stands alone only when no key is presented, and must
/// match the key's owner when both are given.
pub fn identify_agent(req: &HttpRequest, db: &Arc<Database>) -> Result<String, ApiError> {
    let bearer = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let header_agent = req
        .headers()
        .get("X-Agent-Id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    if let Some(key) = bearer {
        let agent_id = db
            .agent_id_for_key_hash(&hash_key(key))?
            .ok_or_else(|| ApiError::Authentication("Invalid API key".to_string()))?;

        if let Some(claimed) = header_agent {
            if claimed != agent_id {
                return Err(ApiError::Forbidden(format!(
                    "API key does not belong to agent {}",
                    claimed
                )));
            }
        }
        return Ok(agent_id);
    }

    header_agent.ok_or_else(|| {
        ApiError::Authentication("Missing API key or X-Agent-Id header".to_string())
    })
}
