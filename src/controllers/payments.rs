//! Payment endpoints: direct/invoice/purchase settlement, escrow
//! pre-authorize/charge (custodial and relayed), and escrow deposits.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth;
use crate::error::ApiError;
use crate::models::PaymentStatus;
use crate::settlement::relay::ForwardRequestBody;
use crate::settlement::{parse_forward_request, PaymentRequest, SettledPayment};
use crate::x402;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentBody {
    #[serde(default)]
    to: Option<String>,
    /// Accepted alias for `to`
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default)]
    invoice_id: Option<String>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    memo: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreAuthorizeBody {
    spender: String,
    max_amount: f64,
}

#[derive(Debug, Deserialize)]
struct ChargeBody {
    from: String,
    amount: f64,
    #[serde(default)]
    memo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepositBody {
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct MetaBody {
    request: ForwardRequestBody,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1/payments")
            .route("", web::post().to(create_payment))
            .route("/pre-authorize", web::post().to(pre_authorize))
            .route("/pre-authorize-meta", web::post().to(pre_authorize_meta))
            .route("/charge", web::post().to(charge))
            .route("/charge-meta", web::post().to(charge_meta))
            .route("/deposit", web::post().to(deposit))
            .route("/{id}", web::get().to(get_payment)),
    );
}

fn settled_response(state: &AppState, settled: SettledPayment) -> HttpResponse {
    let hash = settled.payment.hash.clone().unwrap_or_default();
    HttpResponse::Ok().json(json!({
        "id": settled.payment.id,
        "status": settled.payment.status,
        "amount": settled.payment.amount,
        "currency": settled.payment.currency,
        "to": settled.payment.recipient,
        "hash": hash,
        "explorerUrl": state.engine.explorer_url(&hash),
        "sponsorship": settled.sponsorship,
        "createdAt": settled.payment.created_at.to_rfc3339(),
    }))
}

async fn create_payment(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreatePaymentBody>,
) -> Result<HttpResponse, ApiError> {
    let agent_id = auth::identify_agent(&req, &state.db)?;
    let body = body.into_inner();

    log::info!("[API] POST /v1/payments from {}", agent_id);

    let request = PaymentRequest {
        to: body.recipient.or(body.to),
        invoice_id: body.invoice_id,
        amount: body.amount,
        currency: body.currency,
        product_id: body.product_id,
        memo: body.memo,
    };

    let settled = state.engine.execute_payment(&agent_id, request).await?;
    Ok(settled_response(&state, settled))
}

async fn get_payment(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let payment = state
        .db
        .get_payment(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Payment not found: {}", id)))?;

    let mut value = serde_json::to_value(&payment)
        .map_err(|e| ApiError::Internal(format!("Failed to serialize payment: {}", e)))?;
    if let Some(obj) = value.as_object_mut() {
        if let Some(hash) = payment.hash.as_deref() {
            obj.insert("explorerUrl".to_string(), json!(state.engine.explorer_url(hash)));
        }
        // Ready-made Authorization header for retrying a 402'd request
        if payment.status == PaymentStatus::Confirmed {
            obj.insert(
                "proofHeader".to_string(),
                json!(x402::format_payment_proof(&payment.id)),
            );
        }
    }
    Ok(HttpResponse::Ok().json(value))
}

async fn pre_authorize(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<PreAuthorizeBody>,
) -> Result<HttpResponse, ApiError> {
    let agent_id = auth::identify_agent(&req, &state.db)?;
    let tx_hash = state
        .engine
        .pre_authorize(&agent_id, &body.spender, body.max_amount)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "status": "confirmed", "txHash": tx_hash })))
}

async fn charge(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ChargeBody>,
) -> Result<HttpResponse, ApiError> {
    let agent_id = auth::identify_agent(&req, &state.db)?;
    let body = body.into_inner();
    let settled = state
        .engine
        .charge(&agent_id, &body.from, body.amount, body.memo)
        .await?;
    Ok(settled_response(&state, settled))
}

async fn deposit(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<DepositBody>,
) -> Result<HttpResponse, ApiError> {
    let agent_id = auth::identify_agent(&req, &state.db)?;
    let outcome = state.engine.deposit(&agent_id, body.amount).await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "confirmed",
        "hash": outcome.hash,
        "gasUsed": outcome.gas_used.to_string(),
        "effectiveGasPrice": outcome.effective_gas_price.to_string(),
        "explorerUrl": state.engine.explorer_url(&outcome.hash),
    })))
}

// Meta-transaction endpoints: the caller signed locally, the platform's
// relayer submits. No agent identification; the forwarder contract verifies
// the embedded signature.

async fn pre_authorize_meta(
    state: web::Data<AppState>,
    body: web::Json<MetaBody>,
) -> Result<HttpResponse, ApiError> {
    log::info!("[API] Relaying pre-authorize meta-tx from {}", body.request.from);
    let call = parse_forward_request(&body.request)?;
    let outcome = state.engine.relay(call).await?;

    Ok(HttpResponse::Ok().json(json!({ "status": "confirmed", "txHash": outcome.hash })))
}

async fn charge_meta(
    state: web::Data<AppState>,
    body: web::Json<MetaBody>,
) -> Result<HttpResponse, ApiError> {
    // The signer may or may not be a registered agent; attribution is
    // best-effort and only informational for relayed traffic
    match state.db.get_agent_by_wallet(&body.request.from)? {
        Some(agent) => log::info!(
            "[API] Relaying charge meta-tx from {} (agent {})",
            body.request.from,
            agent.id
        ),
        None => log::info!("[API] Relaying charge meta-tx from {}", body.request.from),
    }
    let call = parse_forward_request(&body.request)?;
    let outcome = state.engine.relay(call).await?;

    // Same response shape as direct settlement, so callers cannot tell the
    // paths apart
    Ok(HttpResponse::Ok().json(json!({
        "status": "confirmed",
        "hash": outcome.hash,
        "gasUsed": outcome.gas_used.to_string(),
        "effectiveGasPrice": outcome.effective_gas_price.to_string(),
        "explorerUrl": state.engine.explorer_url(&outcome.hash),
    })))
}
