//! Invoice lifecycle: issue, fetch. Settlement happens through
//! `POST /v1/payments` with an `invoiceId`.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth;
use crate::error::ApiError;
use crate::models::{Invoice, InvoiceStatus};
use crate::settlement::intent::DEFAULT_CURRENCY;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateInvoiceBody {
    amount: f64,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    description: Option<String>,
    /// Restricts who may pay this invoice
    #[serde(default)]
    payer_id: Option<String>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1/invoices")
            .route("", web::post().to(create_invoice))
            .route("/{id}", web::get().to(get_invoice)),
    );
}

fn pay_link(invoice_id: &str) -> String {
    format!("weppo://pay/{}", invoice_id)
}

async fn create_invoice(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateInvoiceBody>,
) -> Result<HttpResponse, ApiError> {
    let agent_id = auth::identify_agent(&req, &state.db)?;
    let body = body.into_inner();

    if !(body.amount.is_finite() && body.amount > 0.0) {
        return Err(ApiError::Validation(format!("Invalid amount: {}", body.amount)));
    }

    // Issuing an invoice auto-registers the issuer and provisions its wallet
    state.directory.ensure_agent(&agent_id).await?;

    let invoice = Invoice {
        id: format!("inv_{}", Uuid::new_v4()),
        agent_id,
        amount: body.amount,
        currency: body.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        description: body.description,
        status: InvoiceStatus::Pending,
        payer_id: body.payer_id,
        payment_hash: None,
        created_at: Utc::now(),
    };
    state.db.insert_invoice(&invoice)?;

    log::info!("[Invoices] {} issued {}", invoice.agent_id, invoice.id);

    let mut value = serde_json::to_value(&invoice)
        .map_err(|e| ApiError::Internal(format!("Failed to serialize invoice: {}", e)))?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("payLink".to_string(), json!(pay_link(&invoice.id)));
    }
    Ok(HttpResponse::Ok().json(value))
}

async fn get_invoice(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let invoice = state
        .db
        .get_invoice(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Invoice not found: {}", id)))?;
    Ok(HttpResponse::Ok().json(invoice))
}
