//! The service market: providers list what they sell, anyone can browse.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth;
use crate::error::ApiError;
use crate::models::AgentService;
use crate::settlement::intent::DEFAULT_CURRENCY;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateServiceBody {
    name: String,
    #[serde(default)]
    description: Option<String>,
    price: f64,
    #[serde(default)]
    currency: Option<String>,
    endpoint_url: String,
    #[serde(default)]
    collateral_amount: Option<f64>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1/market/services")
            .route("", web::post().to(create_service))
            .route("", web::get().to(list_services))
            .route("/{id}", web::get().to(get_service)),
    );
}

async fn create_service(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateServiceBody>,
) -> Result<HttpResponse, ApiError> {
    let agent_id = auth::identify_agent(&req, &state.db)?;
    let body = body.into_inner();

    if body.name.trim().is_empty() {
        return Err(ApiError::Validation("Service name must not be empty".to_string()));
    }
    if !(body.price.is_finite() && body.price >= 0.0) {
        return Err(ApiError::Validation(format!("Invalid price: {}", body.price)));
    }

    state.directory.ensure_agent(&agent_id).await?;

    let service = AgentService {
        id: format!("srv_{}", Uuid::new_v4()),
        provider_agent_id: agent_id,
        name: body.name,
        description: body.description,
        price: body.price,
        currency: body.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        endpoint_url: body.endpoint_url,
        collateral_amount: body.collateral_amount.unwrap_or(0.0),
        created_at: Utc::now(),
    };
    state.db.insert_service(&service)?;

    log::info!(
        "[Market] {} listed service {} ({})",
        service.provider_agent_id,
        service.id,
        service.name
    );

    Ok(HttpResponse::Ok().json(service))
}

// Browsing the market is public
async fn list_services(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let services = state.db.list_services()?;
    Ok(HttpResponse::Ok().json(services))
}

async fn get_service(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let service = state
        .db
        .get_service(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Service not found: {}", id)))?;
    Ok(HttpResponse::Ok().json(service))
}
