//! Codec endpoints for the `Weppo` 402 header protocol, so providers that
//! don't embed the SDK can still speak it:
//! - `POST /v1/x402/challenge` — format a challenge header from its fields
//! - `POST /v1/x402/verify`   — inspect a received header; proof headers are
//!   checked against the payments table

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::models::PaymentStatus;
use crate::x402::{self, Challenge};
use crate::AppState;

#[derive(Debug, Deserialize)]
struct VerifyBody {
    header: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1/x402")
            .route("/challenge", web::post().to(build_challenge))
            .route("/verify", web::post().to(verify_header)),
    );
}

enum HeaderKind<'a> {
    Challenge(Challenge),
    Proof(&'a str),
    Unknown,
}

/// A proof is the keyword plus a bare payment id; anything with key="value"
/// pairs is a challenge.
fn classify(header: &str) -> HeaderKind<'_> {
    if let Some(id) = x402::parse_payment_proof(header) {
        if !id.contains('=') && !id.contains(' ') {
            return HeaderKind::Proof(id);
        }
    }
    match x402::decode_challenge(header) {
        Some(challenge) => HeaderKind::Challenge(challenge),
        None => HeaderKind::Unknown,
    }
}

async fn build_challenge(body: web::Json<Challenge>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "header": x402::encode_challenge(&body) }))
}

async fn verify_header(
    state: web::Data<AppState>,
    body: web::Json<VerifyBody>,
) -> Result<HttpResponse, ApiError> {
    match classify(body.header.trim()) {
        HeaderKind::Proof(payment_id) => {
            let payment = state.db.get_payment(payment_id)?;
            let settled = payment
                .as_ref()
                .map(|p| p.status == PaymentStatus::Confirmed)
                .unwrap_or(false);
            Ok(HttpResponse::Ok().json(json!({
                "kind": "proof",
                "paymentId": payment_id,
                "settled": settled,
                "payment": payment,
            })))
        }
        HeaderKind::Challenge(challenge) => {
            Ok(HttpResponse::Ok().json(json!({ "kind": "challenge", "challenge": challenge })))
        }
        HeaderKind::Unknown => Ok(HttpResponse::Ok().json(json!({ "kind": "unknown" }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_proofs_challenges_and_foreign_headers() {
        assert!(matches!(classify("Weppo pay_abc"), HeaderKind::Proof("pay_abc")));
        assert!(matches!(
            classify(r#"Weppo amount="0.5", recipient="agent_B""#),
            HeaderKind::Challenge(_)
        ));
        assert!(matches!(classify("Bearer sk_live_x"), HeaderKind::Unknown));
    }
}
