//! The HTTP-402 challenge/response header protocol agents speak between
//! themselves. A provider answers 402 with a `Weppo` challenge stating the
//! price; the payer settles and retries with a `Weppo <paymentId>` proof.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const KEYWORD: &str = "Weppo";

/// Compiled once; the pattern is a literal, so it cannot fail at runtime.
fn pair_regex() -> &'static Regex {
    static PAIR: OnceLock<Regex> = OnceLock::new();
    PAIR.get_or_init(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("valid header pair pattern"))
}

/// A payment challenge carried in a provider's `WWW-Authenticate` header.
/// Fields not present in the header are simply absent; no defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// The agent id to pay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Set when the provider pre-generated an invoice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    /// Opaque token to include in the retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Parse a challenge header. A foreign leading keyword yields `None`;
/// `amount` is parsed as a float, everything else stays a string.
pub fn decode_challenge(header: &str) -> Option<Challenge> {
    let content = header.strip_prefix(KEYWORD)?.strip_prefix(' ')?;

    let mut challenge = Challenge::default();

    for capture in pair_regex().captures_iter(content) {
        let key = &capture[1];
        let value = &capture[2];
        match key {
            "realm" => challenge.realm = Some(value.to_string()),
            "description" => challenge.description = Some(value.to_string()),
            "amount" => challenge.amount = value.parse().ok(),
            "currency" => challenge.currency = Some(value.to_string()),
            "recipient" => challenge.recipient = Some(value.to_string()),
            "invoiceId" => challenge.invoice_id = Some(value.to_string()),
            "token" => challenge.token = Some(value.to_string()),
            _ => {}
        }
    }

    Some(challenge)
}

/// Format a challenge for a 402 response. Only populated fields appear.
pub fn encode_challenge(challenge: &Challenge) -> String {
    let mut pairs: Vec<String> = Vec::new();

    if let Some(ref realm) = challenge.realm {
        pairs.push(format!("realm=\"{}\"", realm));
    }
    if let Some(ref description) = challenge.description {
        pairs.push(format!("description=\"{}\"", description));
    }
    if let Some(amount) = challenge.amount {
        pairs.push(format!("amount=\"{}\"", amount));
    }
    if let Some(ref currency) = challenge.currency {
        pairs.push(format!("currency=\"{}\"", currency));
    }
    if let Some(ref recipient) = challenge.recipient {
        pairs.push(format!("recipient=\"{}\"", recipient));
    }
    if let Some(ref invoice_id) = challenge.invoice_id {
        pairs.push(format!("invoiceId=\"{}\"", invoice_id));
    }
    if let Some(ref token) = challenge.token {
        pairs.push(format!("token=\"{}\"", token));
    }

    format!("{} {}", KEYWORD, pairs.join(", "))
}

/// The `Authorization` header proving a payment: keyword, one space, the
/// payment id, no quoting.
pub fn format_payment_proof(payment_id: &str) -> String {
    format!("{} {}", KEYWORD, payment_id)
}

/// Extract the payment id from a proof header.
pub fn parse_payment_proof(header: &str) -> Option<&str> {
    let id = header.strip_prefix(KEYWORD)?.strip_prefix(' ')?.trim();
    if id.is_empty() { None } else { Some(id) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_keyword_yields_none() {
        assert_eq!(decode_challenge(""), None);
        assert_eq!(decode_challenge("Basic xyz"), None);
        assert_eq!(decode_challenge("Bearer abc123"), None);
    }

    #[test]
    fn parses_a_full_challenge() {
        let header =
            r#"Weppo realm="AgentService", amount="0.5", currency="USDC", recipient="agent_B""#;
        let challenge = decode_challenge(header).unwrap();

        assert_eq!(challenge.realm.as_deref(), Some("AgentService"));
        assert_eq!(challenge.amount, Some(0.5));
        assert_eq!(challenge.currency.as_deref(), Some("USDC"));
        assert_eq!(challenge.recipient.as_deref(), Some("agent_B"));
        assert_eq!(challenge.invoice_id, None);
    }

    #[test]
    fn parses_invoice_and_token_fields() {
        let challenge = decode_challenge(r#"Weppo invoiceId="inv_123", token="abc""#).unwrap();
        assert_eq!(challenge.invoice_id.as_deref(), Some("inv_123"));
        assert_eq!(challenge.token.as_deref(), Some("abc"));
        assert_eq!(challenge.amount, None);
    }

    #[test]
    fn encode_decode_round_trip() {
        let challenge = Challenge {
            realm: Some("AgentService".to_string()),
            amount: Some(0.5),
            currency: Some("USDC".to_string()),
            recipient: Some("agent_B".to_string()),
            invoice_id: Some("inv_9".to_string()),
            ..Default::default()
        };
        assert_eq!(decode_challenge(&encode_challenge(&challenge)), Some(challenge));
    }

    #[test]
    fn payment_proof_format() {
        assert_eq!(format_payment_proof("pay_123"), "Weppo pay_123");
        assert_eq!(parse_payment_proof("Weppo pay_123"), Some("pay_123"));
        assert_eq!(parse_payment_proof("Basic pay_123"), None);
        assert_eq!(parse_payment_proof("Weppo "), None);
    }
}
