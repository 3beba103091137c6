//! The meta-transaction boundary. Externally-signed forward requests arrive
//! as JSON; everything is validated here before the relayer touches them.
//! The embedded EIP-712 signature is not re-verified off-chain, the
//! forwarder contract is the authority for that.

use chrono::Utc;
use ethers::types::{Address, Bytes, U256};
use serde::Deserialize;
use serde_json::Value;

use crate::chain::abi::ForwardCall;
use crate::error::ApiError;

/// Wire shape of a forward request. Numeric fields may arrive as JSON
/// numbers or decimal strings; anything else is rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequestBody {
    pub from: String,
    pub to: String,
    pub value: Value,
    pub gas: Value,
    #[serde(default)]
    pub nonce: Option<Value>,
    pub deadline: Value,
    pub data: String,
    pub signature: String,
}

fn parse_address(field: &str, raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::RelayRejected(format!("Invalid {} address: {}", field, raw)))
}

fn parse_uint(field: &str, raw: &Value) -> Result<U256, ApiError> {
    let text = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) if n.is_u64() => n.to_string(),
        _ => {
            return Err(ApiError::RelayRejected(format!(
                "Field '{}' must be a non-negative integer",
                field
            )));
        }
    };
    U256::from_dec_str(&text).map_err(|_| {
        ApiError::RelayRejected(format!("Field '{}' is not a valid integer: {}", field, text))
    })
}

fn parse_hex(field: &str, raw: &str) -> Result<Bytes, ApiError> {
    let stripped = raw.strip_prefix("0x").ok_or_else(|| {
        ApiError::RelayRejected(format!("Field '{}' must be 0x-prefixed hex", field))
    })?;
    let bytes = hex::decode(stripped)
        .map_err(|_| ApiError::RelayRejected(format!("Field '{}' is not valid hex", field)))?;
    Ok(Bytes::from(bytes))
}

/// Validate a forward request and lower it to an encodable call. Expired or
/// malformed requests fail here, before anything is submitted.
pub fn parse_forward_request(body: &ForwardRequestBody) -> Result<ForwardCall, ApiError> {
    let from = parse_address("from", &body.from)?;
    let to = parse_address("to", &body.to)?;
    let value = parse_uint("value", &body.value)?;
    let gas = parse_uint("gas", &body.gas)?;
    if let Some(ref nonce) = body.nonce {
        parse_uint("nonce", nonce)?;
    }

    let deadline = parse_uint("deadline", &body.deadline)?;
    if deadline > U256::from(u64::MAX) {
        return Err(ApiError::RelayRejected("Field 'deadline' is out of range".to_string()));
    }
    let deadline = deadline.as_u64();

    let now = Utc::now().timestamp() as u64;
    if deadline <= now {
        return Err(ApiError::RelayRejected(format!(
            "Forward request expired at {}",
            deadline
        )));
    }

    let data = parse_hex("data", &body.data)?;
    let signature = parse_hex("signature", &body.signature)?;
    if signature.is_empty() {
        return Err(ApiError::RelayRejected("Missing signature".to_string()));
    }

    Ok(ForwardCall {
        from,
        to,
        value,
        gas,
        deadline,
        data,
        signature,
    })
}
