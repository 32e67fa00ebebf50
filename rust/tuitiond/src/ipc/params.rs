use crate::fees::{parse_day, parse_instant};
use crate::ipc::error::HandlerErr;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.trim().to_string()).filter(|s| !s.is_empty()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string or null", key))),
    }
}

pub fn get_optional_day(params: &serde_json::Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match get_optional_str(params, key)? {
        None => Ok(None),
        Some(raw) => parse_day(&raw)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key))),
    }
}

pub fn get_optional_instant(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<DateTime<Utc>>, HandlerErr> {
    match get_optional_str(params, key)? {
        None => Ok(None),
        Some(raw) => parse_instant(&raw).map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{} must be YYYY-MM-DD or an RFC 3339 timestamp", key))
        }),
    }
}

/// Money accepts a JSON number or a decimal string.
pub fn get_optional_money(params: &serde_json::Value, key: &str) -> Result<Option<Decimal>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let amount: Decimal = serde_json::from_value(v.clone())
                .map_err(|_| HandlerErr::bad_params(format!("{} must be a decimal amount", key)))?;
            if amount <= Decimal::ZERO {
                return Err(HandlerErr::bad_params(format!("{} must be greater than zero", key)));
            }
            Ok(Some(amount))
        }
    }
}

pub fn get_u32_or(params: &serde_json::Value, key: &str, default: u32, max: u32) -> Result<u32, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(v) => {
            let n = v
                .as_u64()
                .filter(|n| *n >= 1)
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a positive integer", key)))?;
            Ok(n.min(max as u64) as u32)
        }
    }
}
