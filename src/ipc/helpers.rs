use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use super::error::{err, ok, HandlerErr};
use super::types::{AppState, Request};

/// Runs a handler against the open database and wraps the outcome in the
/// response envelope.
pub fn with_db<F>(state: &mut AppState, req: &Request, f: F) -> Value
where
    F: FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

/// Ids arrive as JSON numbers from bodies and as strings from paths/queries.
pub fn opt_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("{} must be an integer", key))),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn req_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    opt_i64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn opt_f64(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("{} must be a number", key))),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

pub fn opt_bool(params: &Value, key: &str) -> Option<bool> {
    match params.get(key) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Some(true),
            "false" | "0" | "off" => Some(false),
            _ => None,
        },
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

/// Trimmed string; blank counts as absent.
pub fn opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn req_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    opt_str(params, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn opt_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    let Some(raw) = opt_str(params, key) else {
        return Ok(None);
    };
    crate::db::date_from_db(&raw)
        .map(Some)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn opt_i64_list(params: &Value, key: &str) -> Result<Vec<i64>, HandlerErr> {
    let Some(items) = params.get(key) else {
        return Ok(Vec::new());
    };
    if items.is_null() {
        return Ok(Vec::new());
    }
    let Some(items) = items.as_array() else {
        return Err(HandlerErr::bad_params(format!("{} must be an array", key)));
    };
    items
        .iter()
        .map(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must contain integers", key)))
        })
        .collect()
}

pub fn row_exists(conn: &Connection, table: &str, id: i64) -> Result<bool, HandlerErr> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    Ok(conn
        .query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

pub fn money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
