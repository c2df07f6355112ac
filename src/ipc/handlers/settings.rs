use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{opt_bool, opt_f64, opt_str, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

fn settings_get(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    Ok(conn.query_row(
        "SELECT school_name, email, phone, principal,
                base_monthly_fee, toddler_fee, preschool_fee,
                late_fee_amount, late_fee_policy, notifications_enabled, term_dates
         FROM settings WHERE id = 1",
        [],
        |r| {
            Ok(json!({
                "schoolName": r.get::<_, String>(0)?,
                "email": r.get::<_, String>(1)?,
                "phone": r.get::<_, String>(2)?,
                "principal": r.get::<_, String>(3)?,
                "baseMonthlyFee": r.get::<_, f64>(4)?,
                "toddlerFee": r.get::<_, f64>(5)?,
                "preschoolFee": r.get::<_, f64>(6)?,
                "lateFeeAmount": r.get::<_, f64>(7)?,
                "lateFeePolicy": r.get::<_, bool>(8)?,
                "notificationsEnabled": r.get::<_, bool>(9)?,
                "termDates": r.get::<_, String>(10)?,
            }))
        },
    )?)
}

// Absent fields keep their stored value.

fn settings_update_school(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    conn.execute(
        "UPDATE settings SET
           school_name = COALESCE(?, school_name),
           email = COALESCE(?, email),
           phone = COALESCE(?, phone),
           principal = COALESCE(?, principal)
         WHERE id = 1",
        (
            opt_str(params, "schoolName"),
            opt_str(params, "email"),
            opt_str(params, "phone"),
            opt_str(params, "principal"),
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", "settings", e))?;
    Ok(json!({ "message": "School info updated successfully" }))
}

fn non_negative(params: &serde_json::Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match opt_f64(params, key)? {
        Some(v) if !v.is_finite() || v < 0.0 => Err(HandlerErr::bad_params(format!(
            "{} must be a non-negative amount",
            key
        ))),
        other => Ok(other),
    }
}

fn settings_update_fees(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let base = non_negative(params, "baseMonthlyFee")?;
    let toddler = non_negative(params, "toddlerFee")?;
    let preschool = non_negative(params, "preschoolFee")?;
    let late_fee = non_negative(params, "lateFeeAmount")?;
    conn.execute(
        "UPDATE settings SET
           base_monthly_fee = COALESCE(?, base_monthly_fee),
           toddler_fee = COALESCE(?, toddler_fee),
           preschool_fee = COALESCE(?, preschool_fee),
           late_fee_amount = COALESCE(?, late_fee_amount),
           late_fee_policy = COALESCE(?, late_fee_policy)
         WHERE id = 1",
        (base, toddler, preschool, late_fee, opt_bool(params, "lateFeePolicy")),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", "settings", e))?;
    info!("fee settings updated");
    Ok(json!({ "message": "Fee settings updated successfully" }))
}

fn settings_update_prefs(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    conn.execute(
        "UPDATE settings SET
           notifications_enabled = COALESCE(?, notifications_enabled),
           term_dates = COALESCE(?, term_dates)
         WHERE id = 1",
        (
            opt_bool(params, "notificationsEnabled"),
            opt_str(params, "termDates"),
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", "settings", e))?;
    Ok(json!({ "message": "Preferences updated successfully" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(with_db(state, req, settings_get)),
        "settings.updateSchool" => Some(with_db(state, req, settings_update_school)),
        "settings.updateFees" => Some(with_db(state, req, settings_update_fees)),
        "settings.updatePrefs" => Some(with_db(state, req, settings_update_prefs)),
        _ => None,
    }
}
