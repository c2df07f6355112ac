use crate::calc::{monthly_fee, FeeSchedule};
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::notifications::push_notification;
use crate::ipc::helpers::{money, opt_str, req_i64, req_str, row_exists, with_db};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use tracing::info;

pub const PAYMENT_STATUSES: [&str; 5] = ["Pending", "Approved", "Rejected", "Paid", "Unpaid"];

/// Month label used when the caller names none, e.g. "October 2026".
pub fn current_month_label() -> String {
    Utc::now().format("%B %Y").to_string()
}

fn display_ts(raw: &str) -> String {
    db::ts_from_db(raw)
        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn payments_by_month(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let month = opt_str(params, "month").unwrap_or_else(current_month_label);
    let mut stmt = conn.prepare(
        "SELECT pay.id, pay.month, pay.amount, pay.status, pay.proof_url, pay.date_uploaded,
                p.full_name, ch.full_name
         FROM payments pay
         LEFT JOIN parents p ON p.id = pay.parent_id
         LEFT JOIN children ch ON ch.id = pay.child_id
         WHERE pay.month = ?
         ORDER BY p.full_name, pay.id",
    )?;
    let rows = stmt
        .query_map([&month], |r| {
            Ok(json!({
                "paymentId": r.get::<_, i64>(0)?,
                "month": r.get::<_, Option<String>>(1)?,
                "amount": r.get::<_, f64>(2)?,
                "status": r.get::<_, String>(3)?,
                "proofUrl": r.get::<_, Option<String>>(4)?,
                "dateUploaded": display_ts(&r.get::<_, String>(5)?),
                "parentName": r.get::<_, Option<String>>(6)?.unwrap_or_else(|| "N/A".to_string()),
                "childName": r.get::<_, Option<String>>(7)?.unwrap_or_else(|| "N/A".to_string()),
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!(rows))
}

fn payments_generate(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let month = opt_str(params, "month").unwrap_or_else(current_month_label);
    let schedule = FeeSchedule::load(conn)?;
    let today = Utc::now().date_naive();

    let mut stmt = conn.prepare(
        "SELECT ch.id, ch.parent_id, ch.dob
         FROM children ch
         JOIN parents p ON p.id = ch.parent_id
         WHERE ch.status = 'Active' AND p.status = 'Active'
         ORDER BY ch.id",
    )?;
    let children = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, Option<String>>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    if children.is_empty() {
        return Err(HandlerErr::bad_params("No active children found."));
    }

    let now = db::now_db();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let replaced = tx
        .execute("DELETE FROM payments WHERE month = ?", [&month])
        .map_err(|e| HandlerErr::db("db_delete_failed", "payments", e))?;
    for (child_id, parent_id, dob) in &children {
        let dob = dob.as_deref().and_then(db::date_from_db);
        let amount = monthly_fee(dob, &schedule, today);
        tx.execute(
            "INSERT INTO payments(parent_id, child_id, month, amount, status, date_uploaded)
             VALUES(?, ?, ?, ?, 'Pending', ?)",
            (parent_id, child_id, &month, amount, &now),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", "payments", e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    info!(month = %month, count = children.len(), replaced, "payments generated");
    Ok(json!({
        "message": format!("Payments generated for {}", month),
        "count": children.len()
    }))
}

fn payments_update_status(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let payment_id = req_i64(params, "id")?;
    let status = req_str(params, "status")?;
    if !PAYMENT_STATUSES.contains(&status.as_str()) {
        return Err(HandlerErr::bad_params(format!(
            "status must be one of {}",
            PAYMENT_STATUSES.join(", ")
        )));
    }
    let changed = conn
        .execute(
            "UPDATE payments SET status = ? WHERE id = ?",
            (&status, payment_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", "payments", e))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("Payment not found."));
    }
    Ok(json!({ "message": "Payment status updated" }))
}

/// Stores a proof URL against a payment, resets it to Pending and records a
/// Payment notification for the admin feed.
pub fn attach_proof(conn: &Connection, payment_id: i64, proof_url: &str) -> Result<serde_json::Value, HandlerErr> {
    let payment: Option<(f64, Option<String>)> = conn
        .query_row(
            "SELECT pay.amount, p.full_name
             FROM payments pay
             LEFT JOIN parents p ON p.id = pay.parent_id
             WHERE pay.id = ?",
            [payment_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((amount, parent_name)) = payment else {
        return Err(HandlerErr::not_found("Payment not found."));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE payments SET proof_url = ?, status = 'Pending', date_uploaded = ? WHERE id = ?",
        (proof_url, db::now_db(), payment_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", "payments", e))?;
    push_notification(
        &tx,
        "Payment",
        &format!(
            "Payment proof uploaded: R{:.2} from {}",
            amount,
            parent_name.as_deref().unwrap_or("Parent")
        ),
    )?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    info!(payment_id, "payment proof attached");
    Ok(json!({
        "success": true,
        "message": "Proof uploaded successfully",
        "paymentId": payment_id,
        "status": "Pending",
        "proofUrl": proof_url
    }))
}

fn payments_attach_proof(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let payment_id = req_i64(params, "id")?;
    let proof_url = req_str(params, "proofUrl")?;
    attach_proof(conn, payment_id, &proof_url)
}

fn payments_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let payment_id = req_i64(params, "id")?;
    let removed = conn
        .execute("DELETE FROM payments WHERE id = ?", [payment_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", "payments", e))?;
    if removed == 0 {
        return Err(HandlerErr::not_found("Payment not found."));
    }
    Ok(json!({ "message": "Payment deleted successfully" }))
}

fn payments_by_parent(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let parent_id = req_i64(params, "parentId")?;
    if !row_exists(conn, "parents", parent_id)? {
        return Err(HandlerErr::not_found("Parent not found."));
    }
    let mut stmt = conn.prepare(
        "SELECT pay.id, pay.month, pay.amount, pay.status, pay.proof_url, ch.full_name, pay.date_uploaded
         FROM payments pay
         LEFT JOIN children ch ON ch.id = pay.child_id
         WHERE pay.parent_id = ?
         ORDER BY pay.date_uploaded DESC, pay.id DESC",
    )?;
    let mut total_fees = 0.0;
    let mut total_paid = 0.0;
    let payments = stmt
        .query_map([parent_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, f64>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, String>(6)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?
        .into_iter()
        .map(|(id, month, amount, status, proof_url, child_name, uploaded)| {
            total_fees += amount;
            if status == "Approved" {
                total_paid += amount;
            }
            json!({
                "paymentId": id,
                "month": month,
                "amount": amount,
                "status": status,
                "proofUrl": proof_url,
                "childName": child_name.unwrap_or_else(|| "N/A".to_string()),
                "uploaded": display_ts(&uploaded),
            })
        })
        .collect::<Vec<_>>();

    Ok(json!({
        "success": true,
        "balance": money(total_fees - total_paid),
        "totalFees": money(total_fees),
        "totalPaid": money(total_paid),
        "payments": payments
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payments.byMonth" => Some(with_db(state, req, payments_by_month)),
        "payments.generate" => Some(with_db(state, req, payments_generate)),
        "payments.updateStatus" => Some(with_db(state, req, payments_update_status)),
        "payments.attachProof" => Some(with_db(state, req, payments_attach_proof)),
        "payments.delete" => Some(with_db(state, req, payments_delete)),
        "payments.byParent" => Some(with_db(state, req, payments_by_parent)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_ts_formats_stored_utc() {
        assert_eq!(display_ts("2026-10-05T07:45:12Z"), "2026-10-05 07:45");
        assert_eq!(display_ts("garbage"), "garbage");
    }
}
