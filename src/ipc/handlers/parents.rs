use crate::auth::{hash_password, Role};
use crate::calc::{approx_age, round_off_1_decimal};
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::auth::authenticate;
use crate::ipc::helpers::{money, opt_i64_list, opt_str, req_i64, req_str, row_exists, with_db};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use tracing::{info, warn};

struct ParentChild {
    child_id: i64,
    full_name: String,
    class_name: Option<String>,
    status: String,
    dob: Option<String>,
    allergies: Option<String>,
    photo_url: Option<String>,
}

fn load_children(conn: &Connection, parent_id: i64) -> Result<Vec<ParentChild>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT ch.id, ch.full_name, c.name, ch.status, ch.dob, ch.allergies, ch.photo_url
         FROM children ch
         LEFT JOIN classes c ON c.id = ch.class_id
         WHERE ch.parent_id = ?
         ORDER BY ch.id",
    )?;
    let rows = stmt
        .query_map([parent_id], |r| {
            Ok(ParentChild {
                child_id: r.get(0)?,
                full_name: r.get(1)?,
                class_name: r.get(2)?,
                status: r.get(3)?,
                dob: r.get(4)?,
                allergies: r.get(5)?,
                photo_url: r.get(6)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

/// Points the given children at `parent_id`. Unknown ids are ignored.
fn link_children(conn: &Connection, parent_id: i64, child_ids: &[i64]) -> Result<usize, HandlerErr> {
    let mut linked = 0usize;
    for child_id in child_ids {
        linked += conn
            .execute(
                "UPDATE children SET parent_id = ? WHERE id = ?",
                (parent_id, child_id),
            )
            .map_err(|e| HandlerErr::db("db_update_failed", "children", e))?;
    }
    Ok(linked)
}

fn unlink_children(conn: &Connection, parent_id: i64) -> Result<(), HandlerErr> {
    conn.execute(
        "UPDATE children SET parent_id = NULL WHERE parent_id = ?",
        [parent_id],
    )
    .map_err(|e| HandlerErr::db("db_update_failed", "children", e))?;
    Ok(())
}

fn parents_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT
           p.id,
           p.full_name,
           p.email,
           p.phone,
           p.status,
           (SELECT group_concat(ch.full_name, ', ') FROM children ch WHERE ch.parent_id = p.id)
         FROM parents p
         ORDER BY p.full_name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "parentId": r.get::<_, i64>(0)?,
                "fullName": r.get::<_, String>(1)?,
                "email": r.get::<_, String>(2)?,
                "phone": r.get::<_, Option<String>>(3)?,
                "status": r.get::<_, String>(4)?,
                "children": r.get::<_, Option<String>>(5)?.unwrap_or_else(|| "None".to_string()),
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!(rows))
}

fn parents_dropdowns(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name FROM children
         WHERE parent_id IS NULL AND status = 'Active'
         ORDER BY full_name",
    )?;
    let children = stmt
        .query_map([], |r| {
            Ok(json!({ "childId": r.get::<_, i64>(0)?, "fullName": r.get::<_, String>(1)? }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "children": children }))
}

fn hashed(params: &serde_json::Value) -> Result<Option<String>, HandlerErr> {
    // Admin forms send the plain password under "passwordHash".
    let raw = opt_str(params, "passwordHash").or_else(|| opt_str(params, "password"));
    raw.map(|p| hash_password(&p).map_err(|e| HandlerErr::new("hash_failed", e.to_string())))
        .transpose()
}

fn parents_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let full_name = req_str(params, "fullName").map_err(|_| HandlerErr::bad_params("Invalid data."))?;
    let email = req_str(params, "email").map_err(|_| HandlerErr::bad_params("Invalid data."))?;
    let phone = opt_str(params, "phone");
    let password_hash = hashed(params)?.unwrap_or_default();
    let child_ids = opt_i64_list(params, "childIds")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "INSERT INTO parents(full_name, email, password_hash, phone, status) VALUES(?, ?, ?, ?, 'Active')",
        (&full_name, &email, &password_hash, &phone),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", "parents", e))?;
    let parent_id = tx.last_insert_rowid();
    let linked = link_children(&tx, parent_id, &child_ids)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    info!(parent_id, linked, "parent added");
    Ok(json!({ "message": "Parent added successfully.", "parentId": parent_id }))
}

fn parents_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let parent_id = req_i64(params, "parentId")?;
    if !row_exists(conn, "parents", parent_id)? {
        return Err(HandlerErr::not_found("Parent not found."));
    }
    let full_name = req_str(params, "fullName").map_err(|_| HandlerErr::bad_params("Invalid data."))?;
    let email = req_str(params, "email").map_err(|_| HandlerErr::bad_params("Invalid data."))?;
    let phone = opt_str(params, "phone");
    let status = opt_str(params, "status").unwrap_or_else(|| "Active".to_string());
    let password_hash = hashed(params)?;
    let child_ids = opt_i64_list(params, "childIds")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE parents SET full_name = ?, email = ?, phone = ?, status = ? WHERE id = ?",
        (&full_name, &email, &phone, &status, parent_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", "parents", e))?;
    if let Some(hash) = password_hash {
        tx.execute(
            "UPDATE parents SET password_hash = ? WHERE id = ?",
            (&hash, parent_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", "parents", e))?;
    }
    unlink_children(&tx, parent_id)?;
    link_children(&tx, parent_id, &child_ids)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "message": "Parent updated successfully." }))
}

fn parents_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let parent_id = req_i64(params, "id")?;
    if !row_exists(conn, "parents", parent_id)? {
        return Err(HandlerErr::not_found("Parent not found."));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    // Children stay enrolled; only the link goes.
    unlink_children(&tx, parent_id)?;
    tx.execute("DELETE FROM parents WHERE id = ?", [parent_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", "parents", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    info!(parent_id, "parent deleted");
    Ok(json!({ "message": "Parent deleted successfully." }))
}

fn parents_reset_password(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let parent_id = req_i64(params, "id")?;
    let new_password = req_str(params, "newPassword")
        .map_err(|_| HandlerErr::bad_params("Password cannot be empty."))?;
    if !row_exists(conn, "parents", parent_id)? {
        return Err(HandlerErr::not_found("Parent not found."));
    }
    let hash = hash_password(&new_password).map_err(|e| HandlerErr::new("hash_failed", e.to_string()))?;
    conn.execute(
        "UPDATE parents SET password_hash = ? WHERE id = ?",
        (&hash, parent_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", "parents", e))?;
    Ok(json!({ "message": "Password reset successfully." }))
}

fn parents_login(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let email = opt_str(params, "email");
    let password = params.get("password").and_then(|v| v.as_str()).filter(|s| !s.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(HandlerErr::bad_params("Invalid credentials."));
    };
    let Some((parent_id, email, _)) = authenticate(conn, Role::Parent, &email, password)? else {
        warn!("parent app login rejected");
        return Err(HandlerErr::unauthorized("Invalid email or password."));
    };

    let (full_name, phone, status): (String, Option<String>, String) = conn.query_row(
        "SELECT full_name, phone, status FROM parents WHERE id = ?",
        [parent_id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    let children = load_children(conn, parent_id)?;
    let today = Utc::now().date_naive();
    let first_active = children.iter().find(|c| c.status == "Active");

    Ok(json!({
        "success": true,
        "parentId": parent_id,
        "fullName": full_name,
        "email": email,
        "phone": phone,
        "status": status,
        "childName": first_active.map(|c| c.full_name.clone()).unwrap_or_else(|| "Unknown Child".to_string()),
        "className": first_active
            .and_then(|c| c.class_name.clone())
            .unwrap_or_else(|| "Unassigned Class".to_string()),
        "allergies": first_active
            .and_then(|c| c.allergies.clone())
            .unwrap_or_else(|| "None".to_string()),
        "childAge": first_active
            .and_then(|c| c.dob.as_deref())
            .and_then(db::date_from_db)
            .map(|dob| approx_age(dob, today)),
        "childPhoto": first_active.and_then(|c| c.photo_url.clone()),
        "children": children
            .iter()
            .map(|c| json!({
                "childId": c.child_id,
                "fullName": c.full_name,
                "className": c.class_name.clone().unwrap_or_else(|| "Unassigned".to_string()),
                "status": c.status,
            }))
            .collect::<Vec<_>>(),
    }))
}

fn parents_children(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let parent_id = req_i64(params, "parentId")?;
    if !row_exists(conn, "parents", parent_id)? {
        return Err(HandlerErr::not_found("Parent not found."));
    }
    let children = load_children(conn, parent_id)?;
    Ok(json!(children
        .iter()
        .map(|c| json!({
            "childId": c.child_id,
            "fullName": c.full_name,
            "className": c.class_name.clone().unwrap_or_else(|| "N/A".to_string()),
            "status": c.status,
        }))
        .collect::<Vec<_>>()))
}

fn parents_overview(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let parent_id = req_i64(params, "parentId")?;
    if !row_exists(conn, "parents", parent_id)? {
        return Err(HandlerErr::not_found("Parent not found."));
    }
    let total_children: i64 = conn.query_row(
        "SELECT COUNT(*) FROM children WHERE parent_id = ?",
        [parent_id],
        |r| r.get(0),
    )?;
    let (total_fees, total_paid): (f64, f64) = conn.query_row(
        "SELECT
           COALESCE(SUM(amount), 0),
           COALESCE(SUM(CASE WHEN status = 'Paid' THEN amount ELSE 0 END), 0)
         FROM payments WHERE parent_id = ?",
        [parent_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let (present, total): (i64, i64) = conn.query_row(
        "SELECT
           COALESCE(SUM(CASE WHEN a.status = 'Present' THEN 1 ELSE 0 END), 0),
           COUNT(*)
         FROM attendance a
         JOIN children ch ON ch.id = a.child_id
         WHERE ch.parent_id = ?",
        [parent_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let attendance_rate = if total > 0 {
        round_off_1_decimal(present as f64 / total as f64 * 100.0)
    } else {
        0.0
    };

    Ok(json!({
        "success": true,
        "totalChildren": total_children,
        "totalFees": money(total_fees),
        "totalPaid": money(total_paid),
        "balance": money(total_fees - total_paid),
        "attendanceRate": attendance_rate
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "parents.list" => Some(with_db(state, req, parents_list)),
        "parents.dropdowns" => Some(with_db(state, req, parents_dropdowns)),
        "parents.create" => Some(with_db(state, req, parents_create)),
        "parents.update" => Some(with_db(state, req, parents_update)),
        "parents.delete" => Some(with_db(state, req, parents_delete)),
        "parents.resetPassword" => Some(with_db(state, req, parents_reset_password)),
        "parents.login" => Some(with_db(state, req, parents_login)),
        "parents.children" => Some(with_db(state, req, parents_children)),
        "parents.overview" => Some(with_db(state, req, parents_overview)),
        _ => None,
    }
}
