use crate::auth::{hash_password, Role};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::auth::authenticate;
use crate::ipc::helpers::{opt_str, req_i64, req_str, row_exists, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use tracing::{info, warn};

fn hash_or_err(password: &str) -> Result<String, HandlerErr> {
    hash_password(password).map_err(|e| HandlerErr::new("hash_failed", e.to_string()))
}

fn teachers_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT
           t.id,
           t.full_name,
           t.email,
           t.photo_url,
           t.status,
           (SELECT COUNT(*) FROM classes c WHERE c.teacher_id = t.id) AS class_count
         FROM teachers t
         ORDER BY t.full_name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "teacherId": r.get::<_, i64>(0)?,
                "fullName": r.get::<_, String>(1)?,
                "email": r.get::<_, String>(2)?,
                "photoUrl": r.get::<_, Option<String>>(3)?,
                "status": r.get::<_, String>(4)?,
                "classCount": r.get::<_, i64>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!(rows))
}

fn teachers_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (Some(full_name), Some(email)) = (opt_str(params, "fullName"), opt_str(params, "email")) else {
        return Err(HandlerErr::bad_params("Invalid data."));
    };
    let status = opt_str(params, "status").unwrap_or_else(|| "Active".to_string());
    let password_hash = match opt_str(params, "passwordHash").or_else(|| opt_str(params, "password")) {
        Some(p) => hash_or_err(&p)?,
        None => String::new(),
    };
    conn.execute(
        "INSERT INTO teachers(full_name, email, password_hash, photo_url, status) VALUES(?, ?, ?, ?, ?)",
        (&full_name, &email, &password_hash, opt_str(params, "photoUrl"), &status),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", "teachers", e))?;
    let teacher_id = conn.last_insert_rowid();
    info!(teacher_id, "teacher added");
    Ok(json!({ "success": true, "teacherId": teacher_id }))
}

fn teachers_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = req_i64(params, "teacherId")?;
    let current_status: Option<String> = conn
        .query_row("SELECT status FROM teachers WHERE id = ?", [teacher_id], |r| r.get(0))
        .optional()?;
    let Some(current_status) = current_status else {
        return Err(HandlerErr::not_found("Teacher not found."));
    };
    let (Some(full_name), Some(email)) = (opt_str(params, "fullName"), opt_str(params, "email")) else {
        return Err(HandlerErr::bad_params("Invalid data."));
    };
    let status = opt_str(params, "status").unwrap_or(current_status);

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE teachers SET full_name = ?, email = ?, status = ? WHERE id = ?",
        (&full_name, &email, &status, teacher_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", "teachers", e))?;
    // Blank password or photo leaves the stored value alone.
    if let Some(p) = opt_str(params, "passwordHash").or_else(|| opt_str(params, "password")) {
        tx.execute(
            "UPDATE teachers SET password_hash = ? WHERE id = ?",
            (hash_or_err(&p)?, teacher_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", "teachers", e))?;
    }
    if let Some(photo) = opt_str(params, "photoUrl") {
        tx.execute(
            "UPDATE teachers SET photo_url = ? WHERE id = ?",
            (&photo, teacher_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", "teachers", e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "success": true }))
}

fn teachers_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = req_i64(params, "id")?;
    if !row_exists(conn, "teachers", teacher_id)? {
        return Err(HandlerErr::not_found("Teacher not found."));
    }
    // Classes, attendance and incidents keep their rows with the teacher nulled.
    conn.execute("DELETE FROM teachers WHERE id = ?", [teacher_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", "teachers", e))?;
    info!(teacher_id, "teacher deleted");
    Ok(json!({ "success": true }))
}

fn teachers_reset_password(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = req_i64(params, "id")?;
    if !row_exists(conn, "teachers", teacher_id)? {
        return Err(HandlerErr::not_found("Teacher not found."));
    }
    let new_password = req_str(params, "newPassword")
        .map_err(|_| HandlerErr::bad_params("Password cannot be empty."))?;
    conn.execute(
        "UPDATE teachers SET password_hash = ? WHERE id = ?",
        (hash_or_err(&new_password)?, teacher_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", "teachers", e))?;
    Ok(json!({ "success": true, "message": "Password reset successfully." }))
}

fn teacher_profile(conn: &Connection, teacher_id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    let teacher: Option<(String, String)> = conn
        .query_row(
            "SELECT full_name, email FROM teachers WHERE id = ?",
            [teacher_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((full_name, email)) = teacher else {
        return Ok(None);
    };
    let first_class: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, name FROM classes WHERE teacher_id = ? ORDER BY id LIMIT 1",
            [teacher_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    Ok(Some(json!({
        "teacherId": teacher_id,
        "fullName": full_name,
        "classId": first_class.as_ref().map(|c| c.0),
        "className": first_class.map(|c| c.1).unwrap_or_else(|| "Unassigned".to_string()),
        "email": email
    })))
}

fn teachers_login(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let email = opt_str(params, "email");
    let password = params.get("password").and_then(|v| v.as_str()).filter(|s| !s.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(HandlerErr::bad_params("Missing email or password."));
    };
    let Some((teacher_id, _, _)) = authenticate(conn, Role::Teacher, &email, password)? else {
        warn!("teacher app login rejected");
        return Err(HandlerErr::unauthorized("Invalid credentials."));
    };
    teacher_profile(conn, teacher_id)?.ok_or_else(|| HandlerErr::not_found("Teacher not found."))
}

fn teachers_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = req_i64(params, "id")?;
    teacher_profile(conn, teacher_id)?.ok_or_else(|| HandlerErr::not_found("Teacher not found."))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(with_db(state, req, teachers_list)),
        "teachers.create" => Some(with_db(state, req, teachers_create)),
        "teachers.update" => Some(with_db(state, req, teachers_update)),
        "teachers.delete" => Some(with_db(state, req, teachers_delete)),
        "teachers.resetPassword" => Some(with_db(state, req, teachers_reset_password)),
        "teachers.login" => Some(with_db(state, req, teachers_login)),
        "teachers.get" => Some(with_db(state, req, teachers_get)),
        _ => None,
    }
}
