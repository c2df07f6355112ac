use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{opt_str, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

pub const LATEST_LIMIT: i64 = 10;

/// Appends an entry to the admin notification feed.
pub fn push_notification(conn: &Connection, kind: &str, message: &str) -> Result<i64, HandlerErr> {
    conn.execute(
        "INSERT INTO notifications(type, message, date_created) VALUES(?, ?, ?)",
        (kind, message, db::now_db()),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", "notifications", e))?;
    Ok(conn.last_insert_rowid())
}

fn notifications_latest(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT id, type, message, date_created
         FROM notifications
         ORDER BY date_created DESC, id DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([LATEST_LIMIT], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "type": r.get::<_, String>(1)?,
                "message": r.get::<_, String>(2)?,
                "dateCreated": r.get::<_, String>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!(rows))
}

fn notifications_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let message = opt_str(params, "message").ok_or_else(|| HandlerErr::bad_params("Message required"))?;
    let kind = opt_str(params, "type").unwrap_or_default();
    let id = push_notification(conn, &kind, &message)?;
    Ok(json!({ "success": true, "id": id }))
}

fn notifications_clear(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let removed = conn
        .execute("DELETE FROM notifications", [])
        .map_err(|e| HandlerErr::db("db_delete_failed", "notifications", e))?;
    Ok(json!({ "success": true, "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notifications.latest" => Some(with_db(state, req, notifications_latest)),
        "notifications.create" => Some(with_db(state, req, notifications_create)),
        "notifications.clear" => Some(with_db(state, req, notifications_clear)),
        _ => None,
    }
}
