use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{opt_str, req_i64, with_db};
use crate::ipc::types::{AppState, Request};
use chrono::{Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;

pub const AUDIENCES: [&str; 3] = ["Everyone", "Teachers", "Parents"];
const TITLE_MAX: usize = 200;
const MESSAGE_MAX: usize = 2000;
const NEW_WINDOW_DAYS: i64 = 3;

fn announcement_json(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "announcementId": r.get::<_, i64>(0)?,
        "title": r.get::<_, String>(1)?,
        "message": r.get::<_, String>(2)?,
        "audience": r.get::<_, String>(3)?,
        "author": r.get::<_, Option<String>>(4)?,
        "datePosted": r.get::<_, String>(5)?,
    }))
}

/// Everything when `audience` is None, otherwise that audience plus "Everyone".
fn announcements_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let audience = opt_str(params, "audience");
    let mut stmt = conn.prepare(
        "SELECT id, title, message, audience, author, date_posted
         FROM announcements
         WHERE (?1 IS NULL OR audience = 'Everyone' OR audience = ?1)
         ORDER BY date_posted DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([&audience], announcement_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!(rows))
}

fn announcements_count(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let audience = opt_str(params, "audience").unwrap_or_else(|| "Teachers".to_string());
    let since = db::ts_to_db(Utc::now() - Duration::days(NEW_WINDOW_DAYS));
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM announcements
         WHERE (audience = 'Everyone' OR audience = ?) AND date_posted >= ?",
        (&audience, &since),
        |r| r.get(0),
    )?;
    Ok(json!({ "count": count }))
}

fn announcements_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = req_i64(params, "id")?;
    conn.query_row(
        "SELECT id, title, message, audience, author, date_posted FROM announcements WHERE id = ?",
        [id],
        announcement_json,
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("Announcement not found"))
}

fn announcements_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let invalid = || HandlerErr::bad_params("Invalid announcement data");
    let title = opt_str(params, "title").ok_or_else(invalid)?;
    let message = opt_str(params, "message").ok_or_else(invalid)?;
    let audience = opt_str(params, "audience").unwrap_or_else(|| "Everyone".to_string());
    if title.chars().count() > TITLE_MAX
        || message.chars().count() > MESSAGE_MAX
        || !AUDIENCES.contains(&audience.as_str())
    {
        return Err(invalid());
    }
    conn.execute(
        "INSERT INTO announcements(title, message, audience, date_posted, author) VALUES(?, ?, ?, ?, ?)",
        (&title, &message, &audience, db::now_db(), opt_str(params, "author")),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", "announcements", e))?;
    Ok(json!({
        "message": "Announcement added successfully",
        "announcementId": conn.last_insert_rowid()
    }))
}

fn announcements_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = req_i64(params, "id")?;
    let removed = conn
        .execute("DELETE FROM announcements WHERE id = ?", [id])
        .map_err(|e| HandlerErr::db("db_delete_failed", "announcements", e))?;
    if removed == 0 {
        return Err(HandlerErr::not_found("Announcement not found"));
    }
    Ok(json!({ "message": "Announcement deleted successfully" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "announcements.list" | "announcements.all" => Some(with_db(state, req, announcements_list)),
        "announcements.count" => Some(with_db(state, req, announcements_count)),
        "announcements.get" => Some(with_db(state, req, announcements_get)),
        "announcements.create" => Some(with_db(state, req, announcements_create)),
        "announcements.delete" => Some(with_db(state, req, announcements_delete)),
        _ => None,
    }
}
