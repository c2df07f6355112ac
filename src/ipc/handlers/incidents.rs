use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::notifications::push_notification;
use crate::ipc::helpers::{opt_i64, opt_str, req_i64, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use tracing::info;

const INCIDENT_SELECT: &str = "SELECT i.id, i.date, i.type, i.description,
        i.child_id, ch.full_name, i.class_id, c.name, i.teacher_id, t.full_name
     FROM incidents i
     LEFT JOIN children ch ON ch.id = i.child_id
     LEFT JOIN classes c ON c.id = i.class_id
     LEFT JOIN teachers t ON t.id = i.teacher_id";

fn incident_json(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "incidentId": r.get::<_, i64>(0)?,
        "date": r.get::<_, String>(1)?,
        "type": r.get::<_, String>(2)?,
        "description": r.get::<_, String>(3)?,
        "childId": r.get::<_, Option<i64>>(4)?,
        "childName": r.get::<_, Option<String>>(5)?,
        "classId": r.get::<_, Option<i64>>(6)?,
        "className": r.get::<_, Option<String>>(7)?,
        "teacherId": r.get::<_, Option<i64>>(8)?,
        "teacherName": r.get::<_, Option<String>>(9)?,
    }))
}

fn name_of(conn: &Connection, sql: &str, id: Option<i64>) -> Result<Option<String>, HandlerErr> {
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(conn.query_row(sql, [id], |r| r.get(0)).optional()?)
}

fn incidents_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (Some(kind), Some(description)) = (opt_str(params, "type"), opt_str(params, "description")) else {
        return Err(HandlerErr::bad_params("Invalid incident data."));
    };
    if kind.chars().count() > 100 || description.chars().count() > 500 {
        return Err(HandlerErr::bad_params("Invalid incident data."));
    }
    let child_id = opt_i64(params, "childId")?;
    let class_id = opt_i64(params, "classId")?;
    let teacher_id = opt_i64(params, "teacherId")?;

    let child = name_of(conn, "SELECT full_name FROM children WHERE id = ?", child_id)?;
    let teacher = name_of(conn, "SELECT full_name FROM teachers WHERE id = ?", teacher_id)?;
    let class = name_of(conn, "SELECT name FROM classes WHERE id = ?", class_id)?;
    let (Some(child), Some(teacher), Some(_)) = (child, teacher, class) else {
        return Err(HandlerErr::bad_params("Invalid references."));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "INSERT INTO incidents(date, type, description, child_id, class_id, teacher_id)
         VALUES(?, ?, ?, ?, ?, ?)",
        (db::now_db(), &kind, &description, child_id, class_id, teacher_id),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", "incidents", e))?;
    let incident_id = tx.last_insert_rowid();
    push_notification(
        &tx,
        "Incident",
        &format!("Incident logged by {}: {} ({})", teacher, description, child),
    )?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    info!(incident_id, "incident logged");
    Ok(json!({
        "success": true,
        "message": "Incident submitted successfully.",
        "incidentId": incident_id
    }))
}

fn incidents_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!("{} ORDER BY i.date DESC, i.id DESC", INCIDENT_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], incident_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!(rows))
}

fn incidents_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let incident_id = req_i64(params, "id")?;
    let sql = format!("{} WHERE i.id = ?", INCIDENT_SELECT);
    conn.query_row(&sql, [incident_id], incident_json)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("Incident not found."))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "incidents.create" => Some(with_db(state, req, incidents_create)),
        "incidents.list" => Some(with_db(state, req, incidents_list)),
        "incidents.get" => Some(with_db(state, req, incidents_get)),
        _ => None,
    }
}
