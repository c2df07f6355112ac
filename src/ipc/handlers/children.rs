use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{opt_date, opt_i64, opt_str, req_i64, req_str, row_exists, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

pub const CHILD_STATUSES: [&str; 2] = ["Active", "Suspended"];

struct ChildInput {
    full_name: String,
    dob: Option<String>,
    class_id: Option<i64>,
    parent_id: Option<i64>,
    allergies: Option<String>,
    photo_url: Option<String>,
    status: String,
}

fn parse_child_input(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<ChildInput, HandlerErr> {
    let full_name = req_str(params, "fullName")
        .map_err(|_| HandlerErr::bad_params("Invalid child data."))?;
    let dob = opt_date(params, "dob")?.map(db::date_to_db);
    let class_id = opt_i64(params, "classId")?.filter(|v| *v > 0);
    let parent_id = opt_i64(params, "parentId")?.filter(|v| *v > 0);
    let status = opt_str(params, "status").unwrap_or_else(|| "Active".to_string());
    if !CHILD_STATUSES.contains(&status.as_str()) {
        return Err(HandlerErr::bad_params(format!(
            "status must be one of {}",
            CHILD_STATUSES.join(", ")
        )));
    }
    if let Some(cid) = class_id {
        if !row_exists(conn, "classes", cid)? {
            return Err(HandlerErr::bad_params("class not found"));
        }
    }
    if let Some(pid) = parent_id {
        if !row_exists(conn, "parents", pid)? {
            return Err(HandlerErr::bad_params("parent not found"));
        }
    }
    Ok(ChildInput {
        full_name,
        dob,
        class_id,
        parent_id,
        allergies: opt_str(params, "allergies"),
        photo_url: opt_str(params, "photoUrl"),
        status,
    })
}

fn children_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT ch.id, ch.full_name, ch.dob, c.name, p.full_name, ch.allergies, ch.status, ch.photo_url
         FROM children ch
         LEFT JOIN classes c ON c.id = ch.class_id
         LEFT JOIN parents p ON p.id = ch.parent_id
         ORDER BY ch.full_name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "childId": r.get::<_, i64>(0)?,
                "fullName": r.get::<_, String>(1)?,
                "dob": r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                "className": r.get::<_, Option<String>>(3)?.unwrap_or_else(|| "Unassigned".to_string()),
                "parentName": r.get::<_, Option<String>>(4)?.unwrap_or_else(|| "N/A".to_string()),
                "allergies": r.get::<_, Option<String>>(5)?,
                "status": r.get::<_, String>(6)?,
                "photoUrl": r.get::<_, Option<String>>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!(rows))
}

fn children_by_class(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = req_i64(params, "classId")?;
    let mut stmt = conn.prepare(
        "SELECT id, full_name, dob, allergies, status, photo_url
         FROM children
         WHERE class_id = ? AND status = 'Active'
         ORDER BY full_name",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(json!({
                "childId": r.get::<_, i64>(0)?,
                "fullName": r.get::<_, String>(1)?,
                "dob": r.get::<_, Option<String>>(2)?,
                "allergies": r.get::<_, Option<String>>(3)?,
                "status": r.get::<_, String>(4)?,
                "photoUrl": r.get::<_, Option<String>>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!(rows))
}

fn children_dropdowns(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare("SELECT id, name FROM classes WHERE status = 'Active' ORDER BY name")?;
    let classes = stmt
        .query_map([], |r| {
            Ok(json!({ "classId": r.get::<_, i64>(0)?, "name": r.get::<_, String>(1)? }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "classes": classes }))
}

fn children_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let input = parse_child_input(conn, params)?;
    conn.execute(
        "INSERT INTO children(full_name, dob, class_id, parent_id, allergies, photo_url, status)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &input.full_name,
            &input.dob,
            input.class_id,
            input.parent_id,
            &input.allergies,
            &input.photo_url,
            &input.status,
        ),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", "children", e))?;
    let child_id = conn.last_insert_rowid();
    info!(child_id, "child added");
    Ok(json!({ "message": "Child added successfully.", "childId": child_id }))
}

fn children_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let child_id = req_i64(params, "childId")?;
    if !row_exists(conn, "children", child_id)? {
        return Err(HandlerErr::not_found("Child not found."));
    }
    let input = parse_child_input(conn, params)?;
    conn.execute(
        "UPDATE children
         SET full_name = ?, dob = ?, class_id = ?, parent_id = ?, allergies = ?, photo_url = ?, status = ?
         WHERE id = ?",
        (
            &input.full_name,
            &input.dob,
            input.class_id,
            input.parent_id,
            &input.allergies,
            &input.photo_url,
            &input.status,
            child_id,
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", "children", e))?;
    Ok(json!({ "message": "Child updated successfully." }))
}

fn children_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let child_id = req_i64(params, "id")?;
    if !row_exists(conn, "children", child_id)? {
        return Err(HandlerErr::not_found("Child not found."));
    }
    // Attendance, payments and incidents go with the child (ON DELETE CASCADE).
    conn.execute("DELETE FROM children WHERE id = ?", [child_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", "children", e))?;
    info!(child_id, "child deleted");
    Ok(json!({ "message": "Child deleted successfully." }))
}

fn children_api(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = opt_i64(params, "classId")?;
    let mut stmt = conn.prepare(
        "SELECT ch.id, ch.full_name, c.name, ch.status, ch.allergies, ch.photo_url
         FROM children ch
         LEFT JOIN classes c ON c.id = ch.class_id
         WHERE (?1 IS NULL OR ch.class_id = ?1)
         ORDER BY ch.full_name",
    )?;
    let data = stmt
        .query_map([class_id], |r| {
            Ok(json!({
                "childId": r.get::<_, i64>(0)?,
                "fullName": r.get::<_, String>(1)?,
                "className": r.get::<_, Option<String>>(2)?.unwrap_or_else(|| "Unassigned".to_string()),
                "status": r.get::<_, String>(3)?,
                "allergies": r.get::<_, Option<String>>(4)?,
                "photoUrl": r.get::<_, Option<String>>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "success": true, "count": data.len(), "data": data }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "children.list" => Some(with_db(state, req, children_list)),
        "children.byClass" => Some(with_db(state, req, children_by_class)),
        "children.dropdowns" => Some(with_db(state, req, children_dropdowns)),
        "children.create" => Some(with_db(state, req, children_create)),
        "children.update" => Some(with_db(state, req, children_update)),
        "children.delete" => Some(with_db(state, req, children_delete)),
        "children.api" => Some(with_db(state, req, children_api)),
        _ => None,
    }
}
