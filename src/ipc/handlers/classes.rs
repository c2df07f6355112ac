use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{opt_i64, opt_str, req_i64, req_str, row_exists, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

fn classes_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    // Correlated subquery keeps the count independent of the teacher join.
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           t.full_name,
           (SELECT COUNT(*) FROM children ch WHERE ch.class_id = c.id) AS student_count,
           c.status
         FROM classes c
         LEFT JOIN teachers t ON t.id = c.teacher_id
         ORDER BY c.name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "classId": row.get::<_, i64>(0)?,
                "name": row.get::<_, String>(1)?,
                "teacherName": row.get::<_, Option<String>>(2)?.unwrap_or_else(|| "Unassigned".to_string()),
                "studentCount": row.get::<_, i64>(3)?,
                "status": row.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!(rows))
}

fn classes_dropdowns(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name FROM teachers WHERE status = 'Active' ORDER BY full_name",
    )?;
    let teachers = stmt
        .query_map([], |r| {
            Ok(json!({ "teacherId": r.get::<_, i64>(0)?, "fullName": r.get::<_, String>(1)? }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "teachers": teachers }))
}

fn parse_teacher_ref(conn: &Connection, params: &serde_json::Value) -> Result<Option<i64>, HandlerErr> {
    let teacher_id = opt_i64(params, "teacherId")?.filter(|v| *v > 0);
    if let Some(tid) = teacher_id {
        if !row_exists(conn, "teachers", tid)? {
            return Err(HandlerErr::bad_params("teacher not found"));
        }
    }
    Ok(teacher_id)
}

fn classes_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = req_str(params, "name").map_err(|_| HandlerErr::bad_params("Invalid data."))?;
    let teacher_id = parse_teacher_ref(conn, params)?;
    let status = opt_str(params, "status").unwrap_or_else(|| "Active".to_string());
    conn.execute(
        "INSERT INTO classes(name, teacher_id, status) VALUES(?, ?, ?)",
        (&name, teacher_id, &status),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", "classes", e))?;
    let class_id = conn.last_insert_rowid();
    Ok(json!({ "message": "Class added successfully.", "classId": class_id }))
}

fn classes_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = req_i64(params, "classId")?;
    if !row_exists(conn, "classes", class_id)? {
        return Err(HandlerErr::not_found("Class not found."));
    }
    let name = req_str(params, "name").map_err(|_| HandlerErr::bad_params("Invalid data."))?;
    let teacher_id = parse_teacher_ref(conn, params)?;
    let status = opt_str(params, "status").unwrap_or_else(|| "Active".to_string());
    conn.execute(
        "UPDATE classes SET name = ?, teacher_id = ?, status = ? WHERE id = ?",
        (&name, teacher_id, &status, class_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", "classes", e))?;
    Ok(json!({ "message": "Class updated successfully." }))
}

fn classes_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = req_i64(params, "id")?;
    if !row_exists(conn, "classes", class_id)? {
        return Err(HandlerErr::not_found("Class not found."));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let children_removed: i64 = tx.query_row(
        "SELECT COUNT(*) FROM children WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    // Children cascade with the class; their attendance, payments and
    // incidents cascade with them.
    tx.execute("DELETE FROM classes WHERE id = ?", [class_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", "classes", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    info!(class_id, children_removed, "class deleted");
    Ok(json!({
        "message": "Class deleted successfully.",
        "childrenRemoved": children_removed
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(with_db(state, req, classes_list)),
        "classes.dropdowns" => Some(with_db(state, req, classes_dropdowns)),
        "classes.create" => Some(with_db(state, req, classes_create)),
        "classes.update" => Some(with_db(state, req, classes_update)),
        "classes.delete" => Some(with_db(state, req, classes_delete)),
        _ => None,
    }
}
