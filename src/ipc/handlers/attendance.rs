use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{opt_i64, opt_str, req_i64, row_exists, with_db};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, AttendanceStatus, RosterChild, SavedAttendance};
use chrono::{Duration, Utc};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

fn attendance_roster(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let today = Utc::now().date_naive();
    let date = roster::target_date(opt_str(params, "date").as_deref(), today)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let class_id = opt_i64(params, "classId")?;
    let date_key = db::date_to_db(date);

    let mut stmt = conn.prepare(
        "SELECT ch.id, ch.full_name, c.name
         FROM children ch
         LEFT JOIN classes c ON c.id = ch.class_id
         WHERE (?1 IS NULL OR ch.class_id = ?1)
         ORDER BY ch.full_name",
    )?;
    let children = stmt
        .query_map([class_id], |r| {
            Ok(RosterChild {
                child_id: r.get(0)?,
                child_name: r.get(1)?,
                class_name: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut stmt = conn.prepare(
        "SELECT a.id, a.child_id, a.status, a.notes
         FROM attendance a
         JOIN children ch ON ch.id = a.child_id
         WHERE a.att_date = ?1 AND (?2 IS NULL OR ch.class_id = ?2)
         ORDER BY a.id",
    )?;
    let saved = stmt
        .query_map((&date_key, class_id), |r| {
            Ok(SavedAttendance {
                attendance_id: r.get(0)?,
                child_id: r.get(1)?,
                status: r.get(2)?,
                notes: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let rows = roster::reconcile(&children, &saved, date);
    Ok(json!({ "success": true, "count": rows.len(), "data": rows }))
}

struct AttendanceEntry {
    child_id: i64,
    teacher_id: Option<i64>,
    recorded_at: String,
    att_date: String,
    status: AttendanceStatus,
    notes: String,
}

fn parse_entry(conn: &Connection, entry: &serde_json::Value) -> Result<Option<AttendanceEntry>, HandlerErr> {
    let child_id = opt_i64(entry, "childId")?.unwrap_or(0);
    if child_id <= 0 {
        return Ok(None);
    }
    if !row_exists(conn, "children", child_id)? {
        return Err(HandlerErr::bad_params(format!("child {} not found", child_id)));
    }
    let teacher_id = opt_i64(entry, "teacherId")?.filter(|v| *v > 0);
    if let Some(tid) = teacher_id {
        if !row_exists(conn, "teachers", tid)? {
            return Err(HandlerErr::bad_params(format!("teacher {} not found", tid)));
        }
    }
    let ts = match opt_str(entry, "date") {
        Some(raw) => roster::normalize_timestamp(&raw).map_err(|e| HandlerErr::bad_params(e.to_string()))?,
        None => Utc::now(),
    };
    let status = match opt_str(entry, "status") {
        Some(raw) => AttendanceStatus::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params(format!("status must be Present, Absent or Late (got {})", raw))
        })?,
        None => AttendanceStatus::Present,
    };
    Ok(Some(AttendanceEntry {
        child_id,
        teacher_id,
        recorded_at: db::ts_to_db(ts),
        att_date: db::date_to_db(ts.date_naive()),
        status,
        notes: opt_str(entry, "notes").unwrap_or_default(),
    }))
}

fn attendance_save(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    // The mobile app posts a bare array; stdio callers wrap it in "records".
    let records = params
        .as_array()
        .or_else(|| params.get("records").and_then(|v| v.as_array()));
    let Some(records) = records.filter(|r| !r.is_empty()) else {
        return Err(HandlerErr::bad_params("No attendance data received."));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut saved = 0usize;
    for entry in records {
        let Some(entry) = parse_entry(&tx, entry)? else {
            continue;
        };
        tx.execute(
            "INSERT INTO attendance(child_id, teacher_id, recorded_at, att_date, status, notes)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(child_id, att_date) DO UPDATE SET
               teacher_id = excluded.teacher_id,
               recorded_at = excluded.recorded_at,
               status = excluded.status,
               notes = excluded.notes",
            (
                entry.child_id,
                entry.teacher_id,
                &entry.recorded_at,
                &entry.att_date,
                entry.status.as_str(),
                &entry.notes,
            ),
        )
        .map_err(|e| HandlerErr::db("db_upsert_failed", "attendance", e))?;
        saved += 1;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    info!(received = records.len(), saved, "attendance saved");
    Ok(json!({
        "success": true,
        "message": "Attendance saved successfully.",
        "saved": saved
    }))
}

fn attendance_child_history(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let child_id = req_i64(params, "childId")?;
    let days = opt_i64(params, "days")?.unwrap_or(30);
    let since = Some(days)
        .filter(|d| *d >= 0)
        .and_then(Duration::try_days)
        .and_then(|span| Utc::now().checked_sub_signed(span))
        .ok_or_else(|| HandlerErr::bad_params(format!("days out of range: {}", days)))?;
    let since = db::ts_to_db(since);

    let mut stmt = conn.prepare(
        "SELECT a.id, a.att_date, a.status, a.notes, t.full_name
         FROM attendance a
         LEFT JOIN teachers t ON t.id = a.teacher_id
         WHERE a.child_id = ? AND a.recorded_at >= ?
         ORDER BY a.recorded_at DESC",
    )?;
    let data = stmt
        .query_map((child_id, &since), |r| {
            Ok(json!({
                "attendanceId": r.get::<_, i64>(0)?,
                "date": r.get::<_, String>(1)?,
                "status": r.get::<_, String>(2)?,
                "notes": r.get::<_, Option<String>>(3)?,
                "teacher": r.get::<_, Option<String>>(4)?.unwrap_or_else(|| "N/A".to_string()),
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "success": true, "total": data.len(), "data": data }))
}

fn attendance_summary(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = req_i64(params, "classId")?;
    let today = db::date_to_db(Utc::now().date_naive());
    let present_count: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM attendance a
         JOIN children ch ON ch.id = a.child_id
         WHERE ch.class_id = ? AND a.att_date = ? AND a.status = 'Present'",
        (class_id, &today),
        |r| r.get(0),
    )?;
    let total_children: i64 = conn.query_row(
        "SELECT COUNT(*) FROM children WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )?;
    Ok(json!({ "totalChildren": total_children, "presentCount": present_count }))
}

fn attendance_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.child_id, ch.full_name, c.name, a.teacher_id, a.recorded_at, a.att_date, a.status, a.notes
         FROM attendance a
         JOIN children ch ON ch.id = a.child_id
         LEFT JOIN classes c ON c.id = ch.class_id
         ORDER BY a.recorded_at DESC, a.id DESC",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "attendanceId": r.get::<_, i64>(0)?,
                "childId": r.get::<_, i64>(1)?,
                "childName": r.get::<_, String>(2)?,
                "className": r.get::<_, Option<String>>(3)?.unwrap_or_else(|| roster::UNASSIGNED_CLASS.to_string()),
                "teacherId": r.get::<_, Option<i64>>(4)?,
                "timestamp": r.get::<_, String>(5)?,
                "date": r.get::<_, String>(6)?,
                "status": r.get::<_, String>(7)?,
                "notes": r.get::<_, Option<String>>(8)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!(rows))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.roster" => Some(with_db(state, req, attendance_roster)),
        "attendance.save" => Some(with_db(state, req, attendance_save)),
        "attendance.childHistory" => Some(with_db(state, req, attendance_child_history)),
        "attendance.summary" => Some(with_db(state, req, attendance_summary)),
        "attendance.list" => Some(with_db(state, req, attendance_list)),
        _ => None,
    }
}
