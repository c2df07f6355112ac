use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{req_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::reports::{self, ExportKind};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn report_err(e: anyhow::Error) -> HandlerErr {
    HandlerErr::new("report_failed", format!("{e:?}"))
}

fn dashboard_summary(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let summary = reports::dashboard(conn, Utc::now().date_naive()).map_err(report_err)?;
    Ok(json!(summary))
}

fn reports_summary(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let summary = reports::reports_summary(conn, Utc::now().date_naive()).map_err(report_err)?;
    Ok(json!(summary))
}

fn reports_export(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind_raw = req_str(params, "kind")?;
    let Some(kind) = ExportKind::parse(&kind_raw) else {
        return Err(HandlerErr::bad_params(
            "kind must be one of: attendancePdf, incidentsPdf, childrenPdf, feeCsv",
        ));
    };
    let out_path = PathBuf::from(req_str(params, "outPath")?);

    let bytes = kind.render(conn, Utc::now()).map_err(report_err)?;
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    }
    std::fs::write(&out_path, &bytes).map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;

    info!(kind = kind.file_name(), path = %out_path.to_string_lossy(), "report exported");
    Ok(json!({
        "outPath": out_path.to_string_lossy(),
        "fileName": kind.file_name(),
        "contentType": kind.content_type(),
        "bytes": bytes.len()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.summary" => Some(with_db(state, req, dashboard_summary)),
        "reports.summary" => Some(with_db(state, req, reports_summary)),
        "reports.export" => Some(with_db(state, req, reports_export)),
        _ => None,
    }
}
