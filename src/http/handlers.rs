//! Adapters from axum extractors to ipc method calls.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::info;

use super::error::AppError;
use super::session::{clear_cookie, cookie_value, set_cookie, Session, COOKIE_NAME};
use super::HttpState;
use crate::ipc::{handle_request, Request};
use crate::reports::ExportKind;
use crate::upload::{UploadFile, PAYMENT_FOLDER};

pub type ApiResult = Result<Json<Value>, AppError>;
pub type QueryMap = HashMap<String, String>;

/// Runs one ipc method on the blocking pool while holding the state lock.
pub async fn call(state: &HttpState, method: &str, params: Value) -> Result<Value, AppError> {
    let core = Arc::clone(&state.core);
    let req = Request::new(method, params);
    let resp = tokio::task::spawn_blocking(move || {
        let mut guard = core
            .lock()
            .map_err(|_| AppError::Internal("state lock poisoned".into()))?;
        Ok::<_, AppError>(handle_request(&mut guard, req))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    unwrap_envelope(resp)
}

fn unwrap_envelope(resp: Value) -> Result<Value, AppError> {
    if resp.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(resp.get("result").cloned().unwrap_or(Value::Null));
    }
    let field = |key: &str| {
        resp.get("error")
            .and_then(|e| e.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Err(AppError::Handler {
        code: field("code"),
        message: field("message"),
    })
}

fn query_params(q: QueryMap) -> Value {
    Value::Object(q.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
}

fn body_params(body: &Bytes) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}

fn with_key(params: Value, key: &str, value: impl Into<Value>) -> Value {
    let mut obj = match params {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    obj.insert(key.to_string(), value.into());
    Value::Object(obj)
}

pub async fn by_query(State(s): State<HttpState>, Query(q): Query<QueryMap>, method: &'static str) -> ApiResult {
    call(&s, method, query_params(q)).await.map(Json)
}

pub async fn by_body(State(s): State<HttpState>, body: Bytes, method: &'static str) -> ApiResult {
    let params = body_params(&body)?;
    call(&s, method, params).await.map(Json)
}

/// Path segment lands under `key`; query pairs ride along.
pub async fn by_path(
    State(s): State<HttpState>,
    Path(id): Path<String>,
    Query(q): Query<QueryMap>,
    method: &'static str,
    key: &'static str,
) -> ApiResult {
    call(&s, method, with_key(query_params(q), key, id)).await.map(Json)
}

/// Body may be an object or, for single-value edits, a bare JSON string
/// stored under `text_key`.
pub async fn by_path_body(
    State(s): State<HttpState>,
    Path(id): Path<String>,
    body: Bytes,
    method: &'static str,
    key: &'static str,
    text_key: Option<&'static str>,
) -> ApiResult {
    let params = match (body_params(&body)?, text_key) {
        (Value::String(text), Some(k)) => with_key(Value::Null, k, text),
        (other, _) => other,
    };
    call(&s, method, with_key(params, key, id)).await.map(Json)
}

pub async fn auth_me(State(s): State<HttpState>, headers: HeaderMap) -> ApiResult {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token.".into()))?;
    call(&s, "auth.verify", json!({ "token": token })).await.map(Json)
}

pub async fn login_authenticate(State(s): State<HttpState>, body: Bytes) -> Result<Response, AppError> {
    let result = call(&s, "session.authenticate", body_params(&body)?).await?;
    let session = Session {
        user_id: result.get("userId").and_then(Value::as_i64).unwrap_or_default(),
        email: result.get("email").and_then(Value::as_str).unwrap_or_default().to_string(),
        role: result.get("role").and_then(Value::as_str).unwrap_or_default().to_string(),
    };
    let id = s.sessions.create(session.clone());
    info!(email = %session.email, "admin session started");
    Ok((
        [(header::SET_COOKIE, set_cookie(&id))],
        Json(json!({ "success": true, "email": session.email, "role": session.role })),
    )
        .into_response())
}

pub async fn logout(State(s): State<HttpState>, headers: HeaderMap) -> Response {
    if let Some(id) = cookie_value(&headers, COOKIE_NAME) {
        s.sessions.remove(&id);
    }
    (
        [(header::SET_COOKIE, clear_cookie())],
        Json(json!({ "success": true })),
    )
        .into_response()
}

pub async fn session(State(s): State<HttpState>, headers: HeaderMap) -> ApiResult {
    let current = cookie_value(&headers, COOKIE_NAME)
        .and_then(|id| s.sessions.touch(&id))
        .ok_or_else(|| AppError::Unauthorized("Not signed in.".into()))?;
    Ok(Json(json!({
        "authenticated": true,
        "userId": current.user_id,
        "email": current.email,
        "role": current.role
    })))
}

async fn read_multipart(mut multipart: Multipart) -> Result<(QueryMap, Option<UploadFile>), AppError> {
    let mut fields = QueryMap::new();
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            if !bytes.is_empty() {
                file = Some(UploadFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            fields.insert(name, text);
        }
    }
    Ok((fields, file))
}

pub async fn upload_image(State(s): State<HttpState>, multipart: Multipart, folder: &'static str) -> ApiResult {
    let (_, file) = read_multipart(multipart).await?;
    let file = file.ok_or_else(|| AppError::BadRequest("No file uploaded.".into()))?;
    let url = s.images.upload(folder, file).await?;
    info!(folder, %url, "image uploaded");
    Ok(Json(json!({ "url": url })))
}

pub async fn upload_payment_proof(State(s): State<HttpState>, multipart: Multipart) -> ApiResult {
    let (fields, file) = read_multipart(multipart).await?;
    let payment_id = fields
        .get("paymentId")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|id| *id > 0);
    let (Some(payment_id), Some(file)) = (payment_id, file) else {
        return Err(AppError::BadRequest("Missing file or payment ID.".into()));
    };
    let url = s.images.upload(PAYMENT_FOLDER, file).await?;
    call(
        &s,
        "payments.attachProof",
        json!({ "id": payment_id, "proofUrl": url }),
    )
    .await
    .map(Json)
}

pub async fn export(State(s): State<HttpState>, kind: ExportKind) -> Result<Response, AppError> {
    let core = Arc::clone(&s.core);
    let bytes = tokio::task::spawn_blocking(move || {
        let guard = core
            .lock()
            .map_err(|_| AppError::Internal("state lock poisoned".into()))?;
        let conn = guard.db.as_ref().ok_or_else(|| AppError::Handler {
            code: "no_workspace".into(),
            message: "select a workspace first".into(),
        })?;
        kind.render(conn, Utc::now())
            .map_err(|e| AppError::Internal(format!("{e:?}")))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    info!(file = kind.file_name(), bytes = bytes.len(), "export rendered");
    Ok((
        [
            (header::CONTENT_TYPE, kind.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", kind.file_name()),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelopes_become_handler_errors() {
        let resp = json!({
            "id": "1",
            "ok": false,
            "error": { "code": "not_found", "message": "Teacher not found." }
        });
        match unwrap_envelope(resp) {
            Err(AppError::Handler { code, message }) => {
                assert_eq!(code, "not_found");
                assert_eq!(message, "Teacher not found.");
            }
            other => panic!("unexpected: {other:?}"),
        }
        let ok = unwrap_envelope(json!({ "id": "2", "ok": true, "result": { "n": 1 } }));
        assert_eq!(ok.expect("ok")["n"], 1);
    }

    #[test]
    fn path_values_merge_into_body() {
        assert_eq!(with_key(json!({ "status": "Paid" }), "id", "7"), json!({ "status": "Paid", "id": "7" }));
        assert_eq!(with_key(Value::Null, "id", "7"), json!({ "id": "7" }));
        assert_eq!(body_params(&Bytes::from_static(b"  ")).expect("blank"), Value::Null);
        assert!(body_params(&Bytes::from_static(b"{oops")).is_err());
    }
}
