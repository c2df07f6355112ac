use crate::auth::{verify_password, JwtSettings, Role};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{opt_str, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use tracing::warn;

struct Account {
    id: i64,
    email: String,
    full_name: Option<String>,
    password_hash: String,
}

fn credentials(params: &serde_json::Value) -> Result<(String, String), HandlerErr> {
    let email = opt_str(params, "email");
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    match (email, password) {
        (Some(e), Some(p)) => Ok((e, p)),
        _ => Err(HandlerErr::bad_params("Missing email or password.")),
    }
}

fn find_account(conn: &Connection, role: Role, email: &str) -> Result<Option<Account>, HandlerErr> {
    let sql = match role {
        Role::Admin => {
            "SELECT id, email, NULL, password_hash FROM users WHERE lower(email) = lower(?) ORDER BY id LIMIT 1"
        }
        Role::Teacher => {
            "SELECT id, email, full_name, password_hash FROM teachers WHERE lower(email) = lower(?) ORDER BY id LIMIT 1"
        }
        Role::Parent => {
            "SELECT id, email, full_name, password_hash FROM parents WHERE lower(email) = lower(?) ORDER BY id LIMIT 1"
        }
    };
    Ok(conn
        .query_row(sql, [email], |r| {
            Ok(Account {
                id: r.get(0)?,
                email: r.get(1)?,
                full_name: r.get(2)?,
                password_hash: r.get(3)?,
            })
        })
        .optional()?)
}

/// Looks up the account for `role` and checks the password.
pub fn authenticate(
    conn: &Connection,
    role: Role,
    email: &str,
    password: &str,
) -> Result<Option<(i64, String, Option<String>)>, HandlerErr> {
    let Some(account) = find_account(conn, role, email)? else {
        return Ok(None);
    };
    if !verify_password(password, &account.password_hash) {
        return Ok(None);
    }
    Ok(Some((account.id, account.email, account.full_name)))
}

fn login(
    conn: &Connection,
    params: &serde_json::Value,
    jwt: &JwtSettings,
    role: Role,
) -> Result<serde_json::Value, HandlerErr> {
    let (email, password) = credentials(params)?;
    let Some((id, email, full_name)) = authenticate(conn, role, &email, &password)? else {
        warn!(role = role.as_str(), "login rejected");
        return Err(HandlerErr::unauthorized(format!(
            "Invalid {} credentials.",
            role.as_str().to_ascii_lowercase()
        )));
    };
    let token = jwt
        .issue(id, &email, role)
        .map_err(|e| HandlerErr::new("token_failed", e.to_string()))?;

    Ok(match role {
        Role::Admin => json!({
            "success": true,
            "role": role.as_str(),
            "email": email,
            "token": token
        }),
        Role::Teacher => json!({
            "success": true,
            "role": role.as_str(),
            "teacherId": id,
            "fullName": full_name,
            "email": email,
            "token": token
        }),
        Role::Parent => json!({
            "success": true,
            "role": role.as_str(),
            "parentId": id,
            "fullName": full_name,
            "email": email,
            "token": token
        }),
    })
}

fn handle_login(state: &mut AppState, req: &Request, role: Role) -> serde_json::Value {
    let jwt = state.jwt.clone();
    with_db(state, req, |conn, params| login(conn, params, &jwt, role))
}

fn handle_verify(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(token) = opt_str(&req.params, "token") else {
        return err(&req.id, "bad_params", "missing token", None);
    };
    match state.jwt.verify(&token) {
        Ok(claims) => ok(
            &req.id,
            json!({ "id": claims.sub, "email": claims.email, "role": claims.role }),
        ),
        Err(e) => err(&req.id, "unauthorized", e.to_string(), None),
    }
}

fn session_authenticate(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (email, password) = credentials(params)
        .map_err(|_| HandlerErr::bad_params("Please enter both email and password."))?;
    let Some((id, email, _)) = authenticate(conn, Role::Admin, &email, &password)? else {
        return Err(HandlerErr::unauthorized("Invalid email or password."));
    };
    let role: String = conn.query_row("SELECT role FROM users WHERE id = ?", [id], |r| r.get(0))?;
    Ok(json!({ "userId": id, "email": email, "role": role }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.loginAdmin" => Some(handle_login(state, req, Role::Admin)),
        "auth.loginTeacher" => Some(handle_login(state, req, Role::Teacher)),
        "auth.loginParent" => Some(handle_login(state, req, Role::Parent)),
        "auth.verify" => Some(handle_verify(state, req)),
        "session.authenticate" => Some(with_db(state, req, session_authenticate)),
        _ => None,
    }
}
