//! REST/MVC surface over the ipc handlers.

mod error;
mod handlers;
mod session;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::config::Config;
use crate::db;
use crate::ipc::AppState;
use crate::reports::ExportKind;
use crate::upload::{CloudinaryHost, DisabledHost, ImageHost, CHILD_FOLDER, PAYMENT_FOLDER, TEACHER_FOLDER};

use handlers::{
    auth_me, by_body, by_path, by_path_body, by_query, export, login_authenticate, logout, session,
    upload_image, upload_payment_proof, QueryMap,
};
use session::{SessionStore, IDLE_TIMEOUT};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct HttpState {
    pub core: Arc<Mutex<AppState>>,
    pub sessions: Arc<SessionStore>,
    pub images: Arc<dyn ImageHost>,
}

impl HttpState {
    pub fn new(core: AppState, images: Arc<dyn ImageHost>) -> Self {
        Self {
            core: Arc::new(Mutex::new(core)),
            sessions: Arc::new(SessionStore::new(IDLE_TIMEOUT)),
            images,
        }
    }
}

type S = State<HttpState>;
type Q = Query<QueryMap>;
type P = Path<String>;

fn auth_routes() -> Router<HttpState> {
    Router::new()
        .route("/api/Auth/LoginAdmin", post(|s: S, b: Bytes| by_body(s, b, "auth.loginAdmin")))
        .route("/api/Auth/LoginTeacher", post(|s: S, b: Bytes| by_body(s, b, "auth.loginTeacher")))
        .route("/api/Auth/LoginParent", post(|s: S, b: Bytes| by_body(s, b, "auth.loginParent")))
        .route("/api/Auth/me", get(auth_me))
        .route("/Login/Authenticate", post(login_authenticate))
        .route("/Login/Logout", get(logout))
        .route("/Login/Session", get(session))
}

fn roster_routes() -> Router<HttpState> {
    Router::new()
        .route("/Children/GetAll", get(|s: S, q: Q| by_query(s, q, "children.list")))
        .route(
            "/Children/GetByClass/:classId",
            get(|s: S, p: P, q: Q| by_path(s, p, q, "children.byClass", "classId")),
        )
        .route("/Children/Dropdowns", get(|s: S, q: Q| by_query(s, q, "children.dropdowns")))
        .route("/Children/Add", post(|s: S, b: Bytes| by_body(s, b, "children.create")))
        .route("/Children/Edit", put(|s: S, b: Bytes| by_body(s, b, "children.update")))
        .route("/Children/Delete", axum::routing::delete(|s: S, q: Q| by_query(s, q, "children.delete")))
        .route("/api/ChildrenApi", get(|s: S, q: Q| by_query(s, q, "children.api")))
        .route("/Classes/GetAll", get(|s: S, q: Q| by_query(s, q, "classes.list")))
        .route("/Classes/Dropdowns", get(|s: S, q: Q| by_query(s, q, "classes.dropdowns")))
        .route("/Classes/Add", post(|s: S, b: Bytes| by_body(s, b, "classes.create")))
        .route("/Classes/Edit", put(|s: S, b: Bytes| by_body(s, b, "classes.update")))
        .route("/Classes/Delete", axum::routing::delete(|s: S, q: Q| by_query(s, q, "classes.delete")))
}

fn people_routes() -> Router<HttpState> {
    Router::new()
        .route("/Parents/GetAll", get(|s: S, q: Q| by_query(s, q, "parents.list")))
        .route("/Parents/Dropdowns", get(|s: S, q: Q| by_query(s, q, "parents.dropdowns")))
        .route("/Parents/Add", post(|s: S, b: Bytes| by_body(s, b, "parents.create")))
        .route("/Parents/Edit", put(|s: S, b: Bytes| by_body(s, b, "parents.update")))
        .route(
            "/Parents/Delete/:id",
            axum::routing::delete(|s: S, p: P, q: Q| by_path(s, p, q, "parents.delete", "id")),
        )
        .route(
            "/Parents/ResetPassword/:id",
            put(|s: S, p: P, b: Bytes| {
                by_path_body(s, p, b, "parents.resetPassword", "id", Some("newPassword"))
            }),
        )
        .route("/api/ParentApi/login", post(|s: S, b: Bytes| by_body(s, b, "parents.login")))
        .route(
            "/api/ParentApi/children/:id",
            get(|s: S, p: P, q: Q| by_path(s, p, q, "parents.children", "parentId")),
        )
        .route(
            "/api/ParentApi/Overview/:id",
            get(|s: S, p: P, q: Q| by_path(s, p, q, "parents.overview", "parentId")),
        )
        .route("/Teachers/GetAll", get(|s: S, q: Q| by_query(s, q, "teachers.list")))
        .route("/Teachers/Add", post(|s: S, b: Bytes| by_body(s, b, "teachers.create")))
        .route(
            "/Teachers/Edit",
            put(|s: S, b: Bytes| by_body(s, b, "teachers.update"))
                .post(|s: S, b: Bytes| by_body(s, b, "teachers.update")),
        )
        .route(
            "/Teachers/Delete/:id",
            axum::routing::delete(|s: S, p: P, q: Q| by_path(s, p, q, "teachers.delete", "id"))
                .post(|s: S, p: P, q: Q| by_path(s, p, q, "teachers.delete", "id")),
        )
        .route(
            "/Teachers/ResetPassword/:id",
            put(|s: S, p: P, b: Bytes| {
                by_path_body(s, p, b, "teachers.resetPassword", "id", Some("newPassword"))
            })
            .post(|s: S, p: P, b: Bytes| {
                by_path_body(s, p, b, "teachers.resetPassword", "id", Some("newPassword"))
            }),
        )
        .route("/api/TeacherApi/login", post(|s: S, b: Bytes| by_body(s, b, "teachers.login")))
        .route(
            "/api/TeacherApi/:id",
            get(|s: S, p: P, q: Q| by_path(s, p, q, "teachers.get", "id")),
        )
}

fn attendance_routes() -> Router<HttpState> {
    Router::new()
        .route(
            "/api/AttendanceApi",
            get(|s: S, q: Q| by_query(s, q, "attendance.roster"))
                .post(|s: S, b: Bytes| by_body(s, b, "attendance.save")),
        )
        .route(
            "/api/AttendanceApi/child/:id",
            get(|s: S, p: P, q: Q| by_path(s, p, q, "attendance.childHistory", "childId")),
        )
        .route("/api/AttendanceApi/summary", get(|s: S, q: Q| by_query(s, q, "attendance.summary")))
        .route("/Attendance/GetAll", get(|s: S, q: Q| by_query(s, q, "attendance.list")))
}

fn payment_routes() -> Router<HttpState> {
    Router::new()
        .route("/Payments/ByMonth", get(|s: S, q: Q| by_query(s, q, "payments.byMonth")))
        .route(
            "/Payments/ByMonth/:month",
            get(|s: S, p: P, q: Q| by_path(s, p, q, "payments.byMonth", "month")),
        )
        .route("/Payments/Generate", post(|s: S, q: Q| by_query(s, q, "payments.generate")))
        .route(
            "/Payments/Generate/:month",
            post(|s: S, p: P, q: Q| by_path(s, p, q, "payments.generate", "month")),
        )
        .route(
            "/Payments/UpdateStatus/:id",
            put(|s: S, p: P, b: Bytes| by_path_body(s, p, b, "payments.updateStatus", "id", Some("status"))),
        )
        .route(
            "/Payments/AttachProof/:id",
            put(|s: S, p: P, b: Bytes| by_path_body(s, p, b, "payments.attachProof", "id", Some("proofUrl"))),
        )
        .route(
            "/Payments/Delete/:id",
            axum::routing::delete(|s: S, p: P, q: Q| by_path(s, p, q, "payments.delete", "id")),
        )
        .route(
            "/api/PaymentApi/GetByParent/:parentId",
            get(|s: S, p: P, q: Q| by_path(s, p, q, "payments.byParent", "parentId")),
        )
        .route("/api/PaymentApi/UploadProof", post(upload_payment_proof))
        .route(
            "/api/Upload/teacher-photo",
            post(|s: S, m: Multipart| upload_image(s, m, TEACHER_FOLDER)),
        )
        .route(
            "/api/Upload/child-photo",
            post(|s: S, m: Multipart| upload_image(s, m, CHILD_FOLDER)),
        )
        .route(
            "/api/Upload/payment-proof",
            post(|s: S, m: Multipart| upload_image(s, m, PAYMENT_FOLDER)),
        )
}

fn board_routes() -> Router<HttpState> {
    Router::new()
        .route("/api/IncidentApi", post(|s: S, b: Bytes| by_body(s, b, "incidents.create")))
        .route("/Incidents", get(|s: S, q: Q| by_query(s, q, "incidents.list")))
        .route(
            "/Incidents/Details/:id",
            get(|s: S, p: P, q: Q| by_path(s, p, q, "incidents.get", "id")),
        )
        .route("/api/AnnouncementsApi", get(|s: S, q: Q| by_query(s, q, "announcements.list")))
        .route(
            "/api/AnnouncementsApi/count",
            get(|s: S, q: Q| by_query(s, q, "announcements.count")),
        )
        .route(
            "/api/AnnouncementsApi/:id",
            get(|s: S, p: P, q: Q| by_path(s, p, q, "announcements.get", "id")),
        )
        .route("/Announcements/GetAll", get(|s: S, q: Q| by_query(s, q, "announcements.all")))
        .route("/Announcements/Add", post(|s: S, b: Bytes| by_body(s, b, "announcements.create")))
        .route(
            "/Announcements/Delete/:id",
            axum::routing::delete(|s: S, p: P, q: Q| by_path(s, p, q, "announcements.delete", "id")),
        )
        .route(
            "/api/NotificationsApi",
            get(|s: S, q: Q| by_query(s, q, "notifications.latest"))
                .post(|s: S, b: Bytes| by_body(s, b, "notifications.create"))
                .delete(|s: S, q: Q| by_query(s, q, "notifications.clear")),
        )
}

fn admin_routes() -> Router<HttpState> {
    Router::new()
        .route("/Settings", get(|s: S, q: Q| by_query(s, q, "settings.get")))
        .route("/Settings/UpdateSchool", put(|s: S, b: Bytes| by_body(s, b, "settings.updateSchool")))
        .route("/Settings/UpdateFees", put(|s: S, b: Bytes| by_body(s, b, "settings.updateFees")))
        .route("/Settings/UpdatePrefs", put(|s: S, b: Bytes| by_body(s, b, "settings.updatePrefs")))
        .route("/Home/Dashboard", get(|s: S, q: Q| by_query(s, q, "dashboard.summary")))
        .route("/Reports/Summary", get(|s: S, q: Q| by_query(s, q, "reports.summary")))
        .route("/Reports/ExportAttendancePdf", get(|s: S| export(s, ExportKind::AttendancePdf)))
        .route("/Reports/ExportIncidentsPdf", get(|s: S| export(s, ExportKind::IncidentsPdf)))
        .route("/Reports/ExportChildrenPdf", get(|s: S| export(s, ExportKind::ChildrenPdf)))
        .route("/Reports/ExportFeeCsv", get(|s: S| export(s, ExportKind::FeeCsv)))
}

fn cors(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let list: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    layer.allow_origin(AllowOrigin::list(list)).allow_credentials(true)
}

pub fn router(state: HttpState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(|s: S, q: Q| by_query(s, q, "health")))
        .merge(auth_routes())
        .merge(roster_routes())
        .merge(people_routes())
        .merge(attendance_routes())
        .merge(payment_routes())
        .merge(board_routes())
        .merge(admin_routes())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors(cors_origins))
        .with_state(state)
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let conn = db::open_db(&config.workspace)?;
    let core = AppState {
        workspace: Some(config.workspace.clone()),
        db: Some(conn),
        jwt: config.jwt.clone(),
    };
    let images: Arc<dyn ImageHost> = match config.cloudinary.clone() {
        Some(c) => Arc::new(CloudinaryHost::new(c)),
        None => Arc::new(DisabledHost),
    };
    let app = router(HttpState::new(core, images), &config.cors_origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server running on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
