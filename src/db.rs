use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

use crate::auth;

pub const DB_FILE: &str = "tlinky.sqlite3";
pub const SEED_ADMIN_EMAIL: &str = "admin@tlinky.org";
const SEED_ADMIN_PASSWORD: &str = "1234";

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)?;
    init_schema(&conn)?;
    info!(path = %db_path.to_string_lossy(), "database ready");
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'Admin'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            password_hash TEXT NOT NULL DEFAULT '',
            photo_url TEXT,
            status TEXT NOT NULL DEFAULT 'Active'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            teacher_id INTEGER,
            status TEXT NOT NULL DEFAULT 'Active',
            FOREIGN KEY(teacher_id) REFERENCES teachers(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_teacher ON classes(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS parents(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            password_hash TEXT NOT NULL DEFAULT '',
            phone TEXT,
            status TEXT NOT NULL DEFAULT 'Active'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS children(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            dob TEXT,
            class_id INTEGER,
            parent_id INTEGER,
            allergies TEXT,
            photo_url TEXT,
            status TEXT NOT NULL DEFAULT 'Active',
            FOREIGN KEY(class_id) REFERENCES classes(id) ON DELETE CASCADE,
            FOREIGN KEY(parent_id) REFERENCES parents(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_children_class ON children(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_children_parent ON children(parent_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            child_id INTEGER NOT NULL,
            teacher_id INTEGER,
            recorded_at TEXT NOT NULL,
            att_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'Present',
            notes TEXT,
            FOREIGN KEY(child_id) REFERENCES children(id) ON DELETE CASCADE,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id) ON DELETE SET NULL
        )",
        [],
    )?;
    // One row per child per calendar day; the save path upserts against this.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_child_date ON attendance(child_id, att_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(att_date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER,
            child_id INTEGER,
            month TEXT,
            amount REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'Pending',
            proof_url TEXT,
            date_uploaded TEXT NOT NULL,
            FOREIGN KEY(parent_id) REFERENCES parents(id) ON DELETE SET NULL,
            FOREIGN KEY(child_id) REFERENCES children(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_parent ON payments(parent_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_month ON payments(month)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS incidents(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            type TEXT NOT NULL,
            description TEXT NOT NULL,
            class_id INTEGER,
            teacher_id INTEGER,
            FOREIGN KEY(class_id) REFERENCES classes(id) ON DELETE SET NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id) ON DELETE SET NULL
        )",
        [],
    )?;
    // Older databases predate the child link on incidents.
    ensure_incidents_child_id(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_incidents_child ON incidents(child_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS announcements(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            audience TEXT NOT NULL DEFAULT 'Everyone',
            date_posted TEXT NOT NULL
        )",
        [],
    )?;
    ensure_announcements_author(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL,
            message TEXT NOT NULL,
            date_created TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            id INTEGER PRIMARY KEY CHECK (id = 1),
            school_name TEXT NOT NULL DEFAULT 'Tlinky Crèche',
            email TEXT NOT NULL DEFAULT 'info@tlinky.org',
            phone TEXT NOT NULL DEFAULT '012-345-6789',
            principal TEXT NOT NULL DEFAULT 'Mrs Dlamini Dzanibe',
            base_monthly_fee REAL NOT NULL DEFAULT 600,
            toddler_fee REAL NOT NULL DEFAULT 500,
            preschool_fee REAL NOT NULL DEFAULT 650,
            late_fee_amount REAL NOT NULL DEFAULT 50,
            late_fee_policy INTEGER NOT NULL DEFAULT 1,
            notifications_enabled INTEGER NOT NULL DEFAULT 1,
            term_dates TEXT NOT NULL DEFAULT 'Jan – Dec 2025'
        )",
        [],
    )?;
    conn.execute("INSERT OR IGNORE INTO settings(id) VALUES(1)", [])?;

    seed_admin(conn)?;
    Ok(())
}

fn seed_admin(conn: &Connection) -> anyhow::Result<()> {
    let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
    if users > 0 {
        return Ok(());
    }
    let hash = auth::hash_password(SEED_ADMIN_PASSWORD)?;
    conn.execute(
        "INSERT INTO users(email, password_hash, role) VALUES(?, ?, 'Admin')",
        (SEED_ADMIN_EMAIL, &hash),
    )?;
    info!(email = SEED_ADMIN_EMAIL, "seeded default admin account");
    Ok(())
}

fn ensure_incidents_child_id(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "incidents", "child_id")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE incidents ADD COLUMN child_id INTEGER REFERENCES children(id) ON DELETE CASCADE",
        [],
    )?;
    Ok(())
}

fn ensure_announcements_author(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "announcements", "author")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE announcements ADD COLUMN author TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Stored timestamps are UTC with a fixed width so that text comparison orders them.
pub fn ts_to_db(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub fn ts_from_db(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .ok()
        .map(|n| n.and_utc())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        })
}

pub fn date_to_db(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn date_from_db(raw: &str) -> Option<NaiveDate> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, DATE_FORMAT).ok()
}

pub fn now_db() -> String {
    ts_to_db(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_and_seeds_once() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .expect("count users");
        assert_eq!(users, 1);
        let settings: i64 = conn
            .query_row("SELECT COUNT(*) FROM settings", [], |r| r.get(0))
            .expect("count settings");
        assert_eq!(settings, 1);
    }

    #[test]
    fn legacy_incidents_table_gains_child_column() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE incidents(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                type TEXT NOT NULL,
                description TEXT NOT NULL,
                class_id INTEGER,
                teacher_id INTEGER
            )",
            [],
        )
        .expect("legacy table");
        init_schema(&conn).expect("init");
        assert!(table_has_column(&conn, "incidents", "child_id").expect("pragma"));
    }

    #[test]
    fn timestamps_round_trip_and_sort_as_text() {
        let a = ts_from_db("2025-10-24T08:00:00Z").expect("parse a");
        let b = ts_from_db("2025-10-24T10:30:00+02:00").expect("parse b");
        assert!(ts_to_db(a) < ts_to_db(b));
        assert_eq!(ts_to_db(b), "2025-10-24T08:30:00Z");
        assert_eq!(
            date_from_db("2025-10-24T23:59:59Z"),
            NaiveDate::from_ymd_opt(2025, 10, 24)
        );
    }
}
