use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::calc::approx_age;
use crate::db;
use crate::pdf::{Orientation, TableDoc};

pub const SCHOOL_TITLE: &str = "Tlinky Crèche";
pub const INCIDENT_EXPORT_LIMIT: i64 = 100;
pub const INCIDENT_SUMMARY_LIMIT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAttendance {
    pub class_name: String,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentLine {
    pub date: Option<DateTime<Utc>>,
    pub description: String,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeCompliance {
    pub month: String,
    pub paid: i64,
    pub total: i64,
    pub percent: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterLine {
    pub full_name: String,
    pub class_name: String,
    pub age: i64,
    pub guardian: String,
}

/// Present/absent/late tallies per class over all recorded attendance.
/// Children without a class are left out.
pub fn attendance_by_class(conn: &Connection) -> anyhow::Result<Vec<ClassAttendance>> {
    let mut stmt = conn.prepare(
        "SELECT c.name,
                SUM(CASE WHEN lower(a.status) = 'present' THEN 1 ELSE 0 END),
                SUM(CASE WHEN lower(a.status) = 'absent' THEN 1 ELSE 0 END),
                SUM(CASE WHEN lower(a.status) = 'late' THEN 1 ELSE 0 END)
         FROM attendance a
         JOIN children ch ON ch.id = a.child_id
         JOIN classes c ON c.id = ch.class_id
         GROUP BY c.name
         ORDER BY c.name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassAttendance {
                class_name: r.get(0)?,
                present: r.get(1)?,
                absent: r.get(2)?,
                late: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn latest_incidents(conn: &Connection, limit: i64) -> anyhow::Result<Vec<IncidentLine>> {
    let mut stmt = conn.prepare(
        "SELECT i.date, i.description, c.name
         FROM incidents i
         LEFT JOIN children ch ON ch.id = i.child_id
         LEFT JOIN classes c ON c.id = ch.class_id
         ORDER BY i.date DESC, i.id DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit], |r| {
            let date: String = r.get(0)?;
            let description: Option<String> = r.get(1)?;
            Ok(IncidentLine {
                date: db::ts_from_db(&date),
                description: description
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| "(No details)".to_string()),
                class_name: r
                    .get::<_, Option<String>>(2)?
                    .unwrap_or_else(|| "Unassigned".to_string()),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Paid share per month label. Percent is truncated to a whole number.
pub fn fee_compliance(conn: &Connection) -> anyhow::Result<Vec<FeeCompliance>> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(NULLIF(month, ''), 'Unspecified') AS label,
                SUM(CASE WHEN lower(status) = 'paid' THEN 1 ELSE 0 END),
                COUNT(*)
         FROM payments
         GROUP BY label
         ORDER BY label",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let paid: i64 = r.get(1)?;
            let total: i64 = r.get(2)?;
            Ok(FeeCompliance {
                month: r.get(0)?,
                paid,
                total,
                percent: if total == 0 { 0 } else { paid * 100 / total },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn children_roster(conn: &Connection, today: NaiveDate) -> anyhow::Result<Vec<RosterLine>> {
    let mut stmt = conn.prepare(
        "SELECT ch.full_name, COALESCE(c.name, 'Unassigned') AS class_name, ch.dob, p.full_name
         FROM children ch
         LEFT JOIN classes c ON c.id = ch.class_id
         LEFT JOIN parents p ON p.id = ch.parent_id
         ORDER BY class_name, ch.full_name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let dob: Option<String> = r.get(2)?;
            Ok(RosterLine {
                full_name: r.get(0)?,
                class_name: r.get(1)?,
                age: dob
                    .as_deref()
                    .and_then(db::date_from_db)
                    .map(|d| approx_age(d, today))
                    .unwrap_or(0),
                guardian: r
                    .get::<_, Option<String>>(3)?
                    .unwrap_or_else(|| "Unknown".to_string()),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportsSummary {
    pub attendance_summary: Vec<ClassAttendance>,
    pub incident_summary: Vec<serde_json::Value>,
    pub payments_by_month: Vec<FeeCompliance>,
    pub children: Vec<RosterLine>,
}

pub fn reports_summary(conn: &Connection, today: NaiveDate) -> anyhow::Result<ReportsSummary> {
    let incidents = latest_incidents(conn, INCIDENT_SUMMARY_LIMIT)?
        .into_iter()
        .map(|i| {
            serde_json::json!({
                "date": i.date.map(|d| d.format("%d %b").to_string()),
                "description": i.description,
                "className": i.class_name,
            })
        })
        .collect();
    Ok(ReportsSummary {
        attendance_summary: attendance_by_class(conn)?,
        incident_summary: incidents,
        payments_by_month: fee_compliance(conn)?,
        children: children_roster(conn, today)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayAttendance {
    pub child_name: String,
    pub class_name: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthTotal {
    pub month: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPresent {
    pub date: String,
    pub present: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_children: i64,
    pub total_parents: i64,
    pub total_teachers: i64,
    pub total_incidents: i64,
    pub present_today: i64,
    pub outstanding_fees: f64,
    pub total_collected: f64,
    pub todays_attendance: Vec<TodayAttendance>,
    pub monthly: Vec<MonthTotal>,
    pub attendance_trend: Vec<DayPresent>,
}

fn count(conn: &Connection, table: &str) -> anyhow::Result<i64> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
}

pub fn dashboard(conn: &Connection, today: NaiveDate) -> anyhow::Result<DashboardSummary> {
    let today_key = db::date_to_db(today);

    let present_today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance WHERE att_date = ? AND status = 'Present'",
        [&today_key],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT ch.full_name, c.name, a.status
         FROM attendance a
         JOIN children ch ON ch.id = a.child_id
         LEFT JOIN classes c ON c.id = ch.class_id
         WHERE a.att_date = ?
         ORDER BY ch.full_name",
    )?;
    let todays_attendance = stmt
        .query_map([&today_key], |r| {
            Ok(TodayAttendance {
                child_name: r.get(0)?,
                class_name: r.get(1)?,
                status: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let (outstanding_fees, total_collected): (f64, f64) = conn.query_row(
        "SELECT
           COALESCE(SUM(CASE WHEN status IN ('Pending', 'Unpaid') THEN amount ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN status = 'Paid' THEN amount ELSE 0 END), 0)
         FROM payments",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    // Current month plus the five before it.
    let window_start = today
        .with_day(1)
        .and_then(|d| d.checked_sub_months(Months::new(5)))
        .unwrap_or(today);
    let since = db::date_to_db(window_start);
    let mut stmt = conn.prepare("SELECT date_uploaded, amount FROM payments WHERE date_uploaded >= ?")?;
    let mut by_month: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    let uploads = stmt
        .query_map([&since], |r| Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (raw, amount) in uploads {
        if let Some(ts) = db::ts_from_db(&raw) {
            *by_month.entry((ts.year(), ts.month())).or_insert(0.0) += amount;
        }
    }
    let monthly = by_month
        .into_iter()
        .filter_map(|((y, m), total)| {
            NaiveDate::from_ymd_opt(y, m, 1).map(|d| MonthTotal {
                month: d.format("%b %Y").to_string(),
                total,
            })
        })
        .collect();

    let week_start = db::date_to_db(today - Duration::days(6));
    let mut stmt = conn.prepare(
        "SELECT att_date, SUM(CASE WHEN status = 'Present' THEN 1 ELSE 0 END)
         FROM attendance
         WHERE att_date >= ?
         GROUP BY att_date
         ORDER BY att_date",
    )?;
    let attendance_trend = stmt
        .query_map([&week_start], |r| {
            Ok(DayPresent {
                date: r.get(0)?,
                present: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DashboardSummary {
        total_children: count(conn, "children")?,
        total_parents: count(conn, "parents")?,
        total_teachers: count(conn, "teachers")?,
        total_incidents: count(conn, "incidents")?,
        present_today,
        outstanding_fees,
        total_collected,
        todays_attendance,
        monthly,
        attendance_trend,
    })
}

pub fn fee_compliance_csv(rows: &[FeeCompliance]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Month", "Paid", "Total", "Percent"])?;
    for r in rows {
        writer.write_record([
            r.month.clone(),
            r.paid.to_string(),
            r.total.to_string(),
            r.percent.to_string(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flush csv: {}", e.error()))
}

fn generated_line(now: DateTime<Utc>) -> String {
    format!("Generated on: {} UTC", now.format("%d %b %Y %H:%M"))
}

pub fn attendance_pdf(rows: &[ClassAttendance], now: DateTime<Utc>) -> anyhow::Result<Vec<u8>> {
    TableDoc {
        title: format!("{} - Attendance Summary", SCHOOL_TITLE),
        subtitle: generated_line(now),
        orientation: Orientation::Portrait,
        headers: vec!["Class".into(), "Present".into(), "Absent".into()],
        rows: rows
            .iter()
            .map(|r| vec![r.class_name.clone(), r.present.to_string(), r.absent.to_string()])
            .collect(),
    }
    .render()
}

pub fn incidents_pdf(rows: &[IncidentLine], now: DateTime<Utc>) -> anyhow::Result<Vec<u8>> {
    TableDoc {
        title: format!("{} - Incident Report Summary", SCHOOL_TITLE),
        subtitle: generated_line(now),
        orientation: Orientation::Portrait,
        headers: Vec::new(),
        rows: rows
            .iter()
            .map(|i| {
                let date = i
                    .date
                    .map(|d| d.format("%d %b %Y").to_string())
                    .unwrap_or_else(|| "N/A".to_string());
                vec![format!("{} - {} ({})", date, i.description, i.class_name)]
            })
            .collect(),
    }
    .render()
}

pub fn children_pdf(rows: &[RosterLine], now: DateTime<Utc>) -> anyhow::Result<Vec<u8>> {
    TableDoc {
        title: format!("{} - Children Roster", SCHOOL_TITLE),
        subtitle: generated_line(now),
        orientation: Orientation::Landscape,
        headers: vec!["Name".into(), "Class".into(), "Age".into(), "Guardian".into()],
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    r.full_name.clone(),
                    r.class_name.clone(),
                    r.age.to_string(),
                    r.guardian.clone(),
                ]
            })
            .collect(),
    }
    .render()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    AttendancePdf,
    IncidentsPdf,
    ChildrenPdf,
    FeeCsv,
}

impl ExportKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "attendancePdf" => Some(ExportKind::AttendancePdf),
            "incidentsPdf" => Some(ExportKind::IncidentsPdf),
            "childrenPdf" => Some(ExportKind::ChildrenPdf),
            "feeCsv" => Some(ExportKind::FeeCsv),
            _ => None,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ExportKind::AttendancePdf => "AttendanceReport.pdf",
            ExportKind::IncidentsPdf => "IncidentReports.pdf",
            ExportKind::ChildrenPdf => "ChildrenRoster.pdf",
            ExportKind::FeeCsv => "FeeCompliance.csv",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportKind::FeeCsv => "text/csv",
            _ => "application/pdf",
        }
    }

    pub fn render(self, conn: &Connection, now: DateTime<Utc>) -> anyhow::Result<Vec<u8>> {
        match self {
            ExportKind::AttendancePdf => attendance_pdf(&attendance_by_class(conn)?, now),
            ExportKind::IncidentsPdf => {
                incidents_pdf(&latest_incidents(conn, INCIDENT_EXPORT_LIMIT)?, now)
            }
            ExportKind::ChildrenPdf => {
                children_pdf(&children_roster(conn, now.date_naive())?, now)
            }
            ExportKind::FeeCsv => fee_compliance_csv(&fee_compliance(conn)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn.execute_batch(
            "INSERT INTO classes(id, name) VALUES (1, 'Sunflowers'), (2, 'Bumblebees');
             INSERT INTO parents(id, full_name, email) VALUES (1, 'Lerato Mokoena', 'l@x.org');
             INSERT INTO children(id, full_name, dob, class_id, parent_id) VALUES
               (1, 'Amo', '2021-05-01', 1, 1),
               (2, 'Bheki', NULL, 2, NULL),
               (3, 'Cebo', '2019-01-10', NULL, NULL);
             INSERT INTO attendance(child_id, recorded_at, att_date, status) VALUES
               (1, '2026-10-16T07:00:00Z', '2026-10-16', 'Present'),
               (1, '2026-10-17T07:00:00Z', '2026-10-17', 'Absent'),
               (2, '2026-10-17T07:00:00Z', '2026-10-17', 'late'),
               (3, '2026-10-17T07:00:00Z', '2026-10-17', 'Present');
             INSERT INTO payments(parent_id, child_id, month, amount, status, date_uploaded) VALUES
               (1, 1, 'October 2026', 500, 'Paid', '2026-10-02T08:00:00Z'),
               (1, 1, 'October 2026', 500, 'Pending', '2026-10-03T08:00:00Z'),
               (1, 1, 'October 2026', 500, 'Unpaid', '2026-10-04T08:00:00Z'),
               (NULL, NULL, '', 100, 'Paid', '2026-03-01T08:00:00Z');",
        )
        .expect("seed");
        conn
    }

    #[test]
    fn attendance_tallies_skip_unassigned_children() {
        let rows = attendance_by_class(&conn()).expect("rows");
        assert_eq!(
            rows,
            vec![
                ClassAttendance { class_name: "Bumblebees".into(), present: 0, absent: 0, late: 1 },
                ClassAttendance { class_name: "Sunflowers".into(), present: 1, absent: 1, late: 0 },
            ]
        );
    }

    #[test]
    fn compliance_truncates_percent_and_labels_blank_months() {
        let rows = fee_compliance(&conn()).expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].month, "October 2026");
        assert_eq!((rows[0].paid, rows[0].total, rows[0].percent), (1, 3, 33));
        assert_eq!(rows[1].month, "Unspecified");
        assert_eq!(rows[1].percent, 100);

        let csv = String::from_utf8(fee_compliance_csv(&rows).expect("csv")).expect("utf8");
        assert_eq!(csv, "Month,Paid,Total,Percent\nOctober 2026,1,3,33\nUnspecified,1,1,100\n");

        let quoted = fee_compliance_csv(&[FeeCompliance {
            month: "May, 2026".into(),
            paid: 0,
            total: 0,
            percent: 0,
        }])
        .expect("csv");
        assert!(String::from_utf8(quoted).expect("utf8").contains("\"May, 2026\",0,0,0"));
    }

    #[test]
    fn roster_ages_and_guardians() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).expect("date");
        let rows = children_roster(&conn(), today).expect("rows");
        let names: Vec<_> = rows.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, vec!["Bheki", "Amo", "Cebo"]);
        assert_eq!(rows[0].age, 0);
        assert_eq!(rows[1].age, 5);
        assert_eq!(rows[1].guardian, "Lerato Mokoena");
        assert_eq!(rows[2].class_name, "Unassigned");
        assert_eq!(rows[2].guardian, "Unknown");
    }

    #[test]
    fn dashboard_counts_money_and_trends() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).expect("date");
        let d = dashboard(&conn(), today).expect("dashboard");
        assert_eq!(d.total_children, 3);
        assert_eq!(d.present_today, 1);
        assert_eq!(d.todays_attendance.len(), 3);
        assert_eq!(d.outstanding_fees, 1000.0);
        assert_eq!(d.total_collected, 600.0);
        // The March upload falls outside the six-month window.
        assert_eq!(
            d.monthly,
            vec![MonthTotal { month: "Oct 2026".into(), total: 1500.0 }]
        );
        assert_eq!(
            d.attendance_trend,
            vec![
                DayPresent { date: "2026-10-16".into(), present: 1 },
                DayPresent { date: "2026-10-17".into(), present: 1 },
            ]
        );
    }

    #[test]
    fn exports_render_for_every_kind() {
        let conn = conn();
        let now = Utc::now();
        for kind in ["attendancePdf", "incidentsPdf", "childrenPdf", "feeCsv"] {
            let kind = ExportKind::parse(kind).expect("kind");
            let bytes = kind.render(&conn, now).expect("render");
            if kind == ExportKind::FeeCsv {
                assert!(bytes.starts_with(b"Month,Paid,Total,Percent"));
            } else {
                assert!(bytes.starts_with(b"%PDF-"));
            }
        }
        assert!(ExportKind::parse("xlsx").is_none());
    }
}
