use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

pub const UNASSIGNED_CLASS: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "late" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RosterChild {
    pub child_id: i64,
    pub child_name: String,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SavedAttendance {
    pub attendance_id: i64,
    pub child_id: i64,
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    pub child_id: i64,
    pub child_name: String,
    pub class_name: String,
    pub date: String,
    pub status: String,
    pub notes: String,
    pub attendance_id: Option<i64>,
}

/// One row per child, name ascending. Children without a saved record for the
/// day default to Present with no record id.
pub fn reconcile(
    children: &[RosterChild],
    saved: &[SavedAttendance],
    date: NaiveDate,
) -> Vec<RosterRow> {
    let mut by_child: HashMap<i64, &SavedAttendance> = HashMap::new();
    for rec in saved {
        by_child.entry(rec.child_id).or_insert(rec);
    }

    let date_label = date.format("%Y-%m-%d").to_string();
    let mut rows: Vec<RosterRow> = children
        .iter()
        .map(|c| {
            let rec = by_child.get(&c.child_id);
            RosterRow {
                child_id: c.child_id,
                child_name: c.child_name.clone(),
                class_name: c
                    .class_name
                    .clone()
                    .unwrap_or_else(|| UNASSIGNED_CLASS.to_string()),
                date: date_label.clone(),
                status: rec
                    .map(|r| r.status.clone())
                    .unwrap_or_else(|| AttendanceStatus::Present.as_str().to_string()),
                notes: rec.and_then(|r| r.notes.clone()).unwrap_or_default(),
                attendance_id: rec.map(|r| r.attendance_id),
            }
        })
        .collect();
    rows.sort_by(|a, b| a.child_name.cmp(&b.child_name));
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised date/time: {0}")]
pub struct BadTimestamp(pub String);

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Normalizes an incoming timestamp to UTC.
///
/// - explicit offset (`Z`, `+02:00`): converted to UTC
/// - no offset: read as server-local time, then converted
/// - date only: that calendar day at 00:00 UTC
pub fn normalize_timestamp(raw: &str) -> Result<DateTime<Utc>, BadTimestamp> {
    let t = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(t, fmt) {
            return Ok(local_to_utc(naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(BadTimestamp(t.to_string()))
}

fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Skipped by a DST transition; nothing sensible to map to.
        None => naive.and_utc(),
    }
}

/// Calendar day a roster query is for. Timestamps go through the same UTC
/// normalization as saved records; missing means today (UTC).
pub fn target_date(raw: Option<&str>, today: NaiveDate) -> Result<NaiveDate, BadTimestamp> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(today);
    };
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    Ok(normalize_timestamp(raw)?.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(id: i64, name: &str, class: Option<&str>) -> RosterChild {
        RosterChild {
            child_id: id,
            child_name: name.to_string(),
            class_name: class.map(|s| s.to_string()),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 24).expect("date")
    }

    #[test]
    fn empty_day_yields_default_roster() {
        let children = vec![child(2, "Zola", Some("Bees")), child(1, "Amahle", None)];
        let rows = reconcile(&children, &[], day());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].child_name, "Amahle");
        assert_eq!(rows[0].class_name, UNASSIGNED_CLASS);
        for r in &rows {
            assert_eq!(r.status, "Present");
            assert_eq!(r.notes, "");
            assert_eq!(r.attendance_id, None);
            assert_eq!(r.date, "2025-10-24");
        }
    }

    #[test]
    fn saved_records_are_surfaced_per_child() {
        let children = vec![child(1, "Amahle", Some("Bees")), child(2, "Zola", Some("Bees"))];
        let saved = vec![SavedAttendance {
            attendance_id: 40,
            child_id: 2,
            status: "Late".to_string(),
            notes: Some("bus".to_string()),
        }];
        let rows = reconcile(&children, &saved, day());
        assert_eq!(rows[0].attendance_id, None);
        assert_eq!(rows[1].status, "Late");
        assert_eq!(rows[1].notes, "bus");
        assert_eq!(rows[1].attendance_id, Some(40));
    }

    #[test]
    fn records_for_children_out_of_scope_are_ignored() {
        let children = vec![child(1, "Amahle", Some("Bees"))];
        let saved = vec![SavedAttendance {
            attendance_id: 9,
            child_id: 77,
            status: "Absent".to_string(),
            notes: None,
        }];
        let rows = reconcile(&children, &saved, day());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "Present");
    }

    #[test]
    fn offsets_are_converted_to_utc() {
        let ts = normalize_timestamp("2025-10-24T01:30:00+02:00").expect("parse");
        assert_eq!(ts.to_rfc3339(), "2025-10-23T23:30:00+00:00");
        let ts = normalize_timestamp("2025-10-24T07:00:00Z").expect("parse");
        assert_eq!(ts.date_naive(), day());
    }

    #[test]
    fn date_only_keeps_calendar_day() {
        let ts = normalize_timestamp("2025-10-24").expect("parse");
        assert_eq!(ts.date_naive(), day());
    }

    #[test]
    fn naive_times_are_read_as_local() {
        let ts = normalize_timestamp("2025-10-24T12:00:00").expect("parse");
        let naive = NaiveDate::from_ymd_opt(2025, 10, 24)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("naive");
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .expect("local")
            .with_timezone(&Utc);
        assert_eq!(ts, expected);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(normalize_timestamp("yesterday").is_err());
        assert!(target_date(Some("not-a-date"), day()).is_err());
    }

    #[test]
    fn target_date_follows_utc_normalization() {
        assert_eq!(target_date(None, day()).expect("default"), day());
        assert_eq!(target_date(Some(""), day()).expect("blank"), day());
        let d = |m, dd| NaiveDate::from_ymd_opt(2026, m, dd).expect("date");
        assert_eq!(target_date(Some("2026-03-02"), day()).expect("date only"), d(3, 2));
        assert_eq!(
            target_date(Some("2026-03-02T15:00:00Z"), day()).expect("utc"),
            d(3, 2)
        );
        assert_eq!(
            target_date(Some("2026-03-02T23:30:00-05:00"), day()).expect("offset"),
            d(3, 3)
        );
        let naive = "2026-03-02 10:00";
        assert_eq!(
            target_date(Some(naive), day()).expect("naive"),
            normalize_timestamp(naive).expect("normalize").date_naive()
        );
        assert!(target_date(Some("2026-13-40T00:00:00Z"), day()).is_err());
    }

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!(AttendanceStatus::parse("late"), Some(AttendanceStatus::Late));
        assert_eq!(AttendanceStatus::parse(" ABSENT "), Some(AttendanceStatus::Absent));
        assert_eq!(AttendanceStatus::parse("sick"), None);
    }
}
