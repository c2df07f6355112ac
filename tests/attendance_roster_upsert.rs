mod support;

use serde_json::json;
use support::{id_of, Sidecar};

fn seed_class(sidecar: &mut Sidecar, name: &str, children: &[&str]) -> (i64, Vec<i64>) {
    let class_id = id_of(&sidecar.ok("classes.create", json!({ "name": name })), "classId");
    let ids = children
        .iter()
        .map(|n| {
            id_of(
                &sidecar.ok("children.create", json!({ "fullName": n, "classId": class_id })),
                "childId",
            )
        })
        .collect();
    (class_id, ids)
}

#[test]
fn roster_defaults_unrecorded_children_to_present() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-roster-defaults");
    let (class_id, ids) = seed_class(&mut sidecar, "Daisies", &["Zola", "Amo"]);
    let (_, others) = seed_class(&mut sidecar, "Tulips", &["Kea"]);

    sidecar.ok(
        "attendance.save",
        json!({ "records": [{ "childId": ids[0], "status": "Absent", "notes": "flu", "date": "2026-03-02" }] }),
    );

    let roster = sidecar.ok(
        "attendance.roster",
        json!({ "date": "2026-03-02", "classId": class_id }),
    );
    assert_eq!(roster["count"], 2);
    let rows = roster["data"].as_array().expect("rows");
    // Name order.
    assert_eq!(rows[0]["childName"], "Amo");
    assert_eq!(rows[0]["status"], "Present");
    assert!(rows[0]["attendanceId"].is_null());
    assert_eq!(rows[1]["childName"], "Zola");
    assert_eq!(rows[1]["status"], "Absent");
    assert_eq!(rows[1]["notes"], "flu");
    assert!(rows[1]["attendanceId"].as_i64().is_some());

    let everyone = sidecar.ok("attendance.roster", json!({ "date": "2026-03-02" }));
    assert_eq!(everyone["count"], 3);
    assert!(everyone["data"]
        .as_array()
        .expect("rows")
        .iter()
        .any(|r| r["childId"] == others[0]));

    let other_day = sidecar.ok(
        "attendance.roster",
        json!({ "date": "2026-03-03", "classId": class_id }),
    );
    assert!(other_day["data"]
        .as_array()
        .expect("rows")
        .iter()
        .all(|r| r["status"] == "Present" && r["attendanceId"].is_null()));
}

#[test]
fn saving_twice_for_the_same_day_keeps_one_row() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-attendance-upsert");
    let (class_id, ids) = seed_class(&mut sidecar, "Daisies", &["Zola"]);
    let child = ids[0];

    sidecar.ok(
        "attendance.save",
        json!([{ "childId": child, "status": "Absent", "date": "2026-03-02T07:30:00Z" }]),
    );
    let second = sidecar.ok(
        "attendance.save",
        json!([{ "childId": child, "status": "Late", "notes": "bus", "date": "2026-03-02T08:15:00Z" }]),
    );
    assert_eq!(second["saved"], 1);

    let roster = sidecar.ok(
        "attendance.roster",
        json!({ "date": "2026-03-02", "classId": class_id }),
    );
    assert_eq!(roster["data"][0]["status"], "Late");
    assert_eq!(roster["data"][0]["notes"], "bus");

    let all = sidecar.ok("attendance.list", json!({}));
    assert_eq!(all.as_array().expect("list").len(), 1);

    // A different calendar day is a separate record.
    sidecar.ok(
        "attendance.save",
        json!([{ "childId": child, "status": "Present", "date": "2026-03-03" }]),
    );
    let all = sidecar.ok("attendance.list", json!({}));
    assert_eq!(all.as_array().expect("list").len(), 2);
}

#[test]
fn save_rejects_bad_batches_atomically() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-attendance-reject");
    let (_, ids) = seed_class(&mut sidecar, "Daisies", &["Zola"]);

    let (code, message) = sidecar.fail("attendance.save", json!([]));
    assert_eq!(code, "bad_params");
    assert_eq!(message, "No attendance data received.");

    let (code, _) = sidecar.fail(
        "attendance.save",
        json!([
            { "childId": ids[0], "status": "Present", "date": "2026-03-02" },
            { "childId": ids[0], "status": "Sick", "date": "2026-03-03" }
        ]),
    );
    assert_eq!(code, "bad_params");
    let all = sidecar.ok("attendance.list", json!({}));
    assert!(all.as_array().expect("list").is_empty());

    let (code, _) = sidecar.fail(
        "attendance.save",
        json!([{ "childId": 9999, "status": "Present" }]),
    );
    assert_eq!(code, "bad_params");

    // Rows without a child are skipped.
    let skipped = sidecar.ok(
        "attendance.save",
        json!([{ "childId": 0, "status": "Present" }, { "childId": ids[0], "status": "Late" }]),
    );
    assert_eq!(skipped["saved"], 1);
}

#[test]
fn history_and_summary_report_saved_records() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-attendance-history");
    let (class_id, ids) = seed_class(&mut sidecar, "Daisies", &["Zola", "Amo"]);

    let today = chrono::Utc::now().date_naive();
    let yesterday = today - chrono::Duration::days(1);
    sidecar.ok(
        "attendance.save",
        json!([
            { "childId": ids[0], "status": "Present", "date": yesterday.to_string() },
            { "childId": ids[0], "status": "Late", "date": today.to_string() },
            { "childId": ids[1], "status": "Present", "date": today.to_string() }
        ]),
    );

    let history = sidecar.ok("attendance.childHistory", json!({ "childId": ids[0], "days": 7 }));
    assert_eq!(history["total"], 2);
    assert_eq!(history["data"][0]["status"], "Late");

    let summary = sidecar.ok("attendance.summary", json!({ "classId": class_id }));
    assert_eq!(summary["totalChildren"], 2);
    assert_eq!(summary["presentCount"], 1);
}

#[test]
fn roster_queries_normalize_timestamps_like_saves() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-attendance-offsets");
    let (class_id, ids) = seed_class(&mut sidecar, "Daisies", &["Zola"]);
    let child = ids[0];

    // 23:30 at -05:00 is already the next day in UTC.
    let evening = "2026-03-02T23:30:00-05:00";
    sidecar.ok(
        "attendance.save",
        json!([{ "childId": child, "status": "Late", "date": evening }]),
    );

    let roster = sidecar.ok("attendance.roster", json!({ "date": evening, "classId": class_id }));
    assert_eq!(roster["data"][0]["date"], "2026-03-03");
    assert_eq!(roster["data"][0]["status"], "Late");
    assert!(roster["data"][0]["attendanceId"].as_i64().is_some());

    let by_day = sidecar.ok("attendance.roster", json!({ "date": "2026-03-03", "classId": class_id }));
    assert_eq!(by_day["data"][0]["status"], "Late");
    let day_before = sidecar.ok("attendance.roster", json!({ "date": "2026-03-02", "classId": class_id }));
    assert_eq!(day_before["data"][0]["status"], "Present");
    assert!(day_before["data"][0]["attendanceId"].is_null());

    // Naive times are read in server-local time on both paths.
    let naive = "2026-03-05 10:00";
    sidecar.ok(
        "attendance.save",
        json!([{ "childId": child, "status": "Absent", "date": naive }]),
    );
    let roster = sidecar.ok("attendance.roster", json!({ "date": naive, "classId": class_id }));
    assert_eq!(roster["data"][0]["status"], "Absent");

    let (code, _) = sidecar.fail("attendance.roster", json!({ "date": "yesterday-ish" }));
    assert_eq!(code, "bad_params");
}

#[test]
fn history_window_rejects_out_of_range_days() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-attendance-window");
    let (_, ids) = seed_class(&mut sidecar, "Daisies", &["Zola"]);
    sidecar.ok(
        "attendance.save",
        json!([{ "childId": ids[0], "status": "Present" }]),
    );

    for days in [json!(9_000_000_000_000_000_i64), json!(-1), json!("9223372036854775807")] {
        let (code, message) = sidecar.fail(
            "attendance.childHistory",
            json!({ "childId": ids[0], "days": days }),
        );
        assert_eq!(code, "bad_params");
        assert!(message.starts_with("days out of range"), "{}", message);
    }

    // Still serving after the rejected requests.
    let history = sidecar.ok(
        "attendance.childHistory",
        json!({ "childId": ids[0], "days": 36500 }),
    );
    assert_eq!(history["total"], 1);
    let health = sidecar.ok("health", json!({}));
    assert_eq!(health["dbOpen"], true);
}
