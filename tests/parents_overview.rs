mod support;

use serde_json::json;
use support::{id_of, Sidecar};

#[test]
fn overview_totals_fees_paid_and_attendance_rate() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-parent-overview");
    let parent_id = id_of(
        &sidecar.ok("parents.create", json!({ "fullName": "Ayanda", "email": "ayanda@example.org" })),
        "parentId",
    );
    let a = id_of(
        &sidecar.ok("children.create", json!({ "fullName": "Kagiso", "parentId": parent_id })),
        "childId",
    );
    let b = id_of(
        &sidecar.ok("children.create", json!({ "fullName": "Lwazi", "parentId": parent_id })),
        "childId",
    );

    sidecar.ok("payments.generate", json!({ "month": "June 2026" }));
    let rows = sidecar.ok("payments.byMonth", json!({ "month": "June 2026" }));
    let first = rows[0]["paymentId"].as_i64().expect("payment id");
    sidecar.ok("payments.updateStatus", json!({ "id": first, "status": "Paid" }));

    sidecar.ok(
        "attendance.save",
        json!([
            { "childId": a, "status": "Present", "date": "2026-06-01" },
            { "childId": a, "status": "Absent", "date": "2026-06-02" },
            { "childId": b, "status": "Present", "date": "2026-06-01" }
        ]),
    );

    let overview = sidecar.ok("parents.overview", json!({ "parentId": parent_id }));
    assert_eq!(overview["totalChildren"], 2);
    assert_eq!(overview["totalFees"], 1200.0);
    assert_eq!(overview["totalPaid"], 600.0);
    assert_eq!(overview["balance"], 600.0);
    // 2 of 3 present.
    assert_eq!(overview["attendanceRate"], 66.7);

    let (code, _) = sidecar.fail("parents.overview", json!({ "parentId": 404 }));
    assert_eq!(code, "not_found");
}

#[test]
fn relinking_children_replaces_the_previous_set() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-parent-relink");
    let class_id = id_of(&sidecar.ok("classes.create", json!({ "name": "Pandas" })), "classId");
    let mut kid = |name: &str| {
        id_of(
            &sidecar.ok("children.create", json!({ "fullName": name, "classId": class_id })),
            "childId",
        )
    };
    let x = kid("Xolani");
    let y = kid("Yanga");
    let z = kid("Zinhle");

    let parent_id = id_of(
        &sidecar.ok(
            "parents.create",
            json!({ "fullName": "Nomsa", "email": "nomsa@example.org", "childIds": [x, y] }),
        ),
        "parentId",
    );
    let list = sidecar.ok("parents.list", json!({}));
    assert_eq!(list[0]["children"], "Xolani, Yanga");

    sidecar.ok(
        "parents.update",
        json!({ "parentId": parent_id, "fullName": "Nomsa", "email": "nomsa@example.org", "childIds": [z] }),
    );
    let children = sidecar.ok("parents.children", json!({ "parentId": parent_id }));
    let names: Vec<&str> = children
        .as_array()
        .expect("children")
        .iter()
        .filter_map(|c| c["fullName"].as_str())
        .collect();
    assert_eq!(names, vec!["Zinhle"]);
    assert_eq!(children[0]["className"], "Pandas");

    // Deleting the parent leaves the children in place, unlinked.
    sidecar.ok("parents.delete", json!({ "id": parent_id }));
    let all = sidecar.ok("children.list", json!({}));
    assert_eq!(all.as_array().expect("children").len(), 3);
    let list = sidecar.ok("parents.list", json!({}));
    assert!(list.as_array().expect("parents").is_empty());
}
