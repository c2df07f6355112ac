mod support;

use chrono::{Months, NaiveDate, Utc};
use serde_json::json;
use support::{id_of, Sidecar};

fn years_ago(years: u32) -> NaiveDate {
    let today = Utc::now().date_naive();
    // A month past the birthday keeps the age stable for the whole test run.
    today
        .checked_sub_months(Months::new(years * 12 + 1))
        .expect("date")
}

#[test]
fn generate_prices_each_child_by_age_band() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-payments-generate");
    sidecar.ok(
        "settings.updateFees",
        json!({ "toddlerFee": 500, "preschoolFee": 650, "baseMonthlyFee": 600 }),
    );
    let parent_id = id_of(
        &sidecar.ok(
            "parents.create",
            json!({ "fullName": "Thandi Mokoena", "email": "thandi@example.org", "password": "pw" }),
        ),
        "parentId",
    );
    let mut child = |name: &str, dob: Option<NaiveDate>| {
        id_of(
            &sidecar.ok(
                "children.create",
                json!({ "fullName": name, "parentId": parent_id, "dob": dob.map(|d| d.to_string()) }),
            ),
            "childId",
        )
    };
    child("Ada", Some(years_ago(2)));
    child("Ben", Some(years_ago(5)));
    child("Cal", Some(years_ago(10)));
    child("Dee", None);

    let generated = sidecar.ok("payments.generate", json!({ "month": "March 2026" }));
    assert_eq!(generated["count"], 4);
    assert_eq!(generated["message"], "Payments generated for March 2026");

    let rows = sidecar.ok("payments.byMonth", json!({ "month": "March 2026" }));
    let rows = rows.as_array().expect("rows");
    assert_eq!(rows.len(), 4);
    let amount_for = |name: &str| {
        rows.iter()
            .find(|r| r["childName"] == name)
            .and_then(|r| r["amount"].as_f64())
            .expect("amount")
    };
    assert_eq!(amount_for("Ada"), 500.0);
    assert_eq!(amount_for("Ben"), 650.0);
    assert_eq!(amount_for("Cal"), 600.0);
    assert_eq!(amount_for("Dee"), 600.0);
    assert!(rows.iter().all(|r| r["status"] == "Pending"));

    // Regenerating replaces the month rather than doubling it.
    sidecar.ok("payments.generate", json!({ "month": "March 2026" }));
    let rows = sidecar.ok("payments.byMonth", json!({ "month": "March 2026" }));
    assert_eq!(rows.as_array().expect("rows").len(), 4);
    let other = sidecar.ok("payments.byMonth", json!({ "month": "April 2026" }));
    assert!(other.as_array().expect("rows").is_empty());
}

#[test]
fn generate_without_active_children_is_rejected() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-payments-empty");
    let (code, message) = sidecar.fail("payments.generate", json!({ "month": "March 2026" }));
    assert_eq!(code, "bad_params");
    assert_eq!(message, "No active children found.");
}

#[test]
fn proof_upload_and_status_changes_flow_to_parent_totals() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-payments-proof");
    let parent_id = id_of(
        &sidecar.ok(
            "parents.create",
            json!({ "fullName": "Sipho Ndlovu", "email": "sipho@example.org" }),
        ),
        "parentId",
    );
    sidecar.ok("children.create", json!({ "fullName": "Lulu", "parentId": parent_id }));
    sidecar.ok("children.create", json!({ "fullName": "Nandi", "parentId": parent_id }));
    sidecar.ok("payments.generate", json!({ "month": "May 2026" }));

    let rows = sidecar.ok("payments.byMonth", json!({ "month": "May 2026" }));
    let ids: Vec<i64> = rows
        .as_array()
        .expect("rows")
        .iter()
        .map(|r| r["paymentId"].as_i64().expect("id"))
        .collect();
    assert_eq!(ids.len(), 2);

    let attached = sidecar.ok(
        "payments.attachProof",
        json!({ "id": ids[0], "proofUrl": "https://img.example/proof.png" }),
    );
    assert_eq!(attached["status"], "Pending");
    assert_eq!(attached["proofUrl"], "https://img.example/proof.png");

    let latest = sidecar.ok("notifications.latest", json!({}));
    assert_eq!(latest[0]["type"], "Payment");
    assert_eq!(
        latest[0]["message"],
        "Payment proof uploaded: R600.00 from Sipho Ndlovu"
    );

    sidecar.ok("payments.updateStatus", json!({ "id": ids[0], "status": "Approved" }));
    let (code, _) = sidecar.fail("payments.updateStatus", json!({ "id": ids[1], "status": "Lost" }));
    assert_eq!(code, "bad_params");
    let (code, _) = sidecar.fail("payments.updateStatus", json!({ "id": 9999, "status": "Paid" }));
    assert_eq!(code, "not_found");

    let by_parent = sidecar.ok("payments.byParent", json!({ "parentId": parent_id }));
    assert_eq!(by_parent["totalFees"], 1200.0);
    assert_eq!(by_parent["totalPaid"], 600.0);
    assert_eq!(by_parent["balance"], 600.0);
    assert_eq!(by_parent["payments"].as_array().expect("payments").len(), 2);

    sidecar.ok("payments.delete", json!({ "id": ids[1] }));
    let by_parent = sidecar.ok("payments.byParent", json!({ "parentId": parent_id }));
    assert_eq!(by_parent["totalFees"], 600.0);
    assert_eq!(by_parent["balance"], 0.0);
}
