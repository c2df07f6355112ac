mod support;

use serde_json::json;
use support::{id_of, Sidecar};

fn seed(sidecar: &mut Sidecar) {
    let teacher_id = id_of(
        &sidecar.ok("teachers.create", json!({ "fullName": "Mr Sithole", "email": "sithole@example.org" })),
        "teacherId",
    );
    let class_id = id_of(
        &sidecar.ok("classes.create", json!({ "name": "Giraffes", "teacherId": teacher_id })),
        "classId",
    );
    let parent_id = id_of(
        &sidecar.ok("parents.create", json!({ "fullName": "Palesa", "email": "palesa@example.org" })),
        "parentId",
    );
    let child_id = id_of(
        &sidecar.ok(
            "children.create",
            json!({ "fullName": "Karabo", "classId": class_id, "parentId": parent_id, "dob": "2022-01-15" }),
        ),
        "childId",
    );
    sidecar.ok("attendance.save", json!([{ "childId": child_id, "status": "Present" }]));
    sidecar.ok("payments.generate", json!({}));
    sidecar.ok(
        "incidents.create",
        json!({ "type": "Illness", "description": "Fever after lunch", "childId": child_id, "classId": class_id, "teacherId": teacher_id }),
    );
}

#[test]
fn dashboard_and_summary_reflect_seeded_data() {
    let (mut sidecar, _ws) = Sidecar::with_workspace("tlinky-reports-summary");
    seed(&mut sidecar);

    let dashboard = sidecar.ok("dashboard.summary", json!({}));
    assert_eq!(dashboard["totalChildren"], 1);
    assert_eq!(dashboard["totalTeachers"], 1);
    assert_eq!(dashboard["totalParents"], 1);
    assert_eq!(dashboard["presentToday"], 1);
    assert_eq!(dashboard["attendanceTrend"].as_array().expect("trend").len(), 1);
    assert_eq!(dashboard["outstandingFees"], 650.0);

    let summary = sidecar.ok("reports.summary", json!({}));
    assert_eq!(summary["attendanceSummary"][0]["className"], "Giraffes");
    assert_eq!(summary["attendanceSummary"][0]["present"], 1);
    assert_eq!(summary["incidentSummary"][0]["description"], "Fever after lunch");
    assert_eq!(summary["incidentSummary"][0]["className"], "Giraffes");
    assert_eq!(summary["paymentsByMonth"][0]["paid"], 0);
    assert_eq!(summary["paymentsByMonth"][0]["total"], 1);
    assert_eq!(summary["children"][0]["fullName"], "Karabo");
    assert_eq!(summary["children"][0]["guardian"], "Palesa");
}

#[test]
fn exports_write_pdf_and_csv_files() {
    let (mut sidecar, workspace) = Sidecar::with_workspace("tlinky-reports-export");
    seed(&mut sidecar);

    for (kind, file) in [
        ("attendancePdf", "out/attendance.pdf"),
        ("incidentsPdf", "out/incidents.pdf"),
        ("childrenPdf", "out/children.pdf"),
    ] {
        let out = workspace.join(file);
        let result = sidecar.ok(
            "reports.export",
            json!({ "kind": kind, "outPath": out.to_string_lossy() }),
        );
        assert_eq!(result["contentType"], "application/pdf");
        let bytes = std::fs::read(&out).expect("read export");
        assert!(bytes.starts_with(b"%PDF-"), "{} is not a pdf", kind);
        assert_eq!(result["bytes"], bytes.len());
    }

    let out = workspace.join("out/fees.csv");
    let result = sidecar.ok(
        "reports.export",
        json!({ "kind": "feeCsv", "outPath": out.to_string_lossy() }),
    );
    assert_eq!(result["fileName"], "FeeCompliance.csv");
    let csv = std::fs::read_to_string(&out).expect("read csv");
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Month,Paid,Total,Percent"));
    assert!(lines.next().expect("row").ends_with(",0,1,0"));

    let (code, _) = sidecar.fail(
        "reports.export",
        json!({ "kind": "spreadsheet", "outPath": out.to_string_lossy() }),
    );
    assert_eq!(code, "bad_params");
}
