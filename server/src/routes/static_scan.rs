//! `GET /static_scan?report=bool`.

use std::io::Write;

use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;

use lanwarden_core::static_scan::run_all;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StaticScanQuery {
    pub report: Option<bool>,
}

pub async fn static_scan(
    data: web::Data<AppState>,
    query: web::Query<StaticScanQuery>,
) -> HttpResponse {
    let want_report = query.report.unwrap_or(false);

    let scan = run_all(&data.probes, data.probe_timeout);
    let report = match tokio::time::timeout(data.static_scan_global_timeout, scan).await {
        Ok(report) => report,
        Err(_) => {
            return HttpResponse::build(StatusCode::GATEWAY_TIMEOUT)
                .json(json!({ "status": "timeout" }));
        }
    };

    let report_path = if want_report {
        match write_report(&data.reports_dir, &report) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("static scan: failed to write report file: {e}");
                None
            }
        }
    } else {
        None
    };

    let mut body = json!({
        "status": "ok",
        "findings": report.findings,
        "risk_score": report.risk_score,
    });
    if let Some(path) = report_path {
        body["report_path"] = json!(path);
    }
    HttpResponse::Ok().json(body)
}

/// Writes the report as JSON (PDF rendering is an injected external
/// collaborator, out of scope here) and returns the path written.
fn write_report(
    dir: &std::path::Path,
    report: &lanwarden_core::static_scan::StaticScanReport,
) -> std::io::Result<String> {
    std::fs::create_dir_all(dir)?;
    let stamp = OffsetDateTime::now_utc().unix_timestamp();
    let path = dir.join(format!("static-scan-{stamp}.json"));
    let mut file = std::fs::File::create(&path)?;
    file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;
    Ok(path.to_string_lossy().to_string())
}
