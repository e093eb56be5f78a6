//! `/scan/dynamic/*` (and its hyphen/underscore aliases) plus the DNS
//! history endpoint.

use std::collections::HashSet;
use std::time::Duration;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::Date;

use lanwarden_core::report;
use lanwarden_core::scheduler::{ScanParams, StartOutcome, StopOutcome};
use lanwarden_core::store::HistoryFilter;

use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    pub interface: Option<String>,
    pub duration: Option<u64>,
    pub approved_macs: Option<Vec<String>>,
    pub interval: Option<u64>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

/// `POST /scan/dynamic/start`. A missing body is treated as all-defaults.
pub async fn start(
    data: web::Data<AppState>,
    body: Option<web::Json<StartRequest>>,
) -> HttpResponse {
    let body = body.map(web::Json::into_inner).unwrap_or_default();

    let mut params = ScanParams::default();
    params.interface = body.interface;
    if let Some(secs) = body.duration {
        params.duration = Duration::from_secs(secs);
    }
    if let Some(secs) = body.interval {
        params.interval = Duration::from_secs(secs);
    }
    params.approved_macs = body
        .approved_macs
        .map(|macs| macs.into_iter().map(|m| m.to_lowercase()).collect::<HashSet<_>>());

    let status = match data.scheduler.start(params).await {
        StartOutcome::Scheduled => "scheduled",
        StartOutcome::AlreadyRunning => "already_running",
    };
    HttpResponse::Ok().json(StatusResponse { status })
}

/// `POST /scan/dynamic/stop`. Idempotent.
pub async fn stop(data: web::Data<AppState>) -> HttpResponse {
    let StopOutcome::Stopped = data.scheduler.stop().await;
    HttpResponse::Ok().json(StatusResponse { status: "stopped" })
}

/// `GET /scan/dynamic/results`: risk score + category breakdown over the
/// Store's bounded recent buffer.
pub async fn results(data: web::Data<AppState>) -> HttpResponse {
    let recent = data.store.get_recent();
    HttpResponse::Ok().json(report::aggregate(&recent))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub device: Option<String>,
    pub protocol: Option<String>,
}

/// `GET /scan/dynamic/history`: missing fields widen the query.
pub async fn history(
    data: web::Data<AppState>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner();
    let filter = HistoryFilter {
        start: q.start,
        end: q.end,
        device: q.device,
        protocol: q.protocol,
    };
    let findings = data.store.fetch_history(filter).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "results": findings })))
}

#[derive(Debug, Deserialize)]
pub struct DnsHistoryQuery {
    pub start: String,
    pub end: String,
}

fn parse_date(s: &str) -> Option<Date> {
    let fmt = format_description!("[year]-[month]-[day]");
    Date::parse(s, &fmt).ok()
}

/// `GET /dynamic-scan/dns-history?start=YYYY-MM-DD&end=YYYY-MM-DD`.
pub async fn dns_history(
    data: web::Data<AppState>,
    query: web::Query<DnsHistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner();
    if parse_date(&q.start).is_none() || parse_date(&q.end).is_none() {
        return Err(ApiError::Validation(
            "start and end must be YYYY-MM-DD".to_string(),
        ));
    }
    let rows = data.store.fetch_dns_history(q.start, q.end).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "history": rows })))
}
