use std::sync::Arc;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse, Responder, get, post, put, web};
use serde::{Deserialize, Serialize};

use crate::app::services::{PortCommandHandler, PortQueryHandler, ServiceError, SqlitePortService};
use crate::domain::models::{
    ChargeSession, NewChargeSessionRecord, NewPortRecord, PortStatus, Timestamp, parse_iso8601,
    to_iso8601,
};
use crate::domain::port_analytics::{
    Clock, PortDetail, PortSummary, WindowCounts, aggregate_at, aggregate_one,
};

#[derive(Clone)]
pub struct ApiState {
    pub ports: SqlitePortService,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowCountsResponse {
    pub last_day: u32,
    pub last_7_days: u32,
    pub last_30_days: u32,
}

impl From<WindowCounts> for WindowCountsResponse {
    fn from(counts: WindowCounts) -> Self {
        Self {
            last_day: counts.last_day,
            last_7_days: counts.last_7_days,
            last_30_days: counts.last_30_days,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortSummaryResponse {
    pub port_id: String,
    pub station_id: String,
    pub status: &'static str,
    pub last_ping: Option<String>,
    pub reported_at: Option<String>,
    #[serde(rename = "costPerKWh")]
    pub cost_per_kwh: f64,
    pub avg_time_to_charge_minutes: f64,
    pub session_count: usize,
    #[serde(rename = "totalEnergyConsumedKWh")]
    pub total_energy_consumed_kwh: f64,
    #[serde(rename = "averageEnergyConsumedKWh")]
    pub average_energy_consumed_kwh: Option<f64>,
    pub traffic_windows: WindowCountsResponse,
    pub fault_counts: WindowCountsResponse,
}

impl From<PortSummary> for PortSummaryResponse {
    fn from(summary: PortSummary) -> Self {
        Self {
            port_id: summary.port_id,
            station_id: summary.station_id,
            status: summary.status.as_str(),
            last_ping: summary.last_ping.as_ref().map(to_iso8601),
            reported_at: summary.reported_at.as_ref().map(to_iso8601),
            cost_per_kwh: summary.cost_per_kwh,
            avg_time_to_charge_minutes: summary.avg_time_to_charge_minutes,
            session_count: summary.session_count,
            total_energy_consumed_kwh: summary.total_energy_consumed_kwh,
            average_energy_consumed_kwh: summary.average_energy_consumed_kwh,
            traffic_windows: summary.traffic_windows.into(),
            fault_counts: summary.fault_counts.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub vehicle_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration_minutes: f64,
    pub charged_percent: f64,
    #[serde(rename = "energyConsumedKWh")]
    pub energy_consumed_kwh: f64,
    pub electricity_cost: f64,
    pub user_rating: Option<f64>,
    pub review: Option<String>,
}

impl From<&ChargeSession> for SessionResponse {
    fn from(session: &ChargeSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            vehicle_id: session.vehicle_id.clone(),
            start_time: session.start_time.as_ref().map(to_iso8601),
            end_time: session.end_time.as_ref().map(to_iso8601),
            duration_minutes: session.duration_minutes,
            charged_percent: session.charged_percent,
            energy_consumed_kwh: session.energy_consumed_kwh,
            electricity_cost: session.electricity_cost,
            user_rating: session.user_rating,
            review: session.review.clone(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortDetailResponse {
    pub port_id: String,
    pub station_id: String,
    pub status: &'static str,
    pub last_ping: Option<String>,
    pub reported_at: Option<String>,
    #[serde(rename = "costPerKWh")]
    pub cost_per_kwh: f64,
    pub avg_time_to_charge_minutes: f64,
    #[serde(rename = "totalEnergyConsumedKWh")]
    pub total_energy_consumed_kwh: f64,
    #[serde(rename = "averageEnergyConsumedKWh")]
    pub average_energy_consumed_kwh: Option<f64>,
    pub latest_session: Option<SessionResponse>,
    pub sessions: Vec<SessionResponse>,
}

impl From<PortDetail> for PortDetailResponse {
    fn from(detail: PortDetail) -> Self {
        let latest_session = detail.latest_session().map(SessionResponse::from);
        let sessions: Vec<SessionResponse> =
            detail.sessions.iter().map(SessionResponse::from).collect();

        Self {
            port_id: detail.port_id,
            station_id: detail.station_id,
            status: detail.status.as_str(),
            last_ping: detail.last_ping.as_ref().map(to_iso8601),
            reported_at: detail.reported_at.as_ref().map(to_iso8601),
            cost_per_kwh: detail.cost_per_kwh,
            avg_time_to_charge_minutes: detail.avg_time_to_charge_minutes,
            total_energy_consumed_kwh: detail.total_energy_consumed_kwh,
            average_energy_consumed_kwh: detail.average_energy_consumed_kwh,
            latest_session,
            sessions,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePortRequest {
    pub port_id: Option<String>,
    pub station_id: String,
    pub status: Option<String>,
    #[serde(rename = "costPerKWh")]
    pub cost_per_kwh: f64,
    pub avg_time_to_charge_minutes: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub session_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: Option<f64>,
    pub charged_percent: f64,
    #[serde(rename = "energyConsumedKWh")]
    pub energy_consumed_kwh: f64,
    pub electricity_cost: f64,
    pub user_rating: Option<f64>,
    pub review: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusReportRequest {
    pub status: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_payload_error))
        .service(health)
        .service(list_port_summaries_endpoint)
        .service(get_port_detail_endpoint)
        .service(create_port_endpoint)
        .service(append_session_endpoint)
        .service(report_status_endpoint);
}

#[get("/health")]
async fn health(state: web::Data<ApiState>) -> impl Responder {
    match state.ports.get_schema_version() {
        Ok(schema_version) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "schemaVersion": schema_version
        })),
        Err(error) => service_error_response(error),
    }
}

#[get("/admin/ports")]
async fn list_port_summaries_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let ports = match state.ports.fetch_all_ports() {
        Ok(ports) => ports,
        Err(error) => return service_error_response(error),
    };

    if ports.is_empty() {
        return no_data_response();
    }

    let summaries: Vec<PortSummaryResponse> = aggregate_at(ports, state.clock.as_ref())
        .into_iter()
        .map(PortSummaryResponse::from)
        .collect();

    HttpResponse::Ok().json(DataResponse { data: summaries })
}

#[get("/admin/ports/{port_id}")]
async fn get_port_detail_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let port_id = path.into_inner();

    match state.ports.fetch_port(&port_id) {
        Ok(Some(port)) => HttpResponse::Ok().json(DataResponse {
            data: PortDetailResponse::from(aggregate_one(port)),
        }),
        Ok(None) => port_not_found_response(&port_id),
        Err(error) => service_error_response(error),
    }
}

#[post("/admin/ports")]
async fn create_port_endpoint(
    state: web::Data<ApiState>,
    body: web::Json<CreatePortRequest>,
) -> impl Responder {
    let new_port = match new_port_from_request(body.into_inner(), state.clock.now()) {
        Ok(new_port) => new_port,
        Err(message) => return bad_request_response(message),
    };

    match state.ports.create_port(&new_port) {
        Ok(()) => HttpResponse::Created().json(DataResponse {
            data: serde_json::json!({ "portId": new_port.port_id }),
        }),
        Err(error) => service_error_response(error),
    }
}

#[post("/admin/ports/{port_id}/sessions")]
async fn append_session_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
    body: web::Json<CreateSessionRequest>,
) -> impl Responder {
    let port_id = path.into_inner();
    let new_session = match new_session_from_request(body.into_inner()) {
        Ok(new_session) => new_session,
        Err(message) => return bad_request_response(message),
    };

    match state.ports.append_session(&port_id, new_session) {
        Ok(session) => HttpResponse::Created().json(DataResponse {
            data: SessionResponse::from(&session),
        }),
        Err(error) => service_error_response(error),
    }
}

#[put("/admin/ports/{port_id}/status")]
async fn report_status_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
    body: web::Json<StatusReportRequest>,
) -> impl Responder {
    let port_id = path.into_inner();
    let status = match body.status.parse::<PortStatus>() {
        Ok(status) => status,
        Err(error) => return bad_request_response(error.to_string()),
    };

    match state
        .ports
        .report_status(&port_id, status, &state.clock.now())
    {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(error) => service_error_response(error),
    }
}

fn new_port_from_request(request: CreatePortRequest, now: Timestamp) -> Result<NewPortRecord, String> {
    let station_id = request.station_id.trim().to_string();
    if station_id.is_empty() {
        return Err("stationId must not be empty".to_string());
    }
    if request.cost_per_kwh < 0.0 {
        return Err("costPerKWh must be a non-negative number".to_string());
    }

    let status = match request.status.as_deref() {
        Some(raw) => raw.parse::<PortStatus>().map_err(|error| error.to_string())?,
        None => PortStatus::Idle,
    };
    let port_id = request
        .port_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    Ok(NewPortRecord {
        port_id,
        station_id,
        status,
        last_ping: now,
        reported_at: now,
        cost_per_kwh: request.cost_per_kwh,
        avg_time_to_charge_minutes: request.avg_time_to_charge_minutes.unwrap_or(0.0),
    })
}

fn new_session_from_request(request: CreateSessionRequest) -> Result<NewChargeSessionRecord, String> {
    let start_time = parse_iso8601(&request.start_time)
        .ok_or_else(|| "startTime must be an RFC 3339 timestamp".to_string())?;
    let end_time = parse_iso8601(&request.end_time)
        .ok_or_else(|| "endTime must be an RFC 3339 timestamp".to_string())?;

    if end_time < start_time {
        return Err("endTime must not be before startTime".to_string());
    }
    if request.energy_consumed_kwh < 0.0 {
        return Err("energyConsumedKWh must be a non-negative number".to_string());
    }
    if request.electricity_cost < 0.0 {
        return Err("electricityCost must be a non-negative number".to_string());
    }
    if let Some(rating) = request.user_rating
        && !(0.0..=5.0).contains(&rating)
    {
        return Err("userRating must be between 0 and 5".to_string());
    }

    let duration_minutes = request
        .duration_minutes
        .unwrap_or_else(|| (end_time - start_time).num_seconds() as f64 / 60.0);
    let session_id = request
        .session_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    Ok(NewChargeSessionRecord {
        session_id,
        vehicle_id: request.vehicle_id.filter(|value| !value.trim().is_empty()),
        start_time,
        end_time,
        duration_minutes,
        charged_percent: request.charged_percent,
        energy_consumed_kwh: request.energy_consumed_kwh,
        electricity_cost: request.electricity_cost,
        user_rating: request.user_rating,
        review: request.review,
    })
}

fn no_data_response() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "message": "no data available"
    }))
}

fn port_not_found_response(port_id: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "error": format!("port {port_id} does not exist")
    }))
}

fn bad_request_response(message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
}

fn json_payload_error(error: JsonPayloadError, _request: &HttpRequest) -> actix_web::Error {
    let response = bad_request_response(format!("invalid request body: {error}"));
    InternalError::from_response(error, response).into()
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::DbLockPoisoned => {
            tracing::error!("port store lock poisoned");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "database lock poisoned"
            }))
        }
        ServiceError::StoreUnavailable(error) => {
            tracing::error!(error = %error, "port store unavailable");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("port store unavailable: {error}")
            }))
        }
        ServiceError::PortNotFound(port_id) => port_not_found_response(&port_id),
        ServiceError::Conflict(what) => HttpResponse::Conflict().json(serde_json::json!({
            "error": format!("record already exists: {what}")
        })),
    }
}
