//! Control-surface HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use shared_types::{
    BotStatusResponse, ConfigResponse, ControlResponse, DatesResponse, LogsQuery, LogsResponse,
    StartBotRequest,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::availability::AvailabilityQuery;
use crate::client::SchedulingApi;
use crate::config::BotConfig;
use crate::error::{ApiError, ApiResult};
use crate::manager::BotManager;
use crate::policy::DateBounds;
use crate::poller::PollState;
use crate::types::AppointmentDate;

pub struct AppState<A: SchedulingApi> {
    pub manager: BotManager<A>,
    pub config: Arc<BotConfig>,
}

impl<A: SchedulingApi> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

pub fn router<A: SchedulingApi>(state: AppState<A>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/start", post(start_bot::<A>))
        .route("/api/stop", post(stop_bot::<A>))
        .route("/api/status", get(bot_status::<A>))
        .route("/api/logs", get(list_logs::<A>))
        .route("/api/config", get(site_config::<A>))
        .route("/api/dates", get(list_dates::<A>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

fn parse_date(field: &str, raw: &str) -> ApiResult<AppointmentDate> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("{} must be a YYYY-MM-DD date, got {:?}", field, raw)))
}

fn parse_optional_date(field: &str, raw: Option<&str>) -> ApiResult<Option<AppointmentDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_date(field, raw).map(Some),
        None => Ok(None),
    }
}

/// Validate a start request into the loop's initial state.
pub fn poll_state_from_request(request: &StartBotRequest) -> ApiResult<PollState> {
    let held = parse_date("currentDate", &request.current_date)?;
    let bounds = DateBounds {
        min_date: parse_optional_date("minDate", request.min_date.as_deref())?,
        target_date: parse_optional_date("targetDate", request.target_date.as_deref())?,
    };

    if let (Some(min), Some(target)) = (bounds.min_date, bounds.target_date) {
        if min > target {
            return Err(ApiError::bad_request(format!(
                "minDate {} is after targetDate {}",
                min, target
            )));
        }
    }

    Ok(PollState {
        held,
        bounds,
        dry_run: request.dry_run,
    })
}

pub async fn start_bot<A: SchedulingApi>(
    State(state): State<AppState<A>>,
    Json(payload): Json<StartBotRequest>,
) -> ApiResult<Json<ControlResponse>> {
    let poll_state = poll_state_from_request(&payload)?;
    let refresh_delay = payload
        .refresh_delay_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    let response = match state.manager.start(poll_state, refresh_delay) {
        Ok(mode) => ControlResponse::ok("Bot started").with_mode(mode),
        Err(e) => ControlResponse::rejected(e.to_string()),
    };
    Ok(Json(response))
}

pub async fn stop_bot<A: SchedulingApi>(State(state): State<AppState<A>>) -> Json<ControlResponse> {
    match state.manager.stop() {
        Ok(()) => Json(ControlResponse::ok("Bot stop requested")),
        Err(e) => Json(ControlResponse::rejected(e.to_string())),
    }
}

pub async fn bot_status<A: SchedulingApi>(
    State(state): State<AppState<A>>,
) -> Json<BotStatusResponse> {
    Json(state.manager.status())
}

pub async fn list_logs<A: SchedulingApi>(
    State(state): State<AppState<A>>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: state.manager.logs(query.since, query.limit),
    })
}

pub async fn site_config<A: SchedulingApi>(
    State(state): State<AppState<A>>,
) -> Json<ConfigResponse> {
    let config = &state.config;
    Json(ConfigResponse {
        email: config.credentials.email.clone(),
        country_code: config.country_code.clone(),
        schedule_id: config.target.schedule_id.clone(),
        facility_id: config.target.facility_id.clone(),
        target_date: state.manager.status().target_date,
    })
}

/// Log in once and list the open dates, independent of any running bot.
pub async fn list_dates<A: SchedulingApi>(
    State(state): State<AppState<A>>,
) -> ApiResult<Json<DatesResponse>> {
    let api = state.manager.api();
    let target = &state.config.target;

    let session = api.login(&state.config.credentials).await?;
    let dates = AvailabilityQuery::new(api.as_ref(), target)
        .list_dates(&session)
        .await?;

    Ok(Json(DatesResponse {
        total: dates.len(),
        dates: dates.iter().map(ToString::to_string).collect(),
        facility_id: target.facility_id.clone(),
        schedule_id: target.schedule_id.clone(),
    }))
}
