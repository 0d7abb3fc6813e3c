use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use crate::db::models::{EventKind, MatchEvent, MatchId, MatchStatus, NewMatch, Side};
use crate::live::subscriber_stream;
use crate::matches::{MatchError, MatchService};

#[derive(Clone)]
pub struct AppState {
    pub matches: MatchService,
    pub ping_interval: Duration,
}

/// Build the Axum router for the match API and live streams.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/match", get(list_handler))
        .route("/api/match/add", post(add_handler))
        .route("/api/match/change-status", post(change_status_handler))
        .route("/api/match/start", post(start_handler))
        .route("/api/match/add-event", post(add_event_handler))
        .route("/api/match/update-score", post(update_score_handler))
        .route("/api/match/stream", get(stream_all_handler))
        .route("/api/match/stream/:match_id", get(stream_match_handler))
        .route("/api/match/:id", get(get_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

// ── Request bodies ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddMatchRequest {
    #[serde(rename = "MatchData")]
    pub match_data: Option<MatchData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchData {
    pub team_a: Option<String>,
    pub team_b: Option<String>,
    pub location: Option<String>,
    pub competition: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    #[serde(rename = "MatchId")]
    pub match_id: Option<MatchId>,
    #[serde(rename = "newStatus")]
    pub new_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(rename = "MatchId")]
    pub match_id: Option<MatchId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEventRequest {
    pub match_id: Option<MatchId>,
    pub event_type: Option<String>,
    pub team: Option<String>,
    pub player: Option<String>,
    pub minute: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScoreRequest {
    pub match_id: Option<MatchId>,
    pub score_a: Option<u32>,
    pub score_b: Option<u32>,
}

impl MatchData {
    fn into_new_match(self) -> Result<NewMatch, MatchError> {
        let date = required(self.date, "date")?;
        Ok(NewMatch {
            team_a: required_text(self.team_a, "teamA")?,
            team_b: required_text(self.team_b, "teamB")?,
            location: required_text(self.location, "location")?,
            competition: required_text(self.competition, "competition")?,
            date: parse_kickoff(&date)?,
        })
    }
}

impl AddEventRequest {
    fn into_parts(self) -> Result<(MatchId, MatchEvent), MatchError> {
        let match_id = required(self.match_id, "matchId")?;
        let kind = required(self.event_type, "eventType")?;
        let team = required(self.team, "team")?;
        let event = MatchEvent {
            event_type: EventKind::parse(&kind)
                .ok_or_else(|| MatchError::validation(format!("unknown eventType '{}'", kind)))?,
            team: Side::parse(&team)
                .ok_or_else(|| MatchError::validation(format!("unknown team '{}'", team)))?,
            player: required_text(self.player, "player")?,
            minute: required(self.minute, "minute")?,
        };
        Ok((match_id, event))
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, MatchError> {
    value.ok_or_else(|| MatchError::validation(format!("{} is required", field)))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, MatchError> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(MatchError::validation(format!("{} is required", field))),
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, MatchError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| MatchError::validation(rejection.body_text()))
}

/// Kick-off time: RFC 3339, a naive `YYYY-MM-DDTHH:MM[:SS]` taken as UTC,
/// or a bare date at midnight UTC.
pub fn parse_kickoff(s: &str) -> Result<DateTime<Utc>, MatchError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| MatchError::validation(format!("invalid date '{}'", s)))
}

// ── Responses ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    data: T,
}

fn ok<T: Serialize>(message: Option<&'static str>, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message,
        data,
    })
}

impl IntoResponse for MatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            MatchError::Validation(_) => StatusCode::BAD_REQUEST,
            MatchError::NotFound(_) => StatusCode::NOT_FOUND,
            MatchError::Duplicate | MatchError::InvalidTransition { .. } => StatusCode::CONFLICT,
            MatchError::Store(e) => {
                error!("Match store failure: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = json!({ "success": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn index_handler() -> impl IntoResponse {
    Json(json!({ "message": "Football Tracker Server is Running" }))
}

/// GET /api/match
async fn list_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, MatchError> {
    let matches = state.matches.list().await?;
    Ok(ok(None, matches))
}

/// GET /api/match/:id
async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MatchId>,
) -> Result<impl IntoResponse, MatchError> {
    let record = state.matches.get(id).await?;
    Ok(ok(None, record))
}

/// POST /api/match/add
async fn add_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AddMatchRequest>, JsonRejection>,
) -> Result<impl IntoResponse, MatchError> {
    let data = required(body(payload)?.match_data, "MatchData")?;
    let stored = state.matches.create(data.into_new_match()?).await?;
    Ok(ok(Some("Match stored successfully!"), stored))
}

/// POST /api/match/change-status
async fn change_status_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChangeStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, MatchError> {
    let req = body(payload)?;
    let id = required(req.match_id, "MatchId")?;
    let raw = required(req.new_status, "newStatus")?;
    let new_status = MatchStatus::parse(&raw)
        .ok_or_else(|| MatchError::validation(format!("unknown status '{}'", raw)))?;
    let updated = state.matches.change_status(id, new_status).await?;
    Ok(ok(Some("Match status is Changed successfully!"), updated))
}

/// POST /api/match/start
async fn start_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<impl IntoResponse, MatchError> {
    let id = required(body(payload)?.match_id, "MatchId")?;
    let updated = state.matches.start(id).await?;
    Ok(ok(Some("Match started successfully!"), updated))
}

/// POST /api/match/add-event
async fn add_event_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AddEventRequest>, JsonRejection>,
) -> Result<impl IntoResponse, MatchError> {
    let (id, event) = body(payload)?.into_parts()?;
    let updated = state.matches.add_event(id, event).await?;
    Ok(ok(Some("Event added successfully"), updated))
}

/// POST /api/match/update-score
async fn update_score_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateScoreRequest>, JsonRejection>,
) -> Result<impl IntoResponse, MatchError> {
    let req = body(payload)?;
    let id = required(req.match_id, "matchId")?;
    let score_a = required(req.score_a, "scoreA")?;
    let score_b = required(req.score_b, "scoreB")?;
    let updated = state.matches.update_score(id, score_a, score_b).await?;
    Ok(ok(Some("Score updated successfully"), updated))
}

/// GET /api/match/stream (every match, for list views)
async fn stream_all_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, MatchError> {
    let (snapshot, subscription) = state.matches.subscribe_all().await?;
    debug!(channel = subscription.id(), "list subscriber connected");
    Ok(Sse::new(subscriber_stream(
        Some(snapshot),
        subscription,
        state.ping_interval,
    )))
}

/// GET /api/match/stream/:match_id (one match, for detail views)
async fn stream_match_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<MatchId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, MatchError> {
    let (snapshot, subscription) = state.matches.subscribe_match(match_id).await?;
    debug!(
        channel = subscription.id(),
        match_id,
        found = snapshot.is_some(),
        "match subscriber connected"
    );
    Ok(Sse::new(subscriber_stream(
        snapshot,
        subscription,
        state.ping_interval,
    )))
}
