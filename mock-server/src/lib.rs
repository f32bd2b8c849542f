use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const TOKEN_HEADER: &str = "teamup-token";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    #[serde(default)]
    pub subcalendar_ids: Vec<u64>,
    pub start_dt: String,
    pub end_dt: String,
    #[serde(default)]
    pub all_day: bool,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub who: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub modified: u64,
}

/// Create/update payload. Every field is optional so validation can report
/// a TeamUp-style error instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct EventInput {
    pub subcalendar_ids: Option<Vec<u64>>,
    pub start_dt: Option<String>,
    pub end_dt: Option<String>,
    pub all_day: Option<bool>,
    pub title: Option<String>,
    pub who: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub rrule: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    #[serde(rename = "modifiedSince")]
    pub modified_since: Option<u64>,
    pub tz: Option<String>,
}

#[derive(Clone, Debug)]
struct HistoryEntry {
    action: &'static str,
    version: u64,
    timestamp: u64,
}

/// State captured before a mutation. `None` means the event did not exist.
#[derive(Clone, Debug)]
struct UndoEntry {
    calendar: String,
    event_id: String,
    previous: Option<Event>,
}

#[derive(Default)]
pub struct Store {
    events: HashMap<(String, String), Event>,
    history: HashMap<(String, String), Vec<HistoryEntry>>,
    undo: HashMap<String, UndoEntry>,
}

impl Store {
    fn record(&mut self, key: &(String, String), action: &'static str, version: u64) -> String {
        self.history.entry(key.clone()).or_default().push(HistoryEntry {
            action,
            version,
            timestamp: now(),
        });
        Uuid::new_v4().simple().to_string()
    }
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
pub struct AppState {
    token: Arc<str>,
    db: Db,
}

/// A TeamUp-shaped error response: `{"error":{"id":..,"message":..}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    id: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, id: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            id,
            message: message.into(),
        }
    }

    fn event_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "event_not_found", "Event not found.")
    }

    fn validation(message: &str) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "id": self.id, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}

pub fn app(token: &str) -> Router {
    let state = AppState {
        token: Arc::from(token),
        db: Arc::new(RwLock::new(Store::default())),
    };
    Router::new()
        .route("/{calendar}/events", get(list_events).post(create_event))
        .route("/{calendar}/events/", get(recent_changes))
        .route("/{calendar}/events/undo/{undo_id}", put(undo_action))
        .route(
            "/{calendar}/events/{event_id}",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/{calendar}/events/{event_id}/history", get(event_history))
        .route("/{calendar}/events/{event_id}/aux", get(event_aux))
        .route("/{calendar}/events/{event_id}/pointer", post(event_pointer))
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state)
}

pub async fn run(listener: TcpListener, token: &str) -> Result<(), std::io::Error> {
    axum::serve(listener, app(token)).await
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(&*state.token) {
        tracing::debug!(uri = %request.uri(), "rejecting request without a valid token");
        return ApiError::new(
            StatusCode::UNAUTHORIZED,
            "no_permission",
            "You do not have the permission to access this calendar.",
        )
        .into_response();
    }
    next.run(request).await
}

fn parse_body(body: &str) -> Result<EventInput, ApiError> {
    if body.trim().is_empty() {
        return Ok(EventInput::default());
    }
    serde_json::from_str(body).map_err(|_| ApiError::validation("Malformed request body."))
}

fn validate_range(start_dt: &str, end_dt: &str) -> Result<(), ApiError> {
    if end_dt < start_dt {
        return Err(ApiError::validation("Invalid date"));
    }
    Ok(())
}

/// Overlap test on the `YYYY-MM-DD` prefix of the event's timestamps.
fn in_range(event: &Event, start_date: Option<&str>, end_date: Option<&str>) -> bool {
    let day = |dt: &str| dt.get(..10).unwrap_or(dt).to_string();
    let after_start = start_date.map_or(true, |start| day(&event.end_dt).as_str() >= start);
    let before_end = end_date.map_or(true, |end| day(&event.start_dt).as_str() <= end);
    after_start && before_end
}

fn calendar_events<'a>(store: &'a Store, calendar: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
    store
        .events
        .iter()
        .filter(move |((cal, _), _)| cal == calendar)
        .map(|(_, event)| event)
}

async fn list_events(
    State(state): State<AppState>,
    Path(calendar): Path<String>,
    Query(params): Query<ListParams>,
) -> Json<Value> {
    let store = state.db.read().await;
    let mut events: Vec<Event> = calendar_events(&store, &calendar)
        .filter(|e| in_range(e, params.start_date.as_deref(), params.end_date.as_deref()))
        .cloned()
        .collect();
    events.sort_by(|a, b| a.start_dt.cmp(&b.start_dt));
    tracing::debug!(%calendar, count = events.len(), tz = ?params.tz, "listed events");
    Json(json!({ "events": events }))
}

async fn recent_changes(
    State(state): State<AppState>,
    Path(calendar): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let since = params
        .modified_since
        .ok_or_else(|| ApiError::validation("modifiedSince is required."))?;
    let store = state.db.read().await;
    let mut events: Vec<Event> = calendar_events(&store, &calendar)
        .filter(|e| e.modified >= since)
        .cloned()
        .collect();
    events.sort_by_key(|e| e.modified);
    Ok(Json(json!({ "events": events, "timestamp": now() })))
}

async fn get_event(
    State(state): State<AppState>,
    Path((calendar, event_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let store = state.db.read().await;
    let event = store
        .events
        .get(&(calendar, event_id))
        .ok_or_else(ApiError::event_not_found)?;
    Ok(Json(json!({ "event": event })))
}

async fn create_event(
    State(state): State<AppState>,
    Path(calendar): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let input = parse_body(&body)?;
    let title = input.title.ok_or_else(|| ApiError::validation("Title is required."))?;
    let start_dt = input.start_dt.ok_or_else(|| ApiError::validation("Invalid date"))?;
    let end_dt = input.end_dt.ok_or_else(|| ApiError::validation("Invalid date"))?;
    validate_range(&start_dt, &end_dt)?;

    let event = Event {
        id: Uuid::new_v4().simple().to_string(),
        subcalendar_ids: input.subcalendar_ids.unwrap_or_default(),
        start_dt,
        end_dt,
        all_day: input.all_day.unwrap_or(false),
        title,
        who: input.who,
        location: input.location,
        notes: input.notes,
        rrule: input.rrule,
        version: 1,
        modified: now(),
    };

    let key = (calendar.clone(), event.id.clone());
    let mut store = state.db.write().await;
    let undo_id = store.record(&key, "created", event.version);
    store.undo.insert(
        undo_id.clone(),
        UndoEntry {
            calendar,
            event_id: event.id.clone(),
            previous: None,
        },
    );
    store.events.insert(key, event.clone());
    Ok((StatusCode::CREATED, Json(json!({ "event": event, "undo_id": undo_id }))))
}

async fn update_event(
    State(state): State<AppState>,
    Path((calendar, event_id)): Path<(String, String)>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let input = parse_body(&body)?;
    let key = (calendar.clone(), event_id.clone());
    let mut store = state.db.write().await;
    let previous = store
        .events
        .get(&key)
        .cloned()
        .ok_or_else(ApiError::event_not_found)?;

    let mut event = previous.clone();
    if let Some(ids) = input.subcalendar_ids {
        event.subcalendar_ids = ids;
    }
    if let Some(start_dt) = input.start_dt {
        event.start_dt = start_dt;
    }
    if let Some(end_dt) = input.end_dt {
        event.end_dt = end_dt;
    }
    if let Some(all_day) = input.all_day {
        event.all_day = all_day;
    }
    if let Some(title) = input.title {
        event.title = title;
    }
    event.who = input.who.or(event.who);
    event.location = input.location.or(event.location);
    event.notes = input.notes.or(event.notes);
    event.rrule = input.rrule.or(event.rrule);
    validate_range(&event.start_dt, &event.end_dt)?;
    event.version += 1;
    event.modified = now();

    let undo_id = store.record(&key, "updated", event.version);
    store.undo.insert(
        undo_id.clone(),
        UndoEntry {
            calendar,
            event_id,
            previous: Some(previous),
        },
    );
    store.events.insert(key, event.clone());
    Ok(Json(json!({ "event": event, "undo_id": undo_id })))
}

async fn delete_event(
    State(state): State<AppState>,
    Path((calendar, event_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let key = (calendar.clone(), event_id.clone());
    let mut store = state.db.write().await;
    let previous = store.events.remove(&key).ok_or_else(ApiError::event_not_found)?;
    let undo_id = store.record(&key, "deleted", previous.version);
    store.undo.insert(
        undo_id.clone(),
        UndoEntry {
            calendar,
            event_id,
            previous: Some(previous),
        },
    );
    Ok(Json(json!({ "undo_id": undo_id })))
}

async fn event_history(
    State(state): State<AppState>,
    Path((calendar, event_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let store = state.db.read().await;
    let entries = store
        .history
        .get(&(calendar, event_id))
        .ok_or_else(ApiError::event_not_found)?;
    let history: Vec<Value> = entries
        .iter()
        .map(|h| json!({ "action": h.action, "version": h.version, "timestamp": h.timestamp }))
        .collect();
    Ok(Json(json!({ "history": history })))
}

async fn event_aux(
    State(state): State<AppState>,
    Path((calendar, event_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let store = state.db.read().await;
    let event = store
        .events
        .get(&(calendar, event_id))
        .ok_or_else(ApiError::event_not_found)?;
    Ok(Json(json!({
        "aux": { "event_id": event.id, "comments": [], "attachments": [] }
    })))
}

async fn event_pointer(
    State(state): State<AppState>,
    Path((calendar, event_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let store = state.db.read().await;
    let key = (calendar, event_id);
    if !store.events.contains_key(&key) {
        return Err(ApiError::event_not_found());
    }
    let pointer = Uuid::new_v4().simple().to_string();
    Ok(Json(json!({
        "url": format!("https://teamup.com/{}/events/{}?pointer={pointer}", key.0, key.1)
    })))
}

async fn undo_action(
    State(state): State<AppState>,
    Path((calendar, undo_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let mut store = state.db.write().await;
    let entry = match store.undo.get(&undo_id) {
        Some(entry) if entry.calendar == calendar => entry.clone(),
        _ => {
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                "undo_not_found",
                "Undo action not found.",
            ))
        }
    };
    store.undo.remove(&undo_id);

    let key = (entry.calendar, entry.event_id);
    match entry.previous {
        Some(previous) => {
            store.record(&key, "restored", previous.version);
            store.events.insert(key, previous);
        }
        None => {
            store.record(&key, "removed", 0);
            store.events.remove(&key);
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
