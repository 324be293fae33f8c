use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ApiError, Error};
use crate::ingest::IngestService;
use crate::models::{
    AttendanceUpdate, CheckInNoteUpdate, MenteeFilter, MenteeStatus, MenteeUpdate, NewAttendance,
    NewCheckInNote, NewMentee, WeeklyTally,
};
use crate::source::AttendanceSource;
use crate::store::{AttendanceStore, CheckInNoteStore, MenteeStore, ReportStore, SharedStore};

const DEFAULT_MENTEE_LIMIT: i64 = 1000;
const DEFAULT_EXTERNAL_PAGE: u32 = 10;

pub struct AppState {
    pub store: SharedStore,
    pub ingest: Arc<IngestService>,
    pub source: Option<AttendanceSource>,
}

type SharedState = Arc<AppState>;
type ApiResult<T> = Result<T, ApiError>;

// Extractors whose rejections become JSON 400 responses.

struct ApiJson<T>(T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

struct ApiQuery<T>(T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

struct ApiPath<T>(T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

pub fn build_router(state: SharedState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/mentees", post(create_mentee).get(list_mentees))
        .route("/mentees/count/checkins-due/:batch", get(count_check_ins_due))
        .route("/mentees/count/:batch", get(count_mentees))
        .route(
            "/mentees/:id",
            get(get_mentee).put(update_mentee).delete(delete_mentee),
        )
        .route("/attendance", post(create_attendance).get(list_attendance))
        .route(
            "/attendance/:id",
            get(get_attendance)
                .put(update_attendance)
                .delete(delete_attendance),
        )
        .route("/checkin-notes", post(create_note).get(list_notes))
        .route(
            "/checkin-notes/:id",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route(
            "/weekly-attendance",
            get(list_all_reports).post(upsert_report),
        )
        .route(
            "/api/weekly-attendance-report",
            get(list_cohort_reports).post(generate_reports),
        )
        .route("/api/run-attendance-cron-manually", post(run_ingest))
        .route("/api/sync-mentees", post(sync_mentees))
        .route("/api/external-mentees", get(external_mentees))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

async fn root() -> &'static str {
    "Hello from Mentee Tracker Backend!"
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// Mentees

#[derive(Debug, Deserialize)]
struct ListMenteesQuery {
    limit: Option<i64>,
    cohort_batch: Option<String>,
}

async fn create_mentee(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<NewMentee>,
) -> ApiResult<impl IntoResponse> {
    let mentee = state.store.create_mentee(&payload).await?;
    Ok((StatusCode::CREATED, Json(mentee)))
}

async fn list_mentees(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<ListMenteesQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_MENTEE_LIMIT);
    if limit < 0 {
        return Err(Error::InvalidInput("limit must not be negative".into()).into());
    }
    let filter = MenteeFilter {
        cohort_batch: query.cohort_batch,
        limit: Some(limit),
    };
    Ok(Json(state.store.list_mentees(&filter).await?))
}

async fn count_mentees(
    State(state): State<SharedState>,
    ApiPath(batch): ApiPath<String>,
) -> ApiResult<impl IntoResponse> {
    let count = state.store.count_mentees(&batch, &[]).await?;
    Ok(Json(json!({ "count": count })))
}

async fn count_check_ins_due(
    State(state): State<SharedState>,
    ApiPath(batch): ApiPath<String>,
) -> ApiResult<impl IntoResponse> {
    let count = state
        .store
        .count_mentees(&batch, &[MenteeStatus::Completed, MenteeStatus::Archived])
        .await?;
    Ok(Json(json!({ "count": count })))
}

async fn get_mentee(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let mentee = state
        .store
        .get_mentee(id)
        .await?
        .ok_or_else(|| Error::NotFound("Mentee".into()))?;
    Ok(Json(mentee))
}

async fn update_mentee(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<MenteeUpdate>,
) -> ApiResult<impl IntoResponse> {
    let mentee = state
        .store
        .update_mentee(id, &payload)
        .await?
        .ok_or_else(|| Error::NotFound("Mentee".into()))?;
    Ok(Json(mentee))
}

async fn delete_mentee(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    if state.store.delete_mentee(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound("Mentee".into()).into())
    }
}

// Attendance

async fn create_attendance(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<NewAttendance>,
) -> ApiResult<impl IntoResponse> {
    let record = state.store.create_attendance(&payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_attendance(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.list_attendance().await?))
}

async fn get_attendance(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let record = state
        .store
        .get_attendance(id)
        .await?
        .ok_or_else(|| Error::NotFound("Attendance record".into()))?;
    Ok(Json(record))
}

async fn update_attendance(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AttendanceUpdate>,
) -> ApiResult<impl IntoResponse> {
    let record = state
        .store
        .update_attendance(id, &payload)
        .await?
        .ok_or_else(|| Error::NotFound("Attendance record".into()))?;
    Ok(Json(record))
}

async fn delete_attendance(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    if state.store.delete_attendance(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound("Attendance record".into()).into())
    }
}

// Check-in notes

#[derive(Debug, Deserialize)]
struct NotesQuery {
    #[serde(rename = "menteeId")]
    mentee_id: Option<Uuid>,
}

async fn create_note(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<NewCheckInNote>,
) -> ApiResult<impl IntoResponse> {
    let note = state.store.create_note(&payload).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn list_notes(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<NotesQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.list_notes(query.mentee_id).await?))
}

async fn get_note(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let note = state
        .store
        .get_note(id)
        .await?
        .ok_or_else(|| Error::NotFound("Check-in note".into()))?;
    Ok(Json(note))
}

async fn update_note(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CheckInNoteUpdate>,
) -> ApiResult<impl IntoResponse> {
    let note = state
        .store
        .update_note(id, &payload)
        .await?
        .ok_or_else(|| Error::NotFound("Check-in note".into()))?;
    Ok(Json(note))
}

async fn delete_note(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    if state.store.delete_note(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound("Check-in note".into()).into())
    }
}

// Reports

#[derive(Debug, Deserialize)]
struct ReportQuery {
    batch: Option<String>,
}

async fn list_all_reports(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.list_weekly_reports(None).await?))
}

async fn upsert_report(
    State(state): State<SharedState>,
    ApiJson(tally): ApiJson<WeeklyTally>,
) -> ApiResult<impl IntoResponse> {
    let consistent = tally.total_mentees >= 0
        && tally.total_present >= 0
        && tally.total_absent >= 0
        && tally.total_present.checked_add(tally.total_absent) == Some(tally.total_mentees);
    if !consistent {
        return Err(Error::InvalidInput(
            "totals must be non-negative and totalPresent + totalAbsent must equal totalMentees"
                .into(),
        )
        .into());
    }
    let report = state.store.upsert_weekly_report(&tally).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn list_cohort_reports(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> ApiResult<impl IntoResponse> {
    let batch = query
        .batch
        .filter(|batch| !batch.is_empty())
        .ok_or_else(|| Error::InvalidInput("Cohort batch is required.".into()))?;
    let reports = state.store.list_weekly_reports(Some(&batch)).await?;
    Ok(Json(json!({
        "message": "Weekly attendance reports fetched successfully.",
        "reports": reports,
    })))
}

async fn generate_reports(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    let reports = state
        .ingest
        .regenerate_reports(Local::now().date_naive())
        .await?;
    Ok(Json(json!({
        "message": "Weekly attendance reports generated successfully.",
        "reports": reports,
    })))
}

// Source-backed operations

async fn run_ingest(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    let summary = state.ingest.run().await?;
    Ok(Json(json!({
        "message": "Manual attendance fetch and save completed successfully.",
        "summary": summary,
    })))
}

async fn sync_mentees(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    let created = state.ingest.sync_mentees().await?;
    Ok(Json(json!({
        "message": "Mentee synchronization completed successfully.",
        "createdCount": created,
    })))
}

#[derive(Debug, Deserialize)]
struct ExternalQuery {
    per_page: Option<u32>,
}

async fn external_mentees(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<ExternalQuery>,
) -> ApiResult<impl IntoResponse> {
    let source = state
        .source
        .as_ref()
        .ok_or_else(|| Error::Source("attendance source credentials are not configured".into()))?;
    let students = source
        .list_students(query.per_page.unwrap_or(DEFAULT_EXTERNAL_PAGE))
        .await?;
    Ok(Json(students))
}
