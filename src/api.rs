// HTTP surface for the tracker
// Every handler locks the shared connection once and runs one Tracker operation.

use crate::db::User;
use crate::feed::ActivityEntry;
use crate::ledger::{PeriodSummary, RecordKind};
use crate::plans::{NewSavingPlan, SavingPlan, SavingPlanSummary};
use crate::settings::UserCurrencySettings;
use crate::tracker::{
    LoginRequest, Message, ProfileUpdate, RecordInput, RecordQuery, RecordView, Services,
    SettingsUpdate, SignupRequest, SignupResponse, TokenResponse, Tracker, TrackerError,
    TrackerResult,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub services: Arc<Services>,
}

impl AppState {
    pub fn new(conn: Connection, services: Services) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            services: Arc::new(services),
        }
    }

    fn run<T>(&self, op: impl FnOnce(&Tracker) -> TrackerResult<T>) -> ApiResult<T> {
        let conn = self
            .db
            .lock()
            .map_err(|_| TrackerError::Storage(anyhow::anyhow!("database lock poisoned")))?;
        let tracker = Tracker::new(&conn, &self.services);
        op(&tracker).map(|data| Json(ApiResponse::ok(data)))
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn err(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, TrackerError>;

impl TrackerError {
    pub fn status(&self) -> StatusCode {
        match self {
            TrackerError::Unauthenticated
            | TrackerError::InvalidToken
            | TrackerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            TrackerError::UserNotFound | TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
            TrackerError::EmailTaken | TrackerError::InvalidVerificationToken => {
                StatusCode::BAD_REQUEST
            }
            TrackerError::NotVerified => StatusCode::FORBIDDEN,
            TrackerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TrackerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            TrackerError::Storage(e) => {
                error!(error = %format!("{:#}", e), "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ApiResponse::err(message))).into_response()
    }
}

// ============================================================================
// Token extraction
// ============================================================================

#[derive(Deserialize)]
struct TokenParam {
    token: Option<String>,
}

/// Access token from `Authorization: Bearer` or the `token` query parameter
pub struct AuthToken(pub Option<String>);

impl AuthToken {
    fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        let token = from_header.or_else(|| {
            Query::<TokenParam>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(param)| param.token)
        });

        Ok(AuthToken(token))
    }
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Deserialize)]
struct VerifyQuery {
    token: String,
}

#[derive(Deserialize)]
struct PeriodQuery {
    month: Option<u32>,
    year: Option<i32>,
}

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct PlanSummaryQuery {
    month: u32,
    year: i32,
}

// ============================================================================
// Handlers
// ============================================================================

async fn root() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::ok(serde_json::json!({
        "message": "M&M Tracker API",
        "version": crate::VERSION,
    })))
}

async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("OK"))
}

async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<SignupResponse> {
    state.run(|t| t.signup(request))
}

async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> ApiResult<Message> {
    state.run(|t| t.verify_email(&query.token))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<TokenResponse> {
    state.run(|t| t.login(request))
}

async fn me(State(state): State<AppState>, token: AuthToken) -> ApiResult<User> {
    state.run(|t| t.me(token.as_deref()))
}

async fn update_me(
    State(state): State<AppState>,
    token: AuthToken,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<User> {
    state.run(|t| t.update_me(token.as_deref(), update))
}

async fn delete_data(State(state): State<AppState>, token: AuthToken) -> ApiResult<Message> {
    state.run(|t| t.delete_data(token.as_deref()))
}

async fn add_expense(
    State(state): State<AppState>,
    token: AuthToken,
    Json(input): Json<RecordInput>,
) -> ApiResult<RecordView> {
    state.run(|t| t.add_record(token.as_deref(), RecordKind::Expense, input))
}

async fn list_expenses(
    State(state): State<AppState>,
    token: AuthToken,
    Query(query): Query<RecordQuery>,
) -> ApiResult<Vec<RecordView>> {
    state.run(|t| t.list_records(token.as_deref(), RecordKind::Expense, query))
}

async fn delete_expense(
    State(state): State<AppState>,
    token: AuthToken,
    Path(id): Path<i64>,
) -> ApiResult<Message> {
    state.run(|t| t.delete_record(token.as_deref(), RecordKind::Expense, id))
}

async fn add_income(
    State(state): State<AppState>,
    token: AuthToken,
    Json(input): Json<RecordInput>,
) -> ApiResult<RecordView> {
    state.run(|t| t.add_record(token.as_deref(), RecordKind::Income, input))
}

async fn list_incomes(
    State(state): State<AppState>,
    token: AuthToken,
    Query(query): Query<RecordQuery>,
) -> ApiResult<Vec<RecordView>> {
    state.run(|t| t.list_records(token.as_deref(), RecordKind::Income, query))
}

async fn delete_income(
    State(state): State<AppState>,
    token: AuthToken,
    Path(id): Path<i64>,
) -> ApiResult<Message> {
    state.run(|t| t.delete_record(token.as_deref(), RecordKind::Income, id))
}

async fn dashboard_summary(
    State(state): State<AppState>,
    token: AuthToken,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<PeriodSummary> {
    state.run(|t| t.dashboard_summary(token.as_deref(), query.month, query.year))
}

async fn recent_activity(
    State(state): State<AppState>,
    token: AuthToken,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Vec<ActivityEntry>> {
    state.run(|t| t.recent_activity(token.as_deref(), query.limit))
}

async fn get_settings(
    State(state): State<AppState>,
    token: AuthToken,
) -> ApiResult<UserCurrencySettings> {
    state.run(|t| t.settings(token.as_deref()))
}

async fn update_settings(
    State(state): State<AppState>,
    token: AuthToken,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<UserCurrencySettings> {
    state.run(|t| t.update_settings(token.as_deref(), update))
}

async fn add_plan(
    State(state): State<AppState>,
    token: AuthToken,
    Json(plan): Json<NewSavingPlan>,
) -> ApiResult<SavingPlan> {
    state.run(|t| t.add_plan(token.as_deref(), plan))
}

async fn list_plans(
    State(state): State<AppState>,
    token: AuthToken,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Vec<SavingPlan>> {
    state.run(|t| t.list_plans(token.as_deref(), query.month, query.year))
}

async fn delete_plan(
    State(state): State<AppState>,
    token: AuthToken,
    Path(id): Path<i64>,
) -> ApiResult<Message> {
    state.run(|t| t.delete_plan(token.as_deref(), id))
}

async fn plans_summary(
    State(state): State<AppState>,
    token: AuthToken,
    Query(query): Query<PlanSummaryQuery>,
) -> ApiResult<SavingPlanSummary> {
    state.run(|t| t.plans_summary(token.as_deref(), query.month, query.year))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let auth = Router::new()
        .route("/signup", post(signup))
        .route("/verify", get(verify_email))
        .route("/login", post(login))
        .route("/me", get(me).put(update_me))
        .route("/data", delete(delete_data));

    let expenses = Router::new()
        .route("/", post(add_expense).get(list_expenses))
        .route("/:id", delete(delete_expense));

    let incomes = Router::new()
        .route("/", post(add_income).get(list_incomes))
        .route("/:id", delete(delete_income));

    let dashboard = Router::new()
        .route("/summary", get(dashboard_summary))
        .route("/recent-activity", get(recent_activity));

    let settings = Router::new().route("/", get(get_settings).put(update_settings));

    let plans = Router::new()
        .route("/", post(add_plan).get(list_plans))
        .route("/summary", get(plans_summary))
        .route("/:id", delete(delete_plan));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/auth", auth)
        .nest("/expenses", expenses)
        .nest("/incomes", incomes)
        .nest("/dashboard", dashboard)
        .nest("/settings", settings)
        .nest("/plans", plans)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
