use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::{Local, NaiveDate};
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio_stream::wrappers::BroadcastStream;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::DEFAULT_USER;
use crate::realtime::TopicHub;
use tally_core::error::TallyError;
use tally_core::models::{
    AddEntryOutcome, DailyGoals, HealthProfile, Ingredient, Ledger, LogRequest, ManualGoalPayload,
    MealPlan, MealSummary, NewIngredient, NewRecipe, Recipe, validate_meal_type,
};
use tally_core::service::TallyService;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB
const USER_HEADER: &str = "x-user-id";
const MAX_USER_ID_LEN: usize = 128;
const DEFAULT_HISTORY_DAYS: u32 = 7;

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<TallyService>>,
    hub: Arc<TopicHub>,
    api_key: Option<String>,
}

impl AppState {
    fn service(&self) -> MutexGuard<'_, TallyService> {
        self.service
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct HistoryQuery {
    end: Option<String>,
    days: Option<u32>,
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
struct CategoryQuery {
    category: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unprocessable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<TallyError> for ApiError {
    fn from(err: TallyError) -> Self {
        match err {
            TallyError::Validation(msg) => Self::BadRequest(msg),
            TallyError::NotFound(msg) => Self::NotFound(msg),
            e @ TallyError::NoSuitableIngredients(_) => Self::Unprocessable(e.to_string()),
            TallyError::Upstream(e) => Self::Internal(e),
            TallyError::Notification(msg) => Self::Internal(anyhow::anyhow!(msg)),
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{raw}'. Use YYYY-MM-DD")))
}

fn date_or_today(raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    raw.map_or_else(|| Ok(Local::now().date_naive()), parse_date)
}

/// `Json` body whose rejections come back as a 400 `{error}` body.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

// --- User identity ---

/// Caller identity from the `X-User-Id` header; `default` when absent.
struct UserId(String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_HEADER) else {
            return Ok(Self(DEFAULT_USER.to_string()));
        };
        let user = value
            .to_str()
            .map(str::trim)
            .map_err(|_| ApiError::BadRequest("X-User-Id must be ASCII".to_string()))?;
        if user.is_empty() {
            return Ok(Self(DEFAULT_USER.to_string()));
        }
        if user.len() > MAX_USER_ID_LEN {
            return Err(ApiError::BadRequest(format!(
                "X-User-Id must be at most {MAX_USER_ID_LEN} characters"
            )));
        }
        Ok(Self(user.to_string()))
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Ledger handlers ---

async fn add_entry(
    State(state): State<AppState>,
    UserId(user): UserId,
    ApiJson(req): ApiJson<LogRequest>,
) -> Result<(StatusCode, Json<AddEntryOutcome>), ApiError> {
    let outcome = state.service().add_entry(&user, &req)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn remove_entry(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path((ledger_id, identifier)): Path<(String, String)>,
) -> Result<Json<Ledger>, ApiError> {
    let ledger = state
        .service()
        .remove_entry(&user, &ledger_id, &identifier)?;
    Ok(Json(ledger))
}

async fn get_ledger(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(date_str): Path<String>,
) -> Result<Json<Ledger>, ApiError> {
    let date = parse_date(&date_str)?;
    let ledger = state.service().get_ledger(&user, date)?;
    Ok(Json(ledger))
}

async fn ledger_history(
    State(state): State<AppState>,
    UserId(user): UserId,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<Ledger>>, ApiError> {
    let end = date_or_today(params.end.as_deref())?;
    let days = params.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    let ledgers = state.service().ledger_history(&user, end, days)?;
    Ok(Json(ledgers))
}

// --- Goal / profile handlers ---

async fn get_goals(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> Result<Json<DailyGoals>, ApiError> {
    Ok(Json(state.service().get_goals(&user)?))
}

async fn set_goals(
    State(state): State<AppState>,
    UserId(user): UserId,
    ApiJson(req): ApiJson<ManualGoalPayload>,
) -> Result<Json<DailyGoals>, ApiError> {
    Ok(Json(state.service().set_goals(&user, &req)?))
}

async fn clear_goals(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> Result<Json<DailyGoals>, ApiError> {
    Ok(Json(state.service().clear_goals(&user)?))
}

async fn get_profile(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> Result<Json<HealthProfile>, ApiError> {
    Ok(Json(state.service().get_profile(&user)?))
}

async fn set_profile(
    State(state): State<AppState>,
    UserId(user): UserId,
    ApiJson(req): ApiJson<HealthProfile>,
) -> Result<Json<HealthProfile>, ApiError> {
    Ok(Json(state.service().set_profile(&user, &req)?))
}

// --- Plan / finalize handlers ---

async fn generate_plan(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(date_str): Path<String>,
) -> Result<(StatusCode, Json<MealPlan>), ApiError> {
    let date = parse_date(&date_str)?;
    let plan = state.service().generate_meal_plan(&user, date)?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn get_plan(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(date_str): Path<String>,
) -> Result<Json<MealPlan>, ApiError> {
    let date = parse_date(&date_str)?;
    Ok(Json(state.service().get_meal_plan(&user, date)?))
}

async fn finalize_meal(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(meal): Path<String>,
    Query(params): Query<DateQuery>,
) -> Result<Json<MealSummary>, ApiError> {
    let meal_type = validate_meal_type(&meal).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let date = date_or_today(params.date.as_deref())?;
    Ok(Json(state.service().finalize_meal(&user, meal_type, date)?))
}

// --- Catalog handlers ---

async fn add_ingredient(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewIngredient>,
) -> Result<(StatusCode, Json<Ingredient>), ApiError> {
    let ingredient = state.service().add_ingredient(&req)?;
    Ok((StatusCode::CREATED, Json(ingredient)))
}

async fn list_ingredients(
    State(state): State<AppState>,
    Query(params): Query<CategoryQuery>,
) -> Result<Json<Vec<Ingredient>>, ApiError> {
    Ok(Json(
        state
            .service()
            .list_ingredients(params.category.as_deref())?,
    ))
}

async fn add_recipe(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewRecipe>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let recipe = state.service().add_recipe(&req)?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn list_recipes(State(state): State<AppState>) -> Result<Json<Vec<Recipe>>, ApiError> {
    Ok(Json(state.service().list_recipes()?))
}

// --- Event stream ---

async fn ledger_events(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.hub.subscribe(&user);
    let stream = BroadcastStream::new(receiver).filter_map(move |message| {
        let user = user.clone();
        async move {
            match message {
                Ok(payload) => Some(Ok(Event::default().event("ledger").data(payload))),
                Err(err) => {
                    tracing::warn!(user_id = %user, error = %err, "event stream lagged");
                    None
                }
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/entries", post(add_entry))
        .route("/api/ledgers", get(ledger_history))
        // `{ledger}` is a date on reads and a ledger id on entry removal.
        .route("/api/ledgers/{ledger}", get(get_ledger))
        .route(
            "/api/ledgers/{ledger}/entries/{identifier}",
            axum::routing::delete(remove_entry),
        )
        .route(
            "/api/goals",
            get(get_goals).put(set_goals).delete(clear_goals),
        )
        .route("/api/profile", get(get_profile).put(set_profile))
        .route("/api/plans/{date}", post(generate_plan).get(get_plan))
        .route("/api/meals/{meal_type}/finalize", post(finalize_meal))
        .route(
            "/api/ingredients",
            post(add_ingredient).get(list_ingredients),
        )
        .route("/api/recipes", post(add_recipe).get(list_recipes))
        .route("/api/events", get(ledger_events))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// `abcd...wxyz`, or `****` when the key is too short to show any of it.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    service: TallyService,
    hub: Arc<TopicHub>,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        hub,
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        tracing::info!(
            "API key: {} (see api_key file in data directory)",
            mask_key(key)
        );
    } else {
        tracing::warn!("authentication disabled (--no-auth); API is open to anyone");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        tracing::warn!(
            "listening on {bind} with no authentication; any device on your network can access this API"
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
