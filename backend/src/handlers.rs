use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, VerificationError};
use crate::leads::{LeadReceipt, LeadSubmitter};
use crate::models::{Car, CarForm, LeadForm};
use crate::repo::{CarFilter, ListingRepo};
use crate::session::{issue_session_token, validate_session_token, MAX_ATTEMPTS};
use crate::staging::{ImageStager, StagedFile};
use crate::submission::{ListingSubmitter, Submission};
use crate::verification::VerificationGate;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub gate: Arc<VerificationGate>,
    pub stager: Arc<ImageStager>,
    pub listings: Arc<dyn ListingRepo>,
    pub submitter: Arc<ListingSubmitter>,
    pub leads: Arc<LeadSubmitter>,
}

/// Session id extracted from a validated token, carried to the gated
/// handler via request extensions.
#[derive(Clone, Copy)]
pub struct SessionToken(pub Uuid);

pub fn router(state: AppState) -> Router {
    // Only listing creation sits behind the verified-session token.
    let session_guard = middleware::from_fn_with_state(state.clone(), require_session_token);

    Router::new()
        .route(
            "/api/cars",
            post(create_car).route_layer(session_guard).get(list_cars),
        )
        .route("/api/cars/search", get(list_cars))
        .route("/api/cars/:id", get(get_car))
        .route("/api/cars/:id/lead", post(create_car_lead))
        .route("/api/leads", post(create_lead))
        .route("/api/verify-session", post(open_session))
        .route("/api/verify-car-code", post(verify_code))
        .route("/api/upload", post(stage_images))
        .route("/api/upload/:handle", delete(discard_image))
        .with_state(state)
}

async fn require_session_token(
    headers: HeaderMap,
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| ApiError::BadRequest("Missing Authorization header".to_string()))?;
    let token = auth_header
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::BadRequest("Invalid Authorization header format".to_string()))?;
    let session_id = validate_session_token(token, &state.config.session_secret)?;
    request.extensions_mut().insert(SessionToken(session_id));
    Ok(next.run(request).await)
}

async fn list_cars(
    State(state): State<AppState>,
    Query(filter): Query<CarFilter>,
) -> Result<Json<Vec<Car>>, ApiError> {
    let cars = state.listings.list_cars(filter).await?;
    Ok(Json(cars))
}

async fn get_car(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Car>, ApiError> {
    let car = state.listings.find_car(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(car))
}

#[derive(Debug, Serialize)]
pub struct OpenSessionResponse {
    pub session_id: Uuid,
    pub max_attempts: u32,
}

async fn open_session(State(state): State<AppState>) -> Json<OpenSessionResponse> {
    let session_id = state.gate.sessions().open();
    Json(OpenSessionResponse {
        session_id,
        max_attempts: MAX_ATTEMPTS,
    })
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub session_id: Uuid,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyCodeResponse {
    pub valid: bool,
    pub token: String,
}

async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<Json<VerifyCodeResponse>, ApiError> {
    state.gate.attempt(payload.session_id, &payload.code)?;
    let token = issue_session_token(payload.session_id, &state.config.session_secret)
        .map_err(|e| ApiError::Verification(VerificationError::Transport(e.to_string())))?;
    Ok(Json(VerifyCodeResponse { valid: true, token }))
}

#[derive(Debug, Serialize)]
pub struct StagedPreview {
    pub handle: Uuid,
    pub file_name: String,
}

/// Stages uploaded files as previews. Non-image parts are skipped, the
/// same filter the browser applies on selection.
async fn stage_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<StagedPreview>>, ApiError> {
    let mut previews = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let file_name = match field.file_name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        let content_type = field.content_type().unwrap_or("").to_string();
        if !content_type.starts_with("image/") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let handle = state.stager.stage(StagedFile {
            file_name: file_name.clone(),
            content_type,
            bytes: bytes.to_vec(),
        })?;
        previews.push(StagedPreview { handle, file_name });
    }
    if previews.is_empty() {
        return Err(ApiError::BadRequest("no image file provided".to_string()));
    }
    Ok(Json(previews))
}

async fn discard_image(State(state): State<AppState>, Path(handle): Path<Uuid>) -> StatusCode {
    state.stager.discard(handle);
    StatusCode::NO_CONTENT
}

/// Gated listing creation: validated draft, verified session, image
/// resolution, single insert. One verified session creates one listing.
async fn create_car(
    State(state): State<AppState>,
    Extension(SessionToken(session_id)): Extension<SessionToken>,
    Json(form): Json<CarForm>,
) -> Result<(StatusCode, Json<Car>), ApiError> {
    let mut submission = Submission::new(form);
    submission.submit().map_err(ApiError::Validation)?;

    let sessions = state.gate.sessions();
    if sessions.is_locked(session_id)? {
        submission.verification_failed(true).map_err(ApiError::from)?;
        return Err(VerificationError::Locked.into());
    }
    if !sessions.is_verified(session_id)? {
        return Err(VerificationError::NotVerified.into());
    }
    submission.verification_succeeded().map_err(ApiError::from)?;

    let car = state.submitter.run(&mut submission).await?;
    sessions.close(session_id);
    info!("car {} created via verified session {}", car.id, session_id);
    Ok((StatusCode::CREATED, Json(car)))
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    #[serde(flatten)]
    pub form: LeadForm,
    #[serde(default)]
    pub car_id: Option<Uuid>,
}

async fn create_lead(
    State(state): State<AppState>,
    Json(payload): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<LeadReceipt>), ApiError> {
    let receipt = state.leads.submit(payload.form, payload.car_id).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn create_car_lead(
    State(state): State<AppState>,
    Path(car_id): Path<Uuid>,
    Json(form): Json<LeadForm>,
) -> Result<(StatusCode, Json<LeadReceipt>), ApiError> {
    let receipt = state.leads.submit(form, Some(car_id)).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
