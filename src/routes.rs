use std::sync::Arc;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web::http::StatusCode;
use actix_multipart::{Field, Multipart};
use futures_util::TryStreamExt as _;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::TokenIssuer;
use crate::error::ApiError;
use crate::rate_limit::RateLimiterFacade;
use crate::registration::{register_user, RegistrationForm};
use crate::repo::UserRepo;
use crate::response::ApiResponse;
use crate::staging::StagingArea;
use crate::storage::MediaUploader;

/// Cap for JSON / urlencoded bodies and for each multipart text field.
pub const BODY_LIMIT: usize = 16 * 1024;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(BODY_LIMIT)
            .error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::FormConfig::default()
            .limit(BODY_LIMIT)
            .error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    )
    .service(
        web::scope("/api/v1")
            .service(
                web::resource("/users/register")
                    .route(web::post().to(register))
                    .default_service(web::to(method_not_allowed)),
            ),
    );
}

#[derive(Clone, Debug)]
pub struct UploadLimits {
    pub max_file_bytes: usize,
    pub max_text_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self { max_file_bytes: 10 * 1024 * 1024, max_text_bytes: BODY_LIMIT }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn UserRepo>,
    pub uploader: Arc<dyn MediaUploader>,
    pub staging: StagingArea,
    pub tokens: Arc<TokenIssuer>,
    pub rate_limiter: Option<RateLimiterFacade>,
    pub limits: UploadLimits,
}

/// Multipart body accepted by the registration route (documentation only).
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct RegisterRequest {
    username: String,
    email: String,
    fullname: String,
    password: String,
    #[schema(value_type = String, format = Binary)]
    avatar: Vec<u8>,
    #[schema(value_type = Option<String>, format = Binary)]
    cover_image: Option<Vec<u8>>,
}

fn client_ip(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

#[utoipa::path(
    post,
    path = "/api/v1/users/register",
    tag = "users",
    request_body(content = RegisterRequest, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "User registered", body = crate::response::UserResponse),
        (status = 400, description = "Missing fields, missing avatar or failed upload", body = crate::error::ApiErrorBody),
        (status = 409, description = "Username or email already taken", body = crate::error::ApiErrorBody),
        (status = 429, description = "Too many registration attempts from this address", body = crate::error::ApiErrorBody)
    )
)]
pub async fn register(
    req: HttpRequest,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        let ip = client_ip(&req);
        if !rl.allow_register(&ip) {
            metrics::increment_counter!("rate_limited_total");
            tracing::warn!(%ip, "registration rate limit exceeded");
            return Err(ApiError::RateLimited);
        }
    }
    let form = read_registration_form(&mut payload, &data.staging, &data.limits).await?;
    let user = register_user(data.repo.as_ref(), data.uploader.as_ref(), form).await?;
    Ok(HttpResponse::Created().json(ApiResponse::new(StatusCode::CREATED, user, "User created successfully!")))
}

async fn read_field(field: &mut Field, limit: usize, name: &str) -> Result<Vec<u8>, ApiError> {
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| {
        log::error!("stream read error: {e}");
        ApiError::BadRequest(format!("Malformed multipart body: {e}"))
    })? {
        if bytes.len() + chunk.len() > limit {
            return Err(ApiError::BadRequest(format!("Field too large: {name}")));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Stream the multipart body: text fields into memory, `avatar` and
/// `coverImage` into the staging area (one file each).
async fn read_registration_form(
    payload: &mut Multipart,
    staging: &StagingArea,
    limits: &UploadLimits,
) -> Result<RegistrationForm, ApiError> {
    let mut form = RegistrationForm::default();
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::BadRequest(format!("Malformed multipart body: {e}"))
    })? {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let file_name = disposition.get_filename().map(str::to_string);

        let Some(file_name) = file_name else {
            let bytes = read_field(&mut field, limits.max_text_bytes, &name).await?;
            let text = String::from_utf8(bytes)
                .map_err(|_| ApiError::BadRequest(format!("Field is not valid UTF-8: {name}")))?;
            match name.as_str() {
                "username" => form.username = Some(text),
                "email" => form.email = Some(text),
                "fullname" => form.fullname = Some(text),
                "password" => form.password = Some(text),
                _ => {}
            }
            continue;
        };

        let slot = match name.as_str() {
            "avatar" => &mut form.avatar,
            "coverImage" => &mut form.cover_image,
            _ => return Err(ApiError::BadRequest(format!("Unexpected field: {name}"))),
        };
        let bytes = read_field(&mut field, limits.max_file_bytes, &name).await?;
        // An empty file input is submitted as a nameless, zero-length part.
        if file_name.is_empty() && bytes.is_empty() {
            continue;
        }
        if slot.is_some() {
            return Err(ApiError::BadRequest(format!("Unexpected field: {name}")));
        }
        let staged = staging
            .stage(&name, Some(file_name), &bytes)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to stage upload");
                ApiError::Internal
            })?;
        *slot = Some(staged);
    }
    Ok(form)
}

async fn method_not_allowed(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed(format!("Method not allowed: {} {}", req.method(), req.path())))
}

pub async fn route_not_found(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound(format!("Route not found: {} {}", req.method(), req.path())))
}
