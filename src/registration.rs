use actix_web::web;
use tracing::{error, info};

use crate::error::ApiError;
use crate::models::{NewUser, User};
use crate::password::hash_password;
use crate::repo::UserRepo;
use crate::staging::StagedFile;
use crate::storage::{upload_on_media_host, MediaUploader};

/// Raw registration input as it arrives from the multipart body.
#[derive(Debug, Default)]
pub struct RegistrationForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub fullname: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<StagedFile>,
    pub cover_image: Option<StagedFile>,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.trim().is_empty())
}

fn reject(reason: &'static str, err: ApiError) -> ApiError {
    metrics::increment_counter!("registrations_rejected_total", "reason" => reason);
    err
}

/// Validate, upload media, hash, persist and read back a new user.
///
/// Staged files are owned by `form` and removed whichever way this returns.
pub async fn register_user(
    repo: &dyn UserRepo,
    uploader: &dyn MediaUploader,
    form: RegistrationForm,
) -> Result<User, ApiError> {
    let (Some(username), Some(email), Some(fullname), Some(password)) = (
        present(&form.username),
        present(&form.email),
        present(&form.fullname),
        present(&form.password),
    ) else {
        return Err(reject("validation", ApiError::Validation("All fields are required!".into())));
    };

    let username = username.trim().to_lowercase();
    let email = email.trim().to_string();
    let fullname = fullname.trim().to_string();
    let password = password.to_string();

    let RegistrationForm { avatar, cover_image, .. } = form;
    let Some(avatar) = avatar else {
        return Err(reject("validation", ApiError::Validation("Avatar is required!".into())));
    };

    if repo.find_by_username_or_email(&username, &email).await?.is_some() {
        return Err(reject("conflict", ApiError::Conflict));
    }

    let avatar = upload_on_media_host(uploader, Some(avatar))
        .await
        .filter(|m| !m.url.trim().is_empty())
        .ok_or_else(|| reject("upload", ApiError::Upload("Avatar upload failed!".into())))?;
    let cover_image = upload_on_media_host(uploader, cover_image)
        .await
        .map(|m| m.url)
        .unwrap_or_default();

    let password = web::block(move || hash_password(&password))
        .await
        .map_err(|e| {
            error!(error = %e, "password hashing task failed");
            ApiError::Internal
        })?
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            ApiError::Internal
        })?;

    let id = repo
        .create_user(NewUser {
            username,
            email,
            fullname,
            avatar: avatar.url,
            cover_image,
            password,
        })
        .await
        .map_err(|e| reject("store", e.into()))?;

    let created = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| reject("persistence", ApiError::Persistence("User creation failed!".into())))?;

    metrics::increment_counter!("registrations_total");
    info!(user_id = created.id, username = %created.username, "user registered");
    Ok(created)
}
