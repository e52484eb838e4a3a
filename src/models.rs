use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::password::HashedPassword;

pub type Id = i64;

/// Client-facing view of a user. Secrets are not part of this type, so they
/// cannot leak through serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: String,
    pub cover_image: String,
    pub watch_history: Vec<Id>, // video ids
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full stored row, including the password hash and refresh token.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: String,
    pub cover_image: String,
    pub watch_history: Vec<Id>,
    pub password: String,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Project out `password` and `refresh_token`.
    pub fn sanitized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            fullname: self.fullname.clone(),
            avatar: self.avatar.clone(),
            cover_image: self.cover_image.clone(),
            watch_history: self.watch_history.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Insert payload. Callers normalize the text fields; the password can only
/// arrive here already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: String,
    pub cover_image: String,
    pub password: HashedPassword,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[serde(rename = "_id")]
    pub id: Id,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64, // seconds, as reported by the media host
    pub views: i64,
    pub is_published: bool,
    pub owner: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
