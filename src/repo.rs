use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    /// A unique index rejected the write.
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fast-path uniqueness probe: any user holding either value.
    async fn find_by_username_or_email(&self, username: &str, email: &str) -> RepoResult<Option<User>>;
    /// Insert and return the new id. Uniqueness of `username` and `email` is
    /// enforced here, independently of any earlier probe.
    async fn create_user(&self, new: NewUser) -> RepoResult<Id>;
    /// Sanitized read: never includes password or refresh token.
    async fn find_by_id(&self, id: Id) -> RepoResult<Option<User>>;
    /// Full row, secrets included. For credential checks only.
    async fn find_record_by_username(&self, username: &str) -> RepoResult<Option<UserRecord>>;
    async fn count_users(&self) -> RepoResult<i64>;
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    #[derive(Default)]
    struct State {
        users: HashMap<Id, UserRecord>,
        next_id: Id,
    }

    /// Process-local store. The uniqueness check and the insert happen under
    /// one write lock, which plays the role of the database unique index.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }
    }

    fn poisoned<T>(_: T) -> RepoError {
        RepoError::Internal("in-memory store lock poisoned".into())
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn find_by_username_or_email(&self, username: &str, email: &str) -> RepoResult<Option<User>> {
            let s = self.state.read().map_err(poisoned)?;
            Ok(s.users
                .values()
                .find(|u| u.username == username || u.email == email)
                .map(UserRecord::sanitized))
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<Id> {
            let mut s = self.state.write().map_err(poisoned)?;
            if s.users.values().any(|u| u.username == new.username || u.email == new.email) {
                return Err(RepoError::Conflict);
            }
            s.next_id += 1;
            let id = s.next_id;
            let now = Utc::now();
            s.users.insert(id, UserRecord {
                id,
                username: new.username,
                email: new.email,
                fullname: new.fullname,
                avatar: new.avatar,
                cover_image: new.cover_image,
                watch_history: Vec::new(),
                password: new.password.into_string(),
                refresh_token: None,
                created_at: now,
                updated_at: now,
            });
            Ok(id)
        }

        async fn find_by_id(&self, id: Id) -> RepoResult<Option<User>> {
            let s = self.state.read().map_err(poisoned)?;
            Ok(s.users.get(&id).map(UserRecord::sanitized))
        }

        async fn find_record_by_username(&self, username: &str) -> RepoResult<Option<UserRecord>> {
            let s = self.state.read().map_err(poisoned)?;
            Ok(s.users.values().find(|u| u.username == username).cloned())
        }

        async fn count_users(&self) -> RepoResult<i64> {
            let s = self.state.read().map_err(poisoned)?;
            Ok(s.users.len() as i64)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const USER_COLUMNS: &str =
        "id, username, email, fullname, avatar, cover_image, watch_history, created_at, updated_at";

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Apply the embedded migrations (users + videos tables and their indexes).
        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    fn map_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
            other => RepoError::Internal(other.to_string()),
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn find_by_username_or_email(&self, username: &str, email: &str) -> RepoResult<Option<User>> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $2 LIMIT 1");
            sqlx::query_as::<_, User>(&sql)
                .bind(username)
                .bind(email)
                .fetch_optional(&self.pool).await.map_err(map_err)
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<Id> {
            sqlx::query_scalar::<_, Id>(
                "INSERT INTO users (username, email, fullname, avatar, cover_image, password) \
                 VALUES ($1,$2,$3,$4,$5,$6) RETURNING id"
            )
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.fullname)
            .bind(&new.avatar)
            .bind(&new.cover_image)
            .bind(new.password.as_str())
            .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn find_by_id(&self, id: Id) -> RepoResult<Option<User>> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(map_err)
        }

        async fn find_record_by_username(&self, username: &str) -> RepoResult<Option<UserRecord>> {
            let sql = format!("SELECT {USER_COLUMNS}, password, refresh_token FROM users WHERE username = $1");
            sqlx::query_as::<_, UserRecord>(&sql)
                .bind(username)
                .fetch_optional(&self.pool).await.map_err(map_err)
        }

        async fn count_users(&self) -> RepoResult<i64> {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool).await.map_err(map_err)
        }
    }
}
