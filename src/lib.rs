pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod openapi;
pub mod password;
pub mod rate_limit; // in-memory rate limiting
pub mod registration;
pub mod repo;
pub mod response;
pub mod routes;
pub mod staging;
pub mod storage; // media host uploads

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
