use std::time::Duration;

use chrono::Utc;
use vidtube::auth::{TokenConfig, TokenIssuer};
use vidtube::models::User;

fn issuer() -> TokenIssuer {
    TokenIssuer::new(&TokenConfig {
        access_secret: "access-secret-abcdefghijklmnopqrstuvwxyz".into(),
        access_ttl: Duration::from_secs(60 * 60),
        refresh_secret: "refresh-secret-abcdefghijklmnopqrstuvwxyz".into(),
        refresh_ttl: Duration::from_secs(10 * 24 * 60 * 60),
    })
}

fn user() -> User {
    User {
        id: 7,
        username: "alice".into(),
        email: "a@x.io".into(),
        fullname: "Alice A".into(),
        avatar: "http://a".into(),
        cover_image: String::new(),
        watch_history: Vec::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn access_token_round_trip() {
    let t = issuer();
    let token = t.issue_access(&user()).unwrap();
    let claims = t.verify_access(&token).unwrap();
    assert_eq!(claims.id, 7);
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.email, "a@x.io");
    assert_eq!(claims.fullname, "Alice A");
    assert_eq!(claims.exp - claims.iat, 3600);
}

#[test]
fn refresh_token_round_trip_carries_only_id() {
    let t = issuer();
    let token = t.issue_refresh(7).unwrap();
    let claims = t.verify_refresh(&token).unwrap();
    assert_eq!(claims.id, 7);
    assert_eq!(claims.exp - claims.iat, 864_000);

    let raw = jsonwebtoken::decode::<serde_json::Value>(
        &token,
        &jsonwebtoken::DecodingKey::from_secret(b"refresh-secret-abcdefghijklmnopqrstuvwxyz"),
        &jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256),
    )
    .unwrap();
    let mut keys: Vec<_> = raw.claims.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, ["_id", "exp", "iat"]);
}

#[test]
fn kinds_are_not_interchangeable() {
    let t = issuer();
    let access = t.issue_access(&user()).unwrap();
    let refresh = t.issue_refresh(7).unwrap();
    assert!(t.verify_refresh(&access).is_err());
    assert!(t.verify_access(&refresh).is_err());
}

#[test]
fn foreign_signature_is_rejected() {
    let other = TokenIssuer::new(&TokenConfig {
        access_secret: "x".repeat(40),
        access_ttl: Duration::from_secs(60),
        refresh_secret: "y".repeat(40),
        refresh_ttl: Duration::from_secs(60),
    });
    let token = other.issue_access(&user()).unwrap();
    assert!(issuer().verify_access(&token).is_err());
}
