use axum::extract::State;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::{
    database::Database,
    error::{AppError, AppResult},
    extract::Json,
    middleware::{CurrentUser, AUTH_COOKIE},
    models::{LoginRequest, User},
    state::AppState,
    utils::{create_token, verify_password, verify_token},
};

pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    let user = match authenticate_user(&state.db, &req.username, &req.password).await? {
        Some(user) => user,
        None => {
            log::warn!("failed login for {}", req.username);
            return Err(AppError::Unauthorized);
        }
    };

    let ttl = state.config.session_ttl_secs;
    let session_id = Uuid::new_v4();
    let token = create_token(&state.config.jwt_secret, user.id, session_id, ttl)
        .map_err(|e| AppError::Internal(format!("failed to issue token: {}", e)))?;

    // The session row backs logout; the token's exp alone bounds its lifetime.
    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(session_id)
        .bind(user.id)
        .bind(Utc::now() + Duration::seconds(ttl))
        .execute(&state.db)
        .await?;

    sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(&state.db)
        .await?;

    let cookie = Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(ttl))
        .build();
    cookies.add(cookie);

    log::info!("{} logged in (session {})", user.username, session_id);

    Ok(Json(json!({
        "success": true,
        "message": "logged in",
        "user": {
            "id": user.id,
            "username": user.username,
            "is_admin": user.is_admin,
        },
    })))
}

/// Revokes the session behind the cookie, if any, and clears the cookie.
/// Expired or foreign tokens are just dropped.
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> AppResult<Json<Value>> {
    if let Some(cookie) = cookies.get(AUTH_COOKIE) {
        if let Some(session_id) = verify_token(&state.config.jwt_secret, cookie.value())
            .ok()
            .and_then(|claims| claims.session_id())
        {
            sqlx::query("UPDATE sessions SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL")
                .bind(session_id)
                .execute(&state.db)
                .await?;
            log::info!("session {} revoked", session_id);
        }
    }

    cookies.remove(Cookie::build(AUTH_COOKIE).path("/").build());

    Ok(Json(json!({
        "success": true,
        "message": "logged out",
    })))
}

/// Rejection is handled by the extractor: 401, with `expired: true` once the
/// login lifetime has passed.
pub async fn check_session(user: CurrentUser) -> Json<Value> {
    Json(json!({
        "success": true,
        "username": user.username,
    }))
}

async fn authenticate_user(
    db: &Database,
    username: &str,
    password: &str,
) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(db)
        .await?;

    match user {
        Some(user) if password_matches(password, &user.password_hash)? => Ok(Some(user)),
        _ => Ok(None),
    }
}

/// A stored hash bcrypt cannot read is a server fault, not a wrong password.
fn password_matches(password: &str, hash: &str) -> AppResult<bool> {
    verify_password(password, hash)
        .map_err(|e| AppError::Internal(format!("password check failed: {}", e)))
}
