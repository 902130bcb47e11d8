use axum::extract::{Path, State};
use serde_json::{json, Value};
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    extract::Json,
    middleware::CurrentUser,
    models::{Capability, CreateUser, Permission, PermissionRef, UpdateUserPermissions, User, UserResponse},
    state::AppState,
    utils::hash_password,
};

pub async fn current_user(user: CurrentUser) -> Json<Value> {
    Json(json!({
        "success": true,
        "user": user,
    }))
}

pub async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<UserResponse>>> {
    user.require(Capability::UserManage)?;

    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
        .fetch_all(&state.db)
        .await?;

    let mut responses = Vec::with_capacity(users.len());
    for u in users {
        let permissions = sqlx::query_as::<_, PermissionRef>(
            r#"
            SELECT p.id, p.name, p.description
            FROM permissions p
            JOIN user_permissions up ON up.permission_id = p.id
            WHERE up.user_id = $1
            ORDER BY p.id
            "#,
        )
        .bind(u.id)
        .fetch_all(&state.db)
        .await?;

        responses.push(UserResponse {
            id: u.id,
            username: u.username,
            is_admin: u.is_admin,
            last_login: u.last_login,
            permissions,
        });
    }

    Ok(Json(responses))
}

pub async fn create_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateUser>,
) -> AppResult<Json<Value>> {
    user.require(Capability::UserManage)?;

    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(AppError::validation("username and password are required"));
    }

    let password_hash =
        hash_password(&req.password).map_err(|e| AppError::Internal(e.to_string()))?;

    let mut tx = state.db.begin().await?;

    let created = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, password_hash, is_admin)
        VALUES ($1, $2, $3)
        ON CONFLICT (username) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(username)
    .bind(password_hash)
    .bind(req.is_admin)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::Conflict(format!("user {} already exists", username)))?;

    grant_permissions(&mut tx, created.id, &req.permissions).await?;
    tx.commit().await?;

    log::info!("user {} ({}) created by {}", created.username, created.id, user.username);

    Ok(Json(json!({
        "success": true,
        "message": "user created",
        "user": created,
    })))
}

pub async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Value>> {
    user.require(Capability::UserManage)?;

    if user_id == user.id {
        return Err(AppError::validation("you cannot delete your own account"));
    }

    let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&state.db)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::not_found(format!("user {} not found", user_id)));
    }

    log::info!("user {} deleted by {}", user_id, user.username);

    Ok(Json(json!({
        "success": true,
        "message": "user deleted",
    })))
}

/// Replaces a user's granted permissions, and optionally the admin flag.
pub async fn update_user_permissions(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<i32>,
    Json(req): Json<UpdateUserPermissions>,
) -> AppResult<Json<Value>> {
    user.require(Capability::UserManage)?;

    let mut tx = state.db.begin().await?;

    let target = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {} not found", user_id)))?;

    if let Some(is_admin) = req.is_admin {
        sqlx::query("UPDATE users SET is_admin = $1 WHERE id = $2")
            .bind(is_admin)
            .bind(target.id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
        .bind(target.id)
        .execute(&mut *tx)
        .await?;
    grant_permissions(&mut tx, target.id, &req.permissions).await?;

    tx.commit().await?;

    log::info!(
        "permissions of {} set to {:?} by {}",
        target.username, req.permissions, user.username
    );

    Ok(Json(json!({
        "success": true,
        "message": "permissions updated",
    })))
}

pub async fn list_permissions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Permission>>> {
    user.require(Capability::UserManage)?;

    let permissions = sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY id")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(permissions))
}

/// Unknown permission ids are ignored.
async fn grant_permissions(
    conn: &mut PgConnection,
    user_id: i32,
    permission_ids: &[i32],
) -> Result<(), sqlx::Error> {
    if permission_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO user_permissions (user_id, permission_id)
        SELECT $1, p.id FROM permissions p WHERE p.id = ANY($2)
        ON CONFLICT ON CONSTRAINT unique_user_permission DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(permission_ids)
    .execute(conn)
    .await?;

    Ok(())
}
