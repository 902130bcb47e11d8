use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_cookies::Cookies;

use crate::{
    database::Database,
    error::{AppError, AppResult},
    models::{Capability, User},
    state::AppState,
    utils::{verify_token, TokenError},
};

pub const AUTH_COOKIE: &str = "auth_token";

/// The authenticated caller, resolved once per request.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
    pub current_merchant_id: Option<i32>,
    pub permissions: Vec<String>,
}

impl CurrentUser {
    pub fn from_user_and_permissions(user: User, permissions: Vec<String>) -> Self {
        Self {
            id: user.id,
            username: user.username,
            is_admin: user.is_admin,
            current_merchant_id: user.current_merchant_id,
            permissions,
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.is_admin || self.permissions.iter().any(|p| p == capability.name())
    }

    pub fn require(&self, capability: Capability) -> AppResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "missing permission: {}",
                capability.name()
            )))
        }
    }

    pub fn require_any(&self, capabilities: &[Capability]) -> AppResult<()> {
        if capabilities.iter().any(|c| self.can(*c)) {
            Ok(())
        } else {
            Err(AppError::Forbidden("permission denied".to_string()))
        }
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("only administrators can do this".to_string()))
        }
    }

    /// The tenant every data query of this request is scoped to.
    pub fn merchant_id(&self) -> AppResult<i32> {
        self.current_merchant_id.ok_or(AppError::NoMerchant)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Internal(msg.to_string()))?;

        get_current_user(&cookies, state).await
    }
}

pub async fn get_current_user(cookies: &Cookies, state: &AppState) -> AppResult<CurrentUser> {
    let token = cookies
        .get(AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthorized)?;

    let claims = verify_token(&state.config.jwt_secret, &token).map_err(|e| match e {
        TokenError::Expired => AppError::SessionExpired,
        TokenError::Invalid => AppError::Unauthorized,
    })?;

    let (user_id, session_id) = match (claims.user_id(), claims.session_id()) {
        (Some(user_id), Some(session_id)) => (user_id, session_id),
        _ => return Err(AppError::Unauthorized),
    };

    let session = sqlx::query_as::<_, (Option<DateTime<Utc>>, DateTime<Utc>)>(
        "SELECT revoked_at, expires_at FROM sessions WHERE id = $1 AND user_id = $2",
    )
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?;

    check_session(session, Utc::now())?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let permissions = get_user_permissions(&state.db, &user).await?;

    Ok(CurrentUser::from_user_and_permissions(user, permissions))
}

/// A logged-out or unknown session is unauthorized; only a session that ran
/// past its lifetime reports expiry.
fn check_session(
    session: Option<(Option<DateTime<Utc>>, DateTime<Utc>)>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    match session {
        None | Some((Some(_), _)) => Err(AppError::Unauthorized),
        Some((None, expires_at)) if expires_at <= now => Err(AppError::SessionExpired),
        Some((None, _)) => Ok(()),
    }
}

/// Permission names held by `user`; administrators hold every permission.
pub async fn get_user_permissions(db: &Database, user: &User) -> Result<Vec<String>, sqlx::Error> {
    if user.is_admin {
        return sqlx::query_scalar::<_, String>("SELECT name FROM permissions ORDER BY id")
            .fetch_all(db)
            .await;
    }

    sqlx::query_scalar::<_, String>(
        r#"
        SELECT p.name
        FROM permissions p
        JOIN user_permissions up ON up.permission_id = p.id
        WHERE up.user_id = $1
        ORDER BY p.id
        "#,
    )
    .bind(user.id)
    .fetch_all(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_admin: bool, permissions: &[&str]) -> CurrentUser {
        CurrentUser {
            id: 7,
            username: "clerk".into(),
            is_admin,
            current_merchant_id: None,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn capabilities_are_checked_against_granted_names() {
        let clerk = user(false, &["incoming_operate", "stock_view"]);
        assert!(clerk.require(Capability::IncomingOperate).is_ok());
        assert!(matches!(
            clerk.require(Capability::OutgoingOperate),
            Err(AppError::Forbidden(_))
        ));
        assert!(clerk
            .require_any(&[Capability::LocationQuery, Capability::StockView])
            .is_ok());
        assert!(clerk.require_admin().is_err());
    }

    #[test]
    fn admins_bypass_capability_checks() {
        let admin = user(true, &[]);
        for capability in Capability::ALL {
            assert!(admin.can(capability));
        }
        assert!(admin.require_admin().is_ok());
    }

    #[test]
    fn no_current_merchant_is_a_validation_error() {
        assert!(matches!(user(true, &[]).merchant_id(), Err(AppError::NoMerchant)));
    }

    #[test]
    fn record_edits_need_their_own_grant() {
        let viewer = user(false, &["records_view"]);
        assert!(matches!(
            viewer.require(Capability::RecordEdit),
            Err(AppError::Forbidden(_))
        ));
        assert!(user(false, &["record_edit"]).require(Capability::RecordEdit).is_ok());
    }

    #[test]
    fn revoked_sessions_are_unauthorized_not_expired() {
        let now = Utc::now();
        let later = now + chrono::Duration::hours(1);
        let earlier = now - chrono::Duration::hours(1);

        assert!(check_session(Some((None, later)), now).is_ok());
        assert!(matches!(
            check_session(Some((Some(earlier), later)), now),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            check_session(Some((Some(earlier), earlier)), now),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(check_session(None, now), Err(AppError::Unauthorized)));
        assert!(matches!(
            check_session(Some((None, earlier)), now),
            Err(AppError::SessionExpired)
        ));
    }
}
