use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{Duration, Utc};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub sid: String, // session id
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: i32, session_id: Uuid, ttl_secs: i64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::seconds(ttl_secs);

        Self {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sid).ok()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

pub fn create_token(
    secret: &str,
    user_id: i32,
    session_id: Uuid,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims::new(user_id, session_id, ttl_secs);

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, TokenError> {
    // The login lifetime is absolute, so no grace period.
    let mut validation = Validation::default();
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(password, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_keeps_user_and_session() {
        let sid = Uuid::new_v4();
        let token = create_token("secret", 42, sid, 3600).unwrap();
        let claims = verify_token("secret", &token).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        assert_eq!(claims.session_id(), Some(sid));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn expired_tokens_are_distinguished_from_bad_ones() {
        let token = create_token("secret", 1, Uuid::new_v4(), -10).unwrap();
        assert_eq!(verify_token("secret", &token).unwrap_err(), TokenError::Expired);

        let token = create_token("secret", 1, Uuid::new_v4(), 3600).unwrap();
        assert_eq!(verify_token("other", &token).unwrap_err(), TokenError::Invalid);
        assert_eq!(verify_token("secret", "garbage").unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn password_hashes_verify() {
        let hash = bcrypt::hash("admin123", 4).unwrap();
        assert!(verify_password("admin123", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
        assert!(verify_password("admin123", "not-a-bcrypt-hash").is_err());
    }
}
