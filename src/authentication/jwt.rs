use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::error::ApiError;
use crate::database::schema::{User, UserRole};

use super::permissions::ActionType;

const SESSION_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: i32,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: i32, email: String, username: String, role: UserRole) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + Duration::hours(SESSION_LIFETIME_HOURS)).timestamp();

        Self {
            user_id: id,
            email,
            username,
            role,
            iat,
            exp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: i32,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authorize(&self, action: ActionType) -> Result<(), ApiError> {
        if !action.permitted(self) {
            return Err(ApiError::forbidden(
                "you do not have permission to perform this action",
            ));
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(data: JwtSessionData) -> Self {
        Self {
            user_id: data.user_id,
            email: data.email,
            username: data.username,
            is_admin: data.role == UserRole::Admin,
            role: data.role,
        }
    }
}

fn session_key(secret: &[u8]) -> Hmac<Sha256> {
    // HMAC accepts keys of any length
    Hmac::new_from_slice(secret).expect("HMAC key setup")
}

pub fn generate_jwt_session(user: &User, secret: &[u8]) -> Result<String, ApiError> {
    let claims = JwtSessionData::new(
        user.id,
        user.email.to_owned(),
        user.username.to_owned(),
        user.role.to_owned(),
    );

    claims
        .sign_with_key(&session_key(secret))
        .map_err(|e| ApiError::Internal(format!("failed to sign session token: {e}")))
}

pub fn verify_jwt_session(token: &str, secret: &[u8]) -> Result<JwtSessionData, ApiError> {
    let session: JwtSessionData = token
        .verify_with_key(&session_key(secret))
        .map_err(|_| ApiError::Unauthenticated)?;

    let now = Local::now().timestamp();
    if session.exp <= now {
        return Err(ApiError::Unauthenticated);
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            email: String::from("kokki@example.org"),
            username: String::from("kokki"),
            first_name: String::from("Kaisa"),
            last_name: String::from("Korhonen"),
            password: String::from("$argon2id$..."),
            avatar: None,
            role: UserRole::User,
        }
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let token = generate_jwt_session(&user(), b"test-secret").unwrap();
        let session = verify_jwt_session(&token, b"test-secret").unwrap();
        assert_eq!(session.user_id, 7);
        assert_eq!(session.username, "kokki");
        assert_eq!(session.role, UserRole::User);
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = generate_jwt_session(&user(), b"test-secret").unwrap();
        assert!(verify_jwt_session(&token, b"other-secret").is_err());
    }

    #[test]
    fn tampered_token_rejected() {
        let token = generate_jwt_session(&user(), b"test-secret").unwrap();
        let mut tampered = token.into_bytes();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(verify_jwt_session(&tampered, b"test-secret").is_err());
    }

    #[test]
    fn admin_flag_follows_role() {
        let mut admin = user();
        admin.role = UserRole::Admin;
        let token = generate_jwt_session(&admin, b"test-secret").unwrap();
        let session: SessionData = verify_jwt_session(&token, b"test-secret").unwrap().into();
        assert!(session.is_admin);
    }
}
