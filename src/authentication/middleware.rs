use std::sync::Arc;

use warp::{reject::Rejection, Filter};

use crate::config::Config;
use crate::constants::SESSION_COOKIE;
use crate::error::ApiError;

use super::jwt::{verify_jwt_session, SessionData};

/// Requires a valid session cookie; rejects with 401 otherwise.
pub fn with_session(
    config: Arc<Config>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE).and_then(move |cookie: Option<String>| {
        let config = config.clone();
        async move {
            match cookie {
                Some(token) => verify_jwt_session(&token, config.jwt_secret.as_bytes())
                    .map(SessionData::from)
                    .map_err(Rejection::from),
                None => Err(ApiError::Unauthenticated.into()),
            }
        }
    })
}

/// Extracts the session when present and valid; anonymous callers pass
/// through as `None`.
pub fn with_possible_session(
    config: Arc<Config>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE).and_then(move |cookie: Option<String>| {
        let config = config.clone();
        async move {
            Ok::<_, Rejection>(
                cookie
                    .and_then(|token| verify_jwt_session(&token, config.jwt_secret.as_bytes()).ok())
                    .map(SessionData::from),
            )
        }
    })
}
