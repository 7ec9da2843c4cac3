use std::convert::Infallible;

use serde::Serialize;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::{Reject, Rejection};
use warp::Reply;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("authentication credentials were not provided")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn validation(info: impl Into<String>) -> Self {
        Self::Validation(info.into())
    }

    pub fn not_found(info: impl Into<String>) -> Self {
        Self::NotFound(info.into())
    }

    pub fn forbidden(info: impl Into<String>) -> Self {
        Self::Forbidden(info.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// warp's blanket `impl<T: Reject> From<T> for Rejection` supplies the
// `?`/`.into()` conversions from here.
impl Reject for ApiError {}

#[derive(Serialize)]
struct ErrorBody {
    errors: String,
}

/// Maps rejections to the structured `{"errors": ...}` body the API speaks.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, String::from("resource not found"))
    } else if let Some(e) = err.find::<ApiError>() {
        match e {
            ApiError::Internal(_) | ApiError::Database(_) => {
                log::error!("internal error: {e}");
                (e.status(), String::from("internal server error"))
            }
            _ => (e.status(), e.to_string()),
        }
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            String::from("method not allowed"),
        )
    } else {
        log::error!("unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            String::from("internal server error"),
        )
    };

    let body = warp::reply::json(&ErrorBody { errors: message });
    Ok(warp::reply::with_status(body, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn status_of(err: ApiError) -> StatusCode {
        let rejection: Rejection = err.into();
        handle_rejection(rejection)
            .await
            .map(|reply| reply.into_response().status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    #[tokio::test]
    async fn rejections_map_to_their_status() {
        assert_eq!(status_of(ApiError::validation("bad")).await, StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ApiError::not_found("gone")).await, StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(ApiError::Unauthenticated).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(ApiError::forbidden("no")).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ApiError::Internal(String::from("boom"))).await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn rejection_carries_the_error_back() {
        let rejection: Rejection = ApiError::validation("field `name` is required").into();
        let found = rejection.find::<ApiError>();
        assert!(matches!(found, Some(ApiError::Validation(_))));
    }
}
