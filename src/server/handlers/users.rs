use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{Pool, Postgres};
use warp::http::StatusCode;
use warp::reject::Rejection;
use warp::reply::{self, Reply};

use crate::authentication::jwt::SessionData;
use crate::authentication::permissions::ActionType;
use crate::config::Config;
use crate::constants::{SESSION_COOKIE, USER_COUNT_PER_PAGE};
use crate::database::actions::{subscriptions, users};
use crate::error::ApiError;
use crate::pagination::{PageContext, PageQuery};
use crate::payload::{parse_avatar, LoginPayload, ProfilePayload, RegisterPayload};
use crate::schema::{Id, User, UserProfile};

/// `recipes_limit` arrives as an opaque string: a non-numeric or negative
/// value means "no truncation" rather than a 400.
#[derive(Deserialize, Debug, Default)]
pub struct SubscribeQuery {
    pub recipes_limit: Option<String>,
}

impl SubscribeQuery {
    fn limit(&self) -> Option<i64> {
        self.recipes_limit
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|limit| *limit >= 0)
    }
}

pub async fn register(body: Value, pool: Pool<Postgres>) -> Result<impl Reply, Rejection> {
    let payload = RegisterPayload::parse(body)?;
    let user = users::register_user(&payload, &pool).await?;

    Ok(reply::with_status(
        reply::json(&UserProfile::from_user(&user, false)),
        StatusCode::CREATED,
    ))
}

/// Issues a session token, both as an HttpOnly cookie and in the body.
pub async fn login(
    body: Value,
    pool: Pool<Postgres>,
    config: Arc<Config>,
) -> Result<impl Reply, Rejection> {
    let payload = LoginPayload::parse(body)?;
    let (token, user) = users::login_user(
        &payload.email,
        &payload.password,
        config.jwt_secret.as_bytes(),
        &pool,
    )
    .await?;

    log::info!("user {} logged in", user.username);

    Ok(reply::with_header(
        reply::json(&json!({ "auth_token": token })),
        "set-cookie",
        format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/"),
    ))
}

pub async fn logout(_session: SessionData) -> Result<impl Reply, Rejection> {
    Ok(reply::with_header(
        reply::with_status(reply::reply(), StatusCode::NO_CONTENT),
        "set-cookie",
        format!("{SESSION_COOKIE}=; HttpOnly; Path=/; Max-Age=0"),
    ))
}

pub async fn list_users(
    query: PageQuery,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let limit = query.limit_or(USER_COUNT_PER_PAGE);
    let page = users::fetch_users(limit, query.offset(), &pool).await?;

    let viewer = session.as_ref().map(|s| s.user_id);
    let profiles = users::profiles_for(&page.rows, viewer, &pool).await?;
    let page = PageContext {
        rows: profiles,
        total_rows: page.total_rows,
        next_offset: page.next_offset,
        prev_offset: page.prev_offset,
    };

    Ok(reply::json(&page))
}

pub async fn get_user(
    id: Id,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let user = require_user(id, &pool).await?;
    let viewer = session.as_ref().map(|s| s.user_id);
    let profiles = users::profiles_for(std::slice::from_ref(&user), viewer, &pool).await?;
    let profile = profiles
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal(format!("user {id} vanished during projection")))?;

    Ok(reply::json(&profile))
}

pub async fn me(session: SessionData, pool: Pool<Postgres>) -> Result<impl Reply, Rejection> {
    let user = require_user(session.user_id, &pool).await?;
    Ok(reply::json(&UserProfile::from_user(&user, false)))
}

pub async fn update_me(
    session: SessionData,
    body: Value,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    session.authorize(ActionType::ManageOwnProfile)?;
    let update = ProfilePayload::parse(body)?;
    users::update_profile(session.user_id, &update, &pool).await?;

    let user = require_user(session.user_id, &pool).await?;
    Ok(reply::json(&UserProfile::from_user(&user, false)))
}

pub async fn set_avatar(
    session: SessionData,
    body: Value,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    session.authorize(ActionType::ManageOwnProfile)?;
    let avatar = parse_avatar(body)?;
    users::set_avatar(session.user_id, &avatar, &pool).await?;

    Ok(reply::json(&json!({ "avatar": avatar })))
}

pub async fn delete_avatar(
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    session.authorize(ActionType::ManageOwnProfile)?;
    users::clear_avatar(session.user_id, &pool).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// The viewer's subscription feed: every followed author with their
/// recipes, paginated over authors.
pub async fn list_subscriptions(
    page_query: PageQuery,
    feed_query: SubscribeQuery,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    session.authorize(ActionType::ManageOwnSubscriptions)?;

    let limit = page_query.limit_or(USER_COUNT_PER_PAGE);
    let page = subscriptions::fetch_subscriptions(session.user_id, limit, page_query.offset(), &pool)
        .await?;

    let recipes_limit = feed_query.limit();
    let mut entries = Vec::with_capacity(page.rows.len());
    for author in &page.rows {
        entries.push(subscriptions::subscription_entry(author, true, recipes_limit, &pool).await?);
    }
    let page = PageContext {
        rows: entries,
        total_rows: page.total_rows,
        next_offset: page.next_offset,
        prev_offset: page.prev_offset,
    };

    Ok(reply::json(&page))
}

pub async fn subscribe(
    id: Id,
    feed_query: SubscribeQuery,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    session.authorize(ActionType::ManageOwnSubscriptions)?;

    let target = require_user(id, &pool).await?;
    subscriptions::subscribe(session.user_id, &target, &pool).await?;

    let entry =
        subscriptions::subscription_entry(&target, true, feed_query.limit(), &pool).await?;
    Ok(reply::with_status(
        reply::json(&entry),
        StatusCode::CREATED,
    ))
}

pub async fn unsubscribe(
    id: Id,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    session.authorize(ActionType::ManageOwnSubscriptions)?;

    let target = require_user(id, &pool).await?;
    subscriptions::unsubscribe(session.user_id, &target, &pool).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn require_user(id: Id, pool: &Pool<Postgres>) -> Result<User, ApiError> {
    users::get_user_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))
}

#[cfg(test)]
mod tests {
    use super::SubscribeQuery;

    #[test]
    fn recipes_limit_is_lenient() {
        let limit = |raw: &str| SubscribeQuery {
            recipes_limit: Some(raw.to_string()),
        }
        .limit();

        assert_eq!(limit("3"), Some(3));
        assert_eq!(limit("0"), Some(0));
        assert_eq!(limit("-1"), None);
        assert_eq!(limit("three"), None);
        assert_eq!(SubscribeQuery::default().limit(), None);
    }
}
