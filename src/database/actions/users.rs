use sqlx::{Pool, Postgres};

use crate::authentication::cryptography::{hash_password, verify_password};
use crate::authentication::jwt::generate_jwt_session;
use crate::error::ApiError;
use crate::pagination::PageContext;
use crate::payload::{ProfilePayload, RegisterPayload};
use crate::schema::{Id, User, UserProfile, UserRow};

use super::subscriptions;

pub async fn get_user_by_email(
    pool: &Pool<Postgres>,
    email: &str,
) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Id) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Creates a user from a validated registration payload. The password is
/// stored argon2-hashed; an email or username collision is a 400.
pub async fn register_user(
    payload: &RegisterPayload,
    pool: &Pool<Postgres>,
) -> Result<User, ApiError> {
    let hashed = hash_password(&payload.password)
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))?;

    let row: Option<User> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING RETURNING *;
    ",
    )
    .bind(&payload.email)
    .bind(&payload.username)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(hashed)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| {
        ApiError::validation("a user with this email or username already exists")
    })
}

/// Checks credentials and returns a signed session token with the user.
pub async fn login_user(
    email: &str,
    password: &str,
    secret: &[u8],
    pool: &Pool<Postgres>,
) -> Result<(String, User), ApiError> {
    let user = get_user_by_email(pool, email)
        .await?
        .ok_or_else(|| ApiError::validation("invalid credentials"))?;

    let authenticated = verify_password(password, &user.password)
        .map_err(|e| ApiError::Internal(format!("stored password hash is unreadable: {e}")))?;
    if !authenticated {
        return Err(ApiError::validation("invalid credentials"));
    }

    let token = generate_jwt_session(&user, secret)?;

    Ok((token, user))
}

pub async fn fetch_users(
    limit: i64,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<User>, ApiError> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "SELECT u.*, COUNT(*) OVER() AS count FROM users u ORDER BY u.id LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    let rows: Vec<User> = rows.into_iter().map(User::from).collect();

    Ok(PageContext::from_rows(rows, total_count, limit, offset))
}

/// Projects users into public profiles with viewer-relative
/// `is_subscribed`, resolved with a single membership query per page.
pub async fn profiles_for(
    users: &[User],
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserProfile>, ApiError> {
    let ids: Vec<Id> = users.iter().map(|u| u.id).collect();
    let subscribed = match viewer {
        Some(viewer) => subscriptions::subscribed_author_ids(viewer, &ids, pool).await?,
        None => Default::default(),
    };

    Ok(users
        .iter()
        .map(|user| UserProfile::from_user(user, subscribed.contains(&user.id)))
        .collect())
}

pub async fn update_profile(
    user_id: Id,
    update: &ProfilePayload,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    sqlx::query(
        "
        UPDATE users SET
        first_name = COALESCE($1, first_name),
        last_name = COALESCE($2, last_name)
        WHERE id = $3
    ",
    )
    .bind(&update.first_name)
    .bind(&update.last_name)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_avatar(user_id: Id, avatar: &str, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    sqlx::query("UPDATE users SET avatar = $1 WHERE id = $2")
        .bind(avatar)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Clearing an absent avatar is a deliberate no-op, not an error.
pub async fn clear_avatar(user_id: Id, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    sqlx::query("UPDATE users SET avatar = NULL WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}
