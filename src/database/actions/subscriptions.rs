use std::collections::HashSet;

use sqlx::{Pool, Postgres};

use crate::error::ApiError;
use crate::pagination::PageContext;
use crate::schema::{Id, RecipeCompact, SubscriptionEntry, User, UserProfile, UserRow};

pub async fn is_subscribed(
    user_id: Id,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    let row: Option<(Id,)> =
        sqlx::query_as("SELECT author_id FROM subscriptions WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.is_some())
}

/// Which of the given authors the viewer follows, resolved in one query.
pub async fn subscribed_author_ids(
    user_id: Id,
    author_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Id>, ApiError> {
    let rows: Vec<(Id,)> =
        sqlx::query_as("SELECT author_id FROM subscriptions WHERE user_id = $1 AND author_id = ANY($2)")
            .bind(user_id)
            .bind(author_ids)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn subscribe(user_id: Id, target: &User, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    if user_id == target.id {
        return Err(ApiError::validation("you cannot subscribe to yourself"));
    }

    let result =
        sqlx::query("INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(target.id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::validation(format!(
            "you are already subscribed to {}",
            target.username
        )));
    }

    Ok(())
}

pub async fn unsubscribe(
    user_id: Id,
    target: &User,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2")
        .bind(user_id)
        .bind(target.id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::validation(format!(
            "you are not subscribed to {}",
            target.username
        )));
    }

    Ok(())
}

/// Authors the user follows, ordered by author id, with the windowed total.
pub async fn fetch_subscriptions(
    user_id: Id,
    limit: i64,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<User>, ApiError> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.*, COUNT(*) OVER() AS count
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    let rows: Vec<User> = rows.into_iter().map(User::from).collect();

    Ok(PageContext::from_rows(rows, total_count, limit, offset))
}

/// Builds a feed entry for one followed author: profile, total recipe
/// count, and their newest recipes, optionally truncated to
/// `recipes_limit`.
pub async fn subscription_entry(
    target: &User,
    is_subscribed: bool,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionEntry, ApiError> {
    let (recipes_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
            .bind(target.id)
            .fetch_one(pool)
            .await?;

    let recipes: Vec<RecipeCompact> = match recipes_limit {
        Some(limit) => {
            sqlx::query_as(
                "
                SELECT id, name, image, cooking_time FROM recipes
                WHERE author_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2
            ",
            )
            .bind(target.id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "
                SELECT id, name, image, cooking_time FROM recipes
                WHERE author_id = $1
                ORDER BY created_at DESC, id DESC
            ",
            )
            .bind(target.id)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(SubscriptionEntry {
        profile: UserProfile::from_user(target, is_subscribed),
        recipes_count,
        recipes,
    })
}
