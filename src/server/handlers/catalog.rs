use serde::Deserialize;
use sqlx::{Pool, Postgres};
use warp::reject::Rejection;
use warp::reply::{self, Reply};

use crate::database::actions::{ingredients, tags};
use crate::error::ApiError;
use crate::schema::Id;

#[derive(Deserialize, Debug, Default)]
pub struct IngredientQuery {
    pub name: Option<String>,
}

pub async fn list_tags(pool: Pool<Postgres>) -> Result<impl Reply, Rejection> {
    let list = tags::list_tags(&pool).await?;
    Ok(reply::json(&list))
}

pub async fn get_tag(id: Id, pool: Pool<Postgres>) -> Result<impl Reply, Rejection> {
    let tag = tags::get_tag(id, &pool)
        .await?
        .ok_or_else(|| ApiError::not_found("tag not found"))?;
    Ok(reply::json(&tag))
}

pub async fn list_ingredients(
    query: IngredientQuery,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let list = ingredients::list_ingredients(query.name.as_deref(), &pool).await?;
    Ok(reply::json(&list))
}

pub async fn get_ingredient(id: Id, pool: Pool<Postgres>) -> Result<impl Reply, Rejection> {
    let ingredient = ingredients::get_ingredient(id, &pool)
        .await?
        .ok_or_else(|| ApiError::not_found("ingredient not found"))?;
    Ok(reply::json(&ingredient))
}
