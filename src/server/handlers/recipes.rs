use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use sqlx::{Pool, Postgres};
use warp::http::{StatusCode, Uri};
use warp::reject::Rejection;
use warp::reply::{self, Reply};

use crate::authentication::jwt::SessionData;
use crate::authentication::permissions::ActionType;
use crate::config::Config;
use crate::constants::{RECIPE_COUNT_PER_PAGE, SHOPPING_LIST_SUFFIX};
use crate::database::actions::{marks, marks::MarkKind, recipes};
use crate::error::ApiError;
use crate::pagination::PageContext;
use crate::payload::RecipePayload;
use crate::schema::Id;
use crate::shortlink;

/// Recipe listing parameters. Parsed by hand from the raw query string
/// because `tags` may repeat.
#[derive(Debug, Default)]
pub struct RecipeListQuery {
    pub author: Option<Id>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl RecipeListQuery {
    pub fn from_raw(raw: &str) -> Self {
        let mut query = Self::default();
        for pair in raw.split('&') {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, value),
                None => continue,
            };
            let value = decode_component(value);
            let value = value.as_str();
            match key {
                "author" => query.author = value.parse().ok(),
                "tags" => query.tags.push(value.to_string()),
                "is_favorited" => query.is_favorited = flag(value),
                "is_in_shopping_cart" => query.is_in_shopping_cart = flag(value),
                "limit" => query.limit = value.parse().ok().filter(|v| *v > 0),
                "offset" => query.offset = value.parse().ok().filter(|v| *v >= 0),
                _ => {}
            }
        }
        query
    }

    fn filter(&self) -> recipes::RecipeFilter {
        recipes::RecipeFilter {
            author: self.author,
            tags: self.tags.clone(),
            is_favorited: self.is_favorited,
            is_in_shopping_cart: self.is_in_shopping_cart,
        }
    }
}

fn flag(value: &str) -> bool {
    value == "1" || value == "true"
}

// query components form-encode spaces as '+', which percent_decode_str
// leaves alone
fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    percent_decode_str(&raw).decode_utf8_lossy().into_owned()
}

pub async fn list_recipes(
    raw_query: String,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let query = RecipeListQuery::from_raw(&raw_query);
    let limit = query.limit.unwrap_or(RECIPE_COUNT_PER_PAGE);
    let offset = query.offset.unwrap_or(0);

    let page =
        recipes::fetch_recipes(&query.filter(), session.as_ref(), limit, offset, &pool).await?;

    let viewer = session.as_ref().map(|s| s.user_id);
    let details = recipes::load_recipe_details(page.rows, viewer, &pool).await?;
    let page = PageContext {
        rows: details,
        total_rows: page.total_rows,
        next_offset: page.next_offset,
        prev_offset: page.prev_offset,
    };

    Ok(reply::json(&page))
}

pub async fn get_recipe(
    id: Id,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let recipe = recipes::get_recipe(id, &pool)
        .await?
        .ok_or_else(|| ApiError::not_found("recipe not found"))?;

    let viewer = session.as_ref().map(|s| s.user_id);
    let details = recipes::load_recipe_details(vec![recipe], viewer, &pool).await?;
    let detail = details
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal(format!("recipe {id} vanished during hydration")))?;

    Ok(reply::json(&detail))
}

pub async fn create_recipe(
    session: SessionData,
    body: Value,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    session.authorize(ActionType::ManageOwnRecipes)?;
    let payload = RecipePayload::parse(body, true)?;

    let recipe_id = recipes::create_recipe(session.user_id, &payload, &pool).await?;
    let recipe = recipes::get_recipe(recipe_id, &pool)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("recipe {recipe_id} vanished after insert")))?;
    let detail = recipes::load_recipe_details(vec![recipe], Some(session.user_id), &pool)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal(format!("recipe {recipe_id} vanished after insert")))?;

    Ok(reply::with_status(
        reply::json(&detail),
        StatusCode::CREATED,
    ))
}

/// Partial update: an omitted `image` keeps the stored one.
pub async fn update_recipe(
    id: Id,
    session: SessionData,
    body: Value,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    apply_update(id, session, body, pool, false).await
}

/// Full replacement: every field, `image` included, must be present.
pub async fn replace_recipe(
    id: Id,
    session: SessionData,
    body: Value,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    apply_update(id, session, body, pool, true).await
}

async fn apply_update(
    id: Id,
    session: SessionData,
    body: Value,
    pool: Pool<Postgres>,
    image_required: bool,
) -> Result<impl Reply, Rejection> {
    let recipe = recipes::get_recipe_mut(id, &session, &pool).await?;
    let payload = RecipePayload::parse(body, image_required)?;

    recipes::update_recipe(&recipe, &payload, &pool).await?;
    let updated = recipes::get_recipe(id, &pool)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("recipe {id} vanished after update")))?;
    let detail = recipes::load_recipe_details(vec![updated], Some(session.user_id), &pool)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal(format!("recipe {id} vanished after update")))?;

    Ok(reply::json(&detail))
}

pub async fn delete_recipe(
    id: Id,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    let recipe = recipes::get_recipe_mut(id, &session, &pool).await?;
    recipes::delete_recipe(recipe.id, &pool).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_mark(
    kind: MarkKind,
    id: Id,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    session.authorize(ActionType::ManageOwnMarks)?;
    let compact = marks::add_mark(kind, session.user_id, id, &pool).await?;

    Ok(reply::with_status(
        reply::json(&compact),
        StatusCode::CREATED,
    ))
}

pub async fn remove_mark(
    kind: MarkKind,
    id: Id,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    session.authorize(ActionType::ManageOwnMarks)?;
    marks::remove_mark(kind, session.user_id, id, &pool).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Aggregated shopping list as a plain-text file download.
pub async fn download_shopping_cart(
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<impl Reply, Rejection> {
    session.authorize(ActionType::ManageOwnMarks)?;

    let rows = marks::cart_ingredients(session.user_id, &pool).await?;
    let body = marks::render_shopping_list(&marks::aggregate_shopping_list(rows));
    let filename = format!("{}{}", session.username, SHOPPING_LIST_SUFFIX);

    Ok(reply::with_header(
        reply::with_header(body, "content-type", "text/plain; charset=utf-8"),
        "content-disposition",
        format!("attachment; filename={filename}"),
    ))
}

pub async fn get_link(
    id: Id,
    pool: Pool<Postgres>,
    config: Arc<Config>,
) -> Result<impl Reply, Rejection> {
    recipes::get_recipe(id, &pool)
        .await?
        .ok_or_else(|| ApiError::not_found("recipe not found"))?;

    let token = shortlink::encode(id as u64);
    Ok(reply::json(&json!({
        "short-link": format!("{}/s/{}", config.base_url, token)
    })))
}

/// Redirects a short link token to the recipe page it encodes.
pub async fn resolve_link(
    token: String,
    pool: Pool<Postgres>,
    config: Arc<Config>,
) -> Result<impl Reply, Rejection> {
    let id = shortlink::decode(&token)?;
    let id = Id::try_from(id).map_err(|_| ApiError::not_found("recipe not found"))?;
    recipes::get_recipe(id, &pool)
        .await?
        .ok_or_else(|| ApiError::not_found("recipe not found"))?;

    let target: Uri = format!("{}/recipes/{}/", config.base_url, id)
        .parse()
        .map_err(|_| ApiError::Internal(String::from("short link target is not a valid URI")))?;

    Ok(warp::redirect::found(target))
}

#[cfg(test)]
mod tests {
    use super::RecipeListQuery;

    #[test]
    fn parses_repeated_tags() {
        let query = RecipeListQuery::from_raw("tags=breakfast&tags=vegan&author=3");
        assert_eq!(query.tags, vec!["breakfast", "vegan"]);
        assert_eq!(query.author, Some(3));
        assert!(!query.is_favorited);
    }

    #[test]
    fn parses_flags_and_paging() {
        let query =
            RecipeListQuery::from_raw("is_favorited=1&is_in_shopping_cart=true&limit=3&offset=6");
        assert!(query.is_favorited);
        assert!(query.is_in_shopping_cart);
        assert_eq!(query.limit, Some(3));
        assert_eq!(query.offset, Some(6));
    }

    #[test]
    fn percent_encoded_values_are_decoded() {
        let query = RecipeListQuery::from_raw("tags=j%C3%A4lkiruoka&tags=iced+tea");
        assert_eq!(query.tags, vec!["jälkiruoka", "iced tea"]);
    }

    #[test]
    fn garbage_values_are_ignored() {
        let query = RecipeListQuery::from_raw("author=abc&limit=-5&is_favorited=0&unknown=x");
        assert_eq!(query.author, None);
        assert_eq!(query.limit, None);
        assert!(!query.is_favorited);
    }

    #[test]
    fn empty_query_is_default() {
        let query = RecipeListQuery::from_raw("");
        assert_eq!(query.author, None);
        assert!(query.tags.is_empty());
    }
}
