use std::collections::HashMap;

use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::authentication::jwt::SessionData;
use crate::authentication::permissions::ActionType;
use crate::error::ApiError;
use crate::pagination::PageContext;
use crate::payload::RecipePayload;
use crate::schema::{
    Id, Recipe, RecipeDetail, RecipeIngredientRow, RecipeRow, RecipeTagRow, Tag, User, UserProfile,
};

use super::{marks, marks::MarkKind, subscriptions};

/// Listing filters. Tag slugs are OR-ed together; the viewer-relative
/// flags only apply when a viewer is present.
#[derive(Debug, Default, Clone)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

/// Newest-first recipe page matching the filter, with the windowed total.
pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<&SessionData>,
    limit: i64,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<Recipe>, ApiError> {
    let mut query = QueryBuilder::new(
        "SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE",
    );

    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ");
        query.push_bind(author);
    }

    if !filter.tags.is_empty() {
        query.push(
            " AND r.id IN (
                SELECT rt.recipe_id FROM recipe_tags rt
                INNER JOIN tags t ON t.id = rt.tag_id
                WHERE t.slug = ANY(",
        );
        query.push_bind(&filter.tags);
        query.push("))");
    }

    if let Some(viewer) = viewer {
        if filter.is_favorited {
            query.push(" AND r.id IN (SELECT recipe_id FROM user_favorites WHERE user_id = ");
            query.push_bind(viewer.user_id);
            query.push(")");
        }
        if filter.is_in_shopping_cart {
            query.push(" AND r.id IN (SELECT recipe_id FROM user_shopping_cart WHERE user_id = ");
            query.push_bind(viewer.user_id);
            query.push(")");
        }
    }

    query.push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ");
    query.push_bind(limit);
    query.push(" OFFSET ");
    query.push_bind(offset);

    let rows: Vec<RecipeRow> = query.build_query_as().fetch_all(pool).await?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    let rows: Vec<Recipe> = rows.into_iter().map(Recipe::from).collect();

    Ok(PageContext::from_rows(rows, total_count, limit, offset))
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, ApiError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Loads a recipe the session is allowed to modify. Existence is checked
/// before ownership so a missing recipe is a 404 even for strangers.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("recipe not found"))?;

    session.authorize(ActionType::ManageOwnRecipes)?;
    if ActionType::ManageAllRecipes.permitted(session) || recipe.author_id == session.user_id {
        return Ok(recipe);
    }

    Err(ApiError::forbidden(
        "you do not have permission to modify this recipe",
    ))
}

pub async fn create_recipe(
    author_id: Id,
    payload: &RecipePayload,
    pool: &Pool<Postgres>,
) -> Result<Id, ApiError> {
    let image = payload
        .image
        .as_deref()
        .ok_or_else(|| ApiError::validation("field `image` is required in this request"))?;

    let mut tx = pool.begin().await?;

    let (recipe_id,): (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id;
    ",
    )
    .bind(author_id)
    .bind(&payload.name)
    .bind(image)
    .bind(&payload.text)
    .bind(payload.cooking_time)
    .fetch_one(&mut *tx)
    .await?;

    replace_associations(&mut tx, recipe_id, payload).await?;
    tx.commit().await?;

    Ok(recipe_id)
}

pub async fn update_recipe(
    recipe: &Recipe,
    payload: &RecipePayload,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let image = payload.image.as_deref().unwrap_or(&recipe.image);

    let mut tx = pool.begin().await?;

    sqlx::query(
        "
        UPDATE recipes SET name = $1, image = $2, text = $3, cooking_time = $4
        WHERE id = $5
    ",
    )
    .bind(&payload.name)
    .bind(image)
    .bind(&payload.text)
    .bind(payload.cooking_time)
    .bind(recipe.id)
    .execute(&mut *tx)
    .await?;

    replace_associations(&mut tx, recipe.id, payload).await?;
    tx.commit().await?;

    Ok(())
}

/// Rewrites the recipe's tag and ingredient links inside the caller's
/// transaction. Unknown ids roll the whole write back as a 400.
async fn replace_associations(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Id,
    payload: &RecipePayload,
) -> Result<(), ApiError> {
    let tag_ids: Vec<Id> = payload.tags.clone();
    let known_tags: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(&tag_ids)
        .fetch_all(&mut **tx)
        .await?;
    if known_tags.len() != tag_ids.len() {
        return Err(ApiError::validation("unknown tag id"));
    }

    let ingredient_ids: Vec<Id> = payload.ingredients.iter().map(|i| i.id).collect();
    let known_ingredients: Vec<(Id,)> =
        sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
            .bind(&ingredient_ids)
            .fetch_all(&mut **tx)
            .await?;
    if known_ingredients.len() != ingredient_ids.len() {
        return Err(ApiError::validation("unknown ingredient id"));
    }

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;
    let mut insert_tags = QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    insert_tags.push_values(&tag_ids, |mut row, tag_id| {
        row.push_bind(recipe_id).push_bind(tag_id);
    });
    insert_tags.build().execute(&mut **tx).await?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;
    let mut insert_ingredients =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    insert_ingredients.push_values(&payload.ingredients, |mut row, ingredient| {
        row.push_bind(recipe_id)
            .push_bind(ingredient.id)
            .push_bind(ingredient.amount);
    });
    insert_ingredients.build().execute(&mut **tx).await?;

    Ok(())
}

/// Link tables cascade.
pub async fn delete_recipe(id: Id, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Hydrates recipes into their full read projection: tags, ingredients,
/// author profiles and viewer-relative flags, each resolved with one
/// batched query across the whole page. Anonymous viewers get all flags
/// false without touching the mark tables.
pub async fn load_recipe_details(
    recipes: Vec<Recipe>,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeDetail>, ApiError> {
    if recipes.is_empty() {
        return Ok(Vec::new());
    }

    let recipe_ids: Vec<Id> = recipes.iter().map(|r| r.id).collect();
    let author_ids: Vec<Id> = recipes.iter().map(|r| r.author_id).collect();

    let tag_rows: Vec<RecipeTagRow> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.id
    ",
    )
    .bind(&recipe_ids)
    .fetch_all(pool)
    .await?;

    let ingredient_rows: Vec<RecipeIngredientRow> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY i.id
    ",
    )
    .bind(&recipe_ids)
    .fetch_all(pool)
    .await?;

    let authors: Vec<User> = sqlx::query_as("SELECT * FROM users WHERE id = ANY($1)")
        .bind(&author_ids)
        .fetch_all(pool)
        .await?;

    let (favorited, in_cart, subscribed) = match viewer {
        Some(viewer) => (
            marks::marked_recipe_ids(MarkKind::Favorite, viewer, &recipe_ids, pool).await?,
            marks::marked_recipe_ids(MarkKind::ShoppingCart, viewer, &recipe_ids, pool).await?,
            subscriptions::subscribed_author_ids(viewer, &author_ids, pool).await?,
        ),
        None => Default::default(),
    };

    let mut tags_by_recipe: HashMap<Id, Vec<Tag>> = HashMap::new();
    for row in tag_rows {
        tags_by_recipe
            .entry(row.recipe_id)
            .or_default()
            .push(Tag::from(row));
    }

    let mut ingredients_by_recipe: HashMap<Id, Vec<RecipeIngredientRow>> = HashMap::new();
    for row in ingredient_rows {
        ingredients_by_recipe
            .entry(row.recipe_id)
            .or_default()
            .push(row);
    }

    let profiles_by_id: HashMap<Id, UserProfile> = authors
        .iter()
        .map(|author| {
            (
                author.id,
                UserProfile::from_user(author, subscribed.contains(&author.id)),
            )
        })
        .collect();

    let mut details = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        let author = profiles_by_id
            .get(&recipe.author_id)
            .cloned()
            .ok_or_else(|| {
                ApiError::Internal(format!("recipe {} has no author row", recipe.id))
            })?;

        details.push(RecipeDetail {
            id: recipe.id,
            tags: tags_by_recipe.remove(&recipe.id).unwrap_or_default(),
            author,
            ingredients: ingredients_by_recipe
                .remove(&recipe.id)
                .unwrap_or_default(),
            is_favorited: favorited.contains(&recipe.id),
            is_in_shopping_cart: in_cart.contains(&recipe.id),
            name: recipe.name,
            image: recipe.image,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        });
    }

    Ok(details)
}
