use std::collections::{BTreeMap, HashSet};

use sqlx::{Pool, Postgres};

use crate::error::ApiError;
use crate::schema::{CartIngredientRow, Id, RecipeCompact, ShoppingListLine};

/// The two per-user recipe collections share one table shape
/// ((user_id, recipe_id) pairs) and one set of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkKind {
    Favorite,
    ShoppingCart,
}

impl MarkKind {
    fn table(&self) -> &'static str {
        match self {
            MarkKind::Favorite => "user_favorites",
            MarkKind::ShoppingCart => "user_shopping_cart",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            MarkKind::Favorite => "favorites",
            MarkKind::ShoppingCart => "the shopping cart",
        }
    }
}

pub async fn is_marked(
    kind: MarkKind,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    let row: Option<(Id,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = $2",
        kind.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// Which of the given recipes the user has marked. One query per page of
/// recipes rather than one per recipe.
pub async fn marked_recipe_ids(
    kind: MarkKind,
    user_id: Id,
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Id>, ApiError> {
    let rows: Vec<(Id,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = ANY($2)",
        kind.table()
    ))
    .bind(user_id)
    .bind(recipe_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Marks a recipe for the user and returns its compact shape.
///
/// A duplicate mark is reported before a missing recipe: the pair check
/// runs first, so marking an already-marked recipe is a 400 even if the
/// recipe was deleted in between.
pub async fn add_mark(
    kind: MarkKind,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<RecipeCompact, ApiError> {
    if is_marked(kind, user_id, recipe_id, pool).await? {
        return Err(ApiError::validation(format!(
            "recipe {} is already in {}",
            recipe_id,
            kind.describe()
        )));
    }

    let recipe: Option<RecipeCompact> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(recipe_id)
            .fetch_optional(pool)
            .await?;
    let recipe = recipe.ok_or_else(|| ApiError::not_found("recipe not found"))?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        kind.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::validation(format!(
            "recipe {} is already in {}",
            recipe_id,
            kind.describe()
        )));
    }

    Ok(recipe)
}

/// Unmarks a recipe. A missing recipe is a 404; a recipe that exists but
/// was never marked is a 400.
pub async fn remove_mark(
    kind: MarkKind,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let exists: Option<(Id,)> = sqlx::query_as("SELECT id FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("recipe not found"));
    }

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        kind.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::validation(format!(
            "recipe {} is not in {}",
            recipe_id,
            kind.describe()
        )));
    }

    Ok(())
}

/// Every ingredient line across every recipe currently in the user's cart.
pub async fn cart_ingredients(
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<CartIngredientRow>, ApiError> {
    let rows: Vec<CartIngredientRow> = sqlx::query_as(
        "
        SELECT i.name, i.measurement_unit, ri.amount
        FROM user_shopping_cart c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Sums amounts per (name, unit) pair. Output is sorted by ingredient name,
/// then unit. Amounts are widened to i64 so a large cart cannot overflow.
pub fn aggregate_shopping_list(rows: Vec<CartIngredientRow>) -> Vec<ShoppingListLine> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for row in rows {
        *totals
            .entry((row.name, row.measurement_unit))
            .or_insert(0) += row.amount as i64;
    }

    totals
        .into_iter()
        .map(|((name, measurement_unit), amount)| ShoppingListLine {
            name,
            measurement_unit,
            amount,
        })
        .collect()
}

pub fn render_shopping_list(lines: &[ShoppingListLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&format!(
            "{}: {} {}\n",
            line.name, line.amount, line.measurement_unit
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, unit: &str, amount: i32) -> CartIngredientRow {
        CartIngredientRow {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn aggregation_merges_same_ingredient() {
        let lines = aggregate_shopping_list(vec![
            row("flour", "g", 200),
            row("egg", "pcs", 2),
            row("flour", "g", 100),
        ]);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].name, "egg");
        assert_eq!(lines[0].amount, 2);
        assert_eq!(lines[1].name, "flour");
        assert_eq!(lines[1].amount, 300);
    }

    #[test]
    fn same_name_different_unit_stays_separate() {
        let lines = aggregate_shopping_list(vec![row("milk", "ml", 500), row("milk", "g", 30)]);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].measurement_unit, "g");
        assert_eq!(lines[1].measurement_unit, "ml");
    }

    #[test]
    fn rendered_list_format() {
        let lines = aggregate_shopping_list(vec![row("flour", "g", 300), row("egg", "pcs", 2)]);
        let text = render_shopping_list(&lines);

        assert_eq!(text, "egg: 2 pcs\nflour: 300 g\n");
    }

    #[test]
    fn empty_cart_renders_empty() {
        let lines = aggregate_shopping_list(Vec::new());
        assert!(lines.is_empty());
        assert_eq!(render_shopping_list(&lines), "");
    }
}
