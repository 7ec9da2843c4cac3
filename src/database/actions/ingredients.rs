use sqlx::{Pool, Postgres, QueryBuilder};

use crate::error::ApiError;
use crate::schema::{Id, Ingredient};

/// Lists reference ingredients, optionally restricted to a case-sensitive
/// name prefix. Unpaginated: the set is bulk-loaded reference data.
pub async fn list_ingredients(
    prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, ApiError> {
    let rows: Vec<Ingredient> = match prefix {
        Some(prefix) => {
            sqlx::query_as("SELECT * FROM ingredients WHERE name LIKE $1 || '%' ORDER BY name")
                .bind(escape_like(prefix))
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM ingredients ORDER BY name")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, ApiError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Reads `name,measurement_unit` records from headerless CSV. Used by
/// the `load_ingredients` binary to seed the reference table.
pub fn read_ingredient_records<R: std::io::Read>(
    reader: R,
) -> Result<Vec<(String, String)>, ApiError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| ApiError::validation(format!("malformed ingredient row: {e}")))?;
        let name = record.get(0).unwrap_or("");
        let unit = record.get(1).unwrap_or("");
        if name.is_empty() || unit.is_empty() {
            return Err(ApiError::validation(format!(
                "ingredient rows must be `name,measurement_unit`, got {record:?}"
            )));
        }
        entries.push((name.to_string(), unit.to_string()));
    }

    Ok(entries)
}

/// Bulk-inserts reference ingredients; rows already present are left
/// untouched. Returns how many rows were actually inserted.
pub async fn import_ingredients(
    entries: &[(String, String)],
    pool: &Pool<Postgres>,
) -> Result<u64, ApiError> {
    if entries.is_empty() {
        return Ok(0);
    }

    let mut insert = QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");
    insert.push_values(entries, |mut row, (name, unit)| {
        row.push_bind(name).push_bind(unit);
    });
    insert.push(" ON CONFLICT DO NOTHING");

    let result = insert.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// The prefix is user input; LIKE metacharacters in it must match literally.
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::{escape_like, read_ingredient_records};

    #[test]
    fn escapes_like_metacharacters() {
        assert_eq!(escape_like("flour"), "flour");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b\\c"), "a\\_b\\\\c");
    }

    #[test]
    fn reads_headerless_csv() {
        let data = "wheat flour,g\negg,pcs\n\"syrup, dark\",ml\n";
        let entries = read_ingredient_records(data.as_bytes()).unwrap();
        assert_eq!(
            entries,
            vec![
                (String::from("wheat flour"), String::from("g")),
                (String::from("egg"), String::from("pcs")),
                (String::from("syrup, dark"), String::from("ml")),
            ]
        );
    }

    #[test]
    fn rejects_rows_without_a_unit() {
        assert!(read_ingredient_records("flour\n".as_bytes()).is_err());
        assert!(read_ingredient_records(",g\n".as_bytes()).is_err());
    }

    #[test]
    fn empty_file_is_no_entries() {
        let entries = read_ingredient_records("".as_bytes()).unwrap();
        assert!(entries.is_empty());
    }
}
