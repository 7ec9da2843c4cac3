use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};

use super::error::ApiError;
use super::schema::Id;
use crate::constants::{MIN_COOKING_TIME, MIN_INGREDIENT_AMOUNT};

/// Field-level accessor over a JSON request body. Every failure names
/// the offending field so the caller sees a usable 400.
pub struct Payload {
    inner: Map<String, Value>,
}

impl Payload {
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        match value {
            Value::Object(inner) => Ok(Self { inner }),
            _ => Err(ApiError::validation("request body must be a JSON object")),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn require(&self, keys: &[&str]) -> Result<(), ApiError> {
        for key in keys {
            if !self.has(key) {
                return Err(ApiError::validation(format!(
                    "field `{key}` is required in this request"
                )));
            }
        }
        Ok(())
    }

    pub fn str_field(&self, key: &str) -> Result<String, ApiError> {
        match self.inner.get(key) {
            Some(Value::String(value)) => Ok(value.to_owned()),
            Some(_) => Err(ApiError::validation(format!(
                "field `{key}` must be a string"
            ))),
            None => Err(ApiError::validation(format!(
                "field `{key}` is required in this request"
            ))),
        }
    }

    pub fn int_field(&self, key: &str) -> Result<i64, ApiError> {
        match self.inner.get(key) {
            Some(value) => value.as_i64().ok_or_else(|| {
                ApiError::validation(format!("field `{key}` must be an integer"))
            }),
            None => Err(ApiError::validation(format!(
                "field `{key}` is required in this request"
            ))),
        }
    }

    pub fn array_field(&self, key: &str) -> Result<&Vec<Value>, ApiError> {
        match self.inner.get(key) {
            Some(Value::Array(values)) => Ok(values),
            Some(_) => Err(ApiError::validation(format!(
                "field `{key}` must be a list"
            ))),
            None => Err(ApiError::validation(format!(
                "field `{key}` is required in this request"
            ))),
        }
    }
}

/// Checks that an embedded image payload actually decodes. Accepts both
/// a bare base64 string and the `data:image/...;base64,` form.
pub fn decode_image_payload(data: &str) -> Result<Vec<u8>, ApiError> {
    let encoded = match data.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => data,
    };
    if encoded.is_empty() {
        return Err(ApiError::validation("image payload is empty"));
    }
    STANDARD
        .decode(encoded)
        .map_err(|_| ApiError::validation("image payload is not valid base64"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeIngredientInput {
    pub id: Id,
    pub amount: i32,
}

#[derive(Debug, Clone)]
pub struct RecipePayload {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    /// None on update means "keep the stored image".
    pub image: Option<String>,
    pub tags: Vec<Id>,
    pub ingredients: Vec<RecipeIngredientInput>,
}

impl RecipePayload {
    /// Validation order: required fields, image, tags, ingredients,
    /// cooking time. Id resolvability is checked later, inside the
    /// write transaction.
    pub fn parse(value: Value, image_required: bool) -> Result<Self, ApiError> {
        let payload = Payload::from_value(value)?;

        let mut required = vec!["name", "text", "cooking_time", "tags", "ingredients"];
        if image_required {
            required.push("image");
        }
        payload.require(&required)?;

        let name = payload.str_field("name")?;
        if name.is_empty() {
            return Err(ApiError::validation("field `name` must not be empty"));
        }
        let text = payload.str_field("text")?;
        if text.is_empty() {
            return Err(ApiError::validation("field `text` must not be empty"));
        }
        let cooking_time = payload.int_field("cooking_time")?;

        // require() above already rejected a missing image on create, so
        // an absent field here can only mean "keep the stored image"
        let image = if payload.has("image") {
            let image = payload.str_field("image")?;
            if image.is_empty() {
                return Err(ApiError::validation("field `image` must not be empty"));
            }
            decode_image_payload(&image)?;
            Some(image)
        } else {
            None
        };

        let tags = Self::parse_tags(&payload)?;
        let ingredients = Self::parse_ingredients(&payload)?;

        if cooking_time < MIN_COOKING_TIME {
            return Err(ApiError::validation(format!(
                "field `cooking_time` must be at least {MIN_COOKING_TIME}"
            )));
        }
        let cooking_time = i32::try_from(cooking_time)
            .map_err(|_| ApiError::validation("field `cooking_time` is out of range"))?;

        Ok(Self {
            name,
            text,
            cooking_time,
            image,
            tags,
            ingredients,
        })
    }

    fn parse_tags(payload: &Payload) -> Result<Vec<Id>, ApiError> {
        let values = payload.array_field("tags")?;
        if values.is_empty() {
            return Err(ApiError::validation("at least one tag is required"));
        }

        let mut tags = Vec::with_capacity(values.len());
        for value in values {
            let id = value
                .as_i64()
                .and_then(|id| Id::try_from(id).ok())
                .ok_or_else(|| ApiError::validation("field `tags` must contain tag ids"))?;
            tags.push(id);
        }

        let unique: HashSet<Id> = tags.iter().copied().collect();
        if unique.len() != tags.len() {
            return Err(ApiError::validation("tags must be unique"));
        }

        Ok(tags)
    }

    fn parse_ingredients(payload: &Payload) -> Result<Vec<RecipeIngredientInput>, ApiError> {
        let values = payload.array_field("ingredients")?;
        if values.is_empty() {
            return Err(ApiError::validation("at least one ingredient is required"));
        }

        let mut ingredients = Vec::with_capacity(values.len());
        for value in values {
            let entry = Payload::from_value(value.to_owned()).map_err(|_| {
                ApiError::validation("field `ingredients` must contain {id, amount} objects")
            })?;
            let id = Id::try_from(entry.int_field("id")?).map_err(|_| {
                ApiError::validation("field `ingredients` must contain valid ingredient ids")
            })?;
            let amount = entry.int_field("amount")?;
            if amount < MIN_INGREDIENT_AMOUNT {
                return Err(ApiError::validation(format!(
                    "amount of ingredient {id} must be at least {MIN_INGREDIENT_AMOUNT}"
                )));
            }
            let amount = i32::try_from(amount).map_err(|_| {
                ApiError::validation(format!("amount of ingredient {id} is out of range"))
            })?;
            ingredients.push(RecipeIngredientInput { id, amount });
        }

        let unique: HashSet<Id> = ingredients.iter().map(|i| i.id).collect();
        if unique.len() != ingredients.len() {
            return Err(ApiError::validation("ingredients must be unique"));
        }

        Ok(ingredients)
    }
}

#[derive(Debug, Clone)]
pub struct RegisterPayload {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl RegisterPayload {
    pub fn parse(value: Value) -> Result<Self, ApiError> {
        let payload = Payload::from_value(value)?;
        payload.require(&["email", "username", "first_name", "last_name", "password"])?;

        let email = payload.str_field("email")?;
        if !email.contains('@') {
            return Err(ApiError::validation("field `email` must be a valid email"));
        }

        let username = payload.str_field("username")?;
        let valid_username = !username.is_empty()
            && username
                .chars()
                .all(|c| c.is_alphanumeric() || "@.+-_".contains(c));
        if !valid_username {
            return Err(ApiError::validation(
                "field `username` may only contain letters, digits and @/./+/-/_",
            ));
        }

        let password = payload.str_field("password")?;
        if password.is_empty() {
            return Err(ApiError::validation("field `password` must not be empty"));
        }

        Ok(Self {
            email,
            username,
            first_name: payload.str_field("first_name")?,
            last_name: payload.str_field("last_name")?,
            password,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

impl LoginPayload {
    pub fn parse(value: Value) -> Result<Self, ApiError> {
        let payload = Payload::from_value(value)?;
        payload.require(&["email", "password"])?;
        Ok(Self {
            email: payload.str_field("email")?,
            password: payload.str_field("password")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfilePayload {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ProfilePayload {
    pub fn parse(value: Value) -> Result<Self, ApiError> {
        let payload = Payload::from_value(value)?;
        let mut update = Self::default();
        if payload.has("first_name") {
            update.first_name = Some(payload.str_field("first_name")?);
        }
        if payload.has("last_name") {
            update.last_name = Some(payload.str_field("last_name")?);
        }
        Ok(update)
    }
}

/// Extracts and verifies the `avatar` field of an avatar update.
pub fn parse_avatar(value: Value) -> Result<String, ApiError> {
    let payload = Payload::from_value(value)?;
    let avatar = payload.str_field("avatar")?;
    if avatar.is_empty() {
        return Err(ApiError::validation("field `avatar` must not be empty"));
    }
    decode_image_payload(&avatar)?;
    Ok(avatar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recipe_body() -> Value {
        json!({
            "name": "Korvapuusti",
            "text": "Pullataikina ja kanelia.",
            "cooking_time": 45,
            "image": format!("data:image/png;base64,{}", STANDARD.encode(b"png")),
            "tags": [1, 2],
            "ingredients": [
                {"id": 3, "amount": 200},
                {"id": 4, "amount": 2}
            ]
        })
    }

    #[test]
    fn parses_valid_recipe() {
        let payload = RecipePayload::parse(recipe_body(), true).unwrap();
        assert_eq!(payload.name, "Korvapuusti");
        assert_eq!(payload.cooking_time, 45);
        assert_eq!(payload.tags, vec![1, 2]);
        assert_eq!(
            payload.ingredients,
            vec![
                RecipeIngredientInput { id: 3, amount: 200 },
                RecipeIngredientInput { id: 4, amount: 2 },
            ]
        );
    }

    #[test]
    fn missing_field_names_the_field() {
        let mut body = recipe_body();
        body.as_object_mut().unwrap().remove("text");
        let err = RecipePayload::parse(body, true).unwrap_err();
        assert!(err.to_string().contains("`text`"), "{err}");
    }

    #[test]
    fn image_optional_only_on_update() {
        let mut body = recipe_body();
        body.as_object_mut().unwrap().remove("image");

        assert!(RecipePayload::parse(body.clone(), true).is_err());
        let payload = RecipePayload::parse(body, false).unwrap();
        assert_eq!(payload.image, None);
    }

    #[test]
    fn empty_image_rejected() {
        let mut body = recipe_body();
        body["image"] = json!("");
        let err = RecipePayload::parse(body, true).unwrap_err();
        assert!(err.to_string().contains("`image`"), "{err}");
    }

    #[test]
    fn duplicate_tags_rejected() {
        let mut body = recipe_body();
        body["tags"] = json!([1, 1]);
        let err = RecipePayload::parse(body, true).unwrap_err();
        assert!(err.to_string().contains("unique"), "{err}");
    }

    #[test]
    fn empty_tag_list_rejected() {
        let mut body = recipe_body();
        body["tags"] = json!([]);
        assert!(RecipePayload::parse(body, true).is_err());
    }

    #[test]
    fn duplicate_ingredients_rejected() {
        let mut body = recipe_body();
        body["ingredients"] = json!([
            {"id": 3, "amount": 100},
            {"id": 3, "amount": 200}
        ]);
        let err = RecipePayload::parse(body, true).unwrap_err();
        assert!(err.to_string().contains("unique"), "{err}");
    }

    #[test]
    fn tiny_amount_rejected() {
        let mut body = recipe_body();
        body["ingredients"] = json!([{"id": 3, "amount": 0}]);
        let err = RecipePayload::parse(body, true).unwrap_err();
        assert!(err.to_string().contains("at least"), "{err}");
    }

    #[test]
    fn oversized_amount_rejected_not_wrapped() {
        // 2^32 + 5 would wrap to 5 under a plain narrowing cast
        let mut body = recipe_body();
        body["ingredients"] = json!([{"id": 3, "amount": 4_294_967_301_i64}]);
        let err = RecipePayload::parse(body, true).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");

        // 2^32 exactly would wrap to 0 and trip the storage constraint
        let mut body = recipe_body();
        body["ingredients"] = json!([{"id": 3, "amount": 4_294_967_296_i64}]);
        assert!(RecipePayload::parse(body, true).is_err());
    }

    #[test]
    fn oversized_cooking_time_rejected_not_wrapped() {
        // 2^32 + 45 would wrap to 45 under a plain narrowing cast
        let mut body = recipe_body();
        body["cooking_time"] = json!(4_294_967_341_i64);
        let err = RecipePayload::parse(body, true).unwrap_err();
        assert!(err.to_string().contains("`cooking_time`"), "{err}");
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn oversized_ids_rejected() {
        let mut body = recipe_body();
        body["tags"] = json!([4_294_967_297_i64]);
        assert!(RecipePayload::parse(body, true).is_err());

        let mut body = recipe_body();
        body["ingredients"] = json!([{"id": 4_294_967_299_i64, "amount": 10}]);
        assert!(RecipePayload::parse(body, true).is_err());
    }

    #[test]
    fn tiny_cooking_time_rejected() {
        let mut body = recipe_body();
        body["cooking_time"] = json!(0);
        let err = RecipePayload::parse(body, true).unwrap_err();
        assert!(err.to_string().contains("`cooking_time`"), "{err}");
    }

    #[test]
    fn image_payload_decoding() {
        assert!(decode_image_payload("").is_err());
        assert!(decode_image_payload("data:image/png;base64,").is_err());
        assert!(decode_image_payload("not base64!!!").is_err());

        let encoded = STANDARD.encode(b"fake image bytes");
        assert_eq!(
            decode_image_payload(&format!("data:image/jpeg;base64,{encoded}")).unwrap(),
            b"fake image bytes"
        );
        assert!(decode_image_payload(&encoded).is_ok());
    }

    #[test]
    fn register_payload_validates_identifiers() {
        let body = json!({
            "email": "not-an-email",
            "username": "kokki",
            "first_name": "Kaisa",
            "last_name": "Korhonen",
            "password": "hunter2"
        });
        assert!(RegisterPayload::parse(body).is_err());

        let body = json!({
            "email": "kaisa@example.org",
            "username": "kokki!",
            "first_name": "Kaisa",
            "last_name": "Korhonen",
            "password": "hunter2"
        });
        assert!(RegisterPayload::parse(body).is_err());

        let body = json!({
            "email": "kaisa@example.org",
            "username": "kokki.k",
            "first_name": "Kaisa",
            "last_name": "Korhonen",
            "password": "hunter2"
        });
        assert!(RegisterPayload::parse(body).is_ok());
    }
}
