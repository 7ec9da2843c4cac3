use std::sync::Arc;

use serde_json::Value;
use sqlx::{Pool, Postgres};
use warp::reject::Rejection;
use warp::reply::Reply;
use warp::Filter;

use crate::authentication::middleware::{with_possible_session, with_session};
use crate::config::Config;
use crate::database::actions::marks::MarkKind;
use crate::pagination::PageQuery;
use crate::schema::Id;

use super::handlers;

/// The complete route table. Literal paths (`download_shopping_cart`,
/// `subscriptions`, `me`) are declared before their sibling `:id` routes
/// so they are never captured as ids.
pub fn routes(
    pool: Pool<Postgres>,
    config: Arc<Config>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let with_pool = {
        let pool = pool.clone();
        warp::any().map(move || pool.clone())
    };
    let with_config = {
        let config = config.clone();
        warp::any().map(move || config.clone())
    };
    // `query::raw` rejects when the query string is absent entirely
    let raw_query = warp::query::raw()
        .or(warp::any().map(String::new))
        .unify();

    let list_tags = warp::path!("tags")
        .and(warp::get())
        .and(with_pool.clone())
        .and_then(handlers::catalog::list_tags);

    let get_tag = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_pool.clone())
        .and_then(handlers::catalog::get_tag);

    let list_ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(warp::query::<handlers::catalog::IngredientQuery>())
        .and(with_pool.clone())
        .and_then(handlers::catalog::list_ingredients);

    let get_ingredient = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_pool.clone())
        .and_then(handlers::catalog::get_ingredient);

    let list_recipes = warp::path!("recipes")
        .and(warp::get())
        .and(raw_query.clone())
        .and(with_possible_session(config.clone()))
        .and(with_pool.clone())
        .and_then(handlers::recipes::list_recipes);

    let create_recipe = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(config.clone()))
        .and(warp::body::json::<Value>())
        .and(with_pool.clone())
        .and_then(handlers::recipes::create_recipe);

    let download_shopping_cart = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(config.clone()))
        .and(with_pool.clone())
        .and_then(handlers::recipes::download_shopping_cart);

    let get_recipe = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_possible_session(config.clone()))
        .and(with_pool.clone())
        .and_then(handlers::recipes::get_recipe);

    let update_recipe = warp::path!("recipes" / Id)
        .and(warp::patch())
        .and(with_session(config.clone()))
        .and(warp::body::json::<Value>())
        .and(with_pool.clone())
        .and_then(handlers::recipes::update_recipe);

    let replace_recipe = warp::path!("recipes" / Id)
        .and(warp::put())
        .and(with_session(config.clone()))
        .and(warp::body::json::<Value>())
        .and(with_pool.clone())
        .and_then(handlers::recipes::replace_recipe);

    let delete_recipe = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_session(config.clone()))
        .and(with_pool.clone())
        .and_then(handlers::recipes::delete_recipe);

    let add_favorite = warp::path!("recipes" / Id / "favorite")
        .and(warp::post())
        .and(with_session(config.clone()))
        .and(with_pool.clone())
        .and_then(|id, session, pool| {
            handlers::recipes::add_mark(MarkKind::Favorite, id, session, pool)
        });

    let remove_favorite = warp::path!("recipes" / Id / "favorite")
        .and(warp::delete())
        .and(with_session(config.clone()))
        .and(with_pool.clone())
        .and_then(|id, session, pool| {
            handlers::recipes::remove_mark(MarkKind::Favorite, id, session, pool)
        });

    let add_to_cart = warp::path!("recipes" / Id / "shopping_cart")
        .and(warp::post())
        .and(with_session(config.clone()))
        .and(with_pool.clone())
        .and_then(|id, session, pool| {
            handlers::recipes::add_mark(MarkKind::ShoppingCart, id, session, pool)
        });

    let remove_from_cart = warp::path!("recipes" / Id / "shopping_cart")
        .and(warp::delete())
        .and(with_session(config.clone()))
        .and(with_pool.clone())
        .and_then(|id, session, pool| {
            handlers::recipes::remove_mark(MarkKind::ShoppingCart, id, session, pool)
        });

    let get_link = warp::path!("recipes" / Id / "get-link")
        .and(warp::get())
        .and(with_pool.clone())
        .and(with_config.clone())
        .and_then(handlers::recipes::get_link);

    let resolve_link = warp::path!("s" / String)
        .and(warp::get())
        .and(with_pool.clone())
        .and(with_config.clone())
        .and_then(handlers::recipes::resolve_link);

    let register = warp::path!("users")
        .and(warp::post())
        .and(warp::body::json::<Value>())
        .and(with_pool.clone())
        .and_then(handlers::users::register);

    let list_users = warp::path!("users")
        .and(warp::get())
        .and(warp::query::<PageQuery>())
        .and(with_possible_session(config.clone()))
        .and(with_pool.clone())
        .and_then(handlers::users::list_users);

    let list_subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(warp::query::<PageQuery>())
        .and(warp::query::<handlers::users::SubscribeQuery>())
        .and(with_session(config.clone()))
        .and(with_pool.clone())
        .and_then(handlers::users::list_subscriptions);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session(config.clone()))
        .and(with_pool.clone())
        .and_then(handlers::users::me);

    let update_me = warp::path!("users" / "me")
        .and(warp::patch())
        .and(with_session(config.clone()))
        .and(warp::body::json::<Value>())
        .and(with_pool.clone())
        .and_then(handlers::users::update_me);

    let set_avatar = warp::path!("users" / "me" / "avatar")
        .and(warp::put())
        .and(with_session(config.clone()))
        .and(warp::body::json::<Value>())
        .and(with_pool.clone())
        .and_then(handlers::users::set_avatar);

    let delete_avatar = warp::path!("users" / "me" / "avatar")
        .and(warp::delete())
        .and(with_session(config.clone()))
        .and(with_pool.clone())
        .and_then(handlers::users::delete_avatar);

    let get_user = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_possible_session(config.clone()))
        .and(with_pool.clone())
        .and_then(handlers::users::get_user);

    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::post())
        .and(warp::query::<handlers::users::SubscribeQuery>())
        .and(with_session(config.clone()))
        .and(with_pool.clone())
        .and_then(handlers::users::subscribe);

    let unsubscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::delete())
        .and(with_session(config.clone()))
        .and(with_pool.clone())
        .and_then(handlers::users::unsubscribe);

    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(warp::body::json::<Value>())
        .and(with_pool.clone())
        .and(with_config.clone())
        .and_then(handlers::users::login);

    let logout = warp::path!("auth" / "token" / "logout")
        .and(warp::post())
        .and(with_session(config.clone()))
        .and_then(handlers::users::logout);

    list_tags
        .or(get_tag)
        .or(list_ingredients)
        .or(get_ingredient)
        .or(list_recipes)
        .or(create_recipe)
        .or(download_shopping_cart)
        .or(add_favorite)
        .or(remove_favorite)
        .or(add_to_cart)
        .or(remove_from_cart)
        .or(get_link)
        .or(get_recipe)
        .or(update_recipe)
        .or(replace_recipe)
        .or(delete_recipe)
        .or(resolve_link)
        .or(register)
        .or(list_users)
        .or(list_subscriptions)
        .or(me)
        .or(update_me)
        .or(set_avatar)
        .or(delete_avatar)
        .or(subscribe)
        .or(unsubscribe)
        .or(get_user)
        .or(login)
        .or(logout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::handle_rejection;
    use warp::http::StatusCode;

    // connect_lazy never touches the database; the session filter
    // rejects these requests before any query runs
    fn test_api() -> impl Filter<Extract = (impl Reply,)> + Clone {
        let pool = Pool::<Postgres>::connect_lazy("postgres://localhost/unused")
            .unwrap_or_else(|e| panic!("pool setup: {e}"));
        let config = Arc::new(Config {
            database_url: String::from("postgres://localhost/unused"),
            bind_addr: "127.0.0.1:8000".parse().unwrap_or_else(|e| panic!("{e}")),
            jwt_secret: String::from("test-secret"),
            base_url: String::from("http://localhost:8000"),
        });
        routes(pool, config).recover(handle_rejection)
    }

    #[tokio::test]
    async fn recipe_update_is_routed_for_put_and_patch() {
        let api = test_api();
        for method in ["PUT", "PATCH", "DELETE"] {
            let response = warp::test::request()
                .method(method)
                .path("/recipes/1")
                .reply(&api)
                .await;
            // 401 proves the route matched and stopped at the session
            // filter; an unrouted verb would be a 405
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method}");
        }
    }

    #[tokio::test]
    async fn unknown_verb_is_not_routed() {
        let api = test_api();
        let response = warp::test::request()
            .method("POST")
            .path("/tags")
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
