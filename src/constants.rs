pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const USER_COUNT_PER_PAGE: i64 = 10;

pub const MIN_COOKING_TIME: i64 = 1;
pub const MIN_INGREDIENT_AMOUNT: i64 = 1;

pub const SESSION_COOKIE: &str = "session";

pub const SHOPPING_LIST_SUFFIX: &str = "_go_to_shop.txt";
