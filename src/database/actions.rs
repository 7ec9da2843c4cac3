pub mod ingredients;
pub mod marks;
pub mod recipes;
pub mod subscriptions;
pub mod tags;
pub mod users;
