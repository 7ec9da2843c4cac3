pub mod catalog;
pub mod recipes;
pub mod users;
