//! Recipe book API: accounts with token auth, and per-user tags, ingredients and recipes.

pub mod app;
pub mod config;
pub mod error;
pub mod recipes;
pub mod state;
pub mod storage;
pub mod store;
pub mod users;
