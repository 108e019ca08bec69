use crate::state::AppState;
use axum::Router;

pub mod attributes;
pub mod dto;
pub mod handlers;
pub mod images;
pub mod repo_types;

use repo_types::AttributeKind;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(attributes::attribute_routes(AttributeKind::Tag))
        .merge(attributes::attribute_routes(AttributeKind::Ingredient))
        .merge(handlers::recipe_routes())
        .merge(handlers::upload_routes())
}
