//! Tags and ingredients: the same list/create/retrieve/update/delete surface over two
//! tables, selected by the [`AttributeKind`] extension installed on each router.

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use tracing::{info, instrument};

use crate::{
    error::{ApiError, FieldErrors, IdPath, Payload, QueryParams, BLANK, REQUIRED},
    recipes::{
        dto::{AttributeListQuery, AttributeRequest},
        repo_types::{Attribute, AttributeKind},
    },
    state::AppState,
    users::jwt::AuthUser,
};

const MAX_NAME_LEN: usize = 255;

pub fn attribute_routes(kind: AttributeKind) -> Router<AppState> {
    let base = format!("/{}", kind.table());
    let item = format!("{base}/:id");
    Router::new()
        .route(&base, get(list_attributes).post(create_attribute))
        .route(
            &item,
            get(get_attribute)
                .patch(update_attribute)
                .put(update_attribute)
                .delete(delete_attribute),
        )
        .layer(Extension(kind))
}

/// `assigned_only` is an integer flag; anything non-zero enables it.
pub(crate) fn parse_assigned_only(raw: Option<&str>) -> Result<bool, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) => v.parse::<i64>().map(|n| n != 0).map_err(|_| {
            ApiError::Validation(FieldErrors::single(
                "assigned_only",
                "A valid integer is required.",
            ))
        }),
    }
}

fn valid_name(payload: AttributeRequest) -> Result<String, ApiError> {
    let name = match payload.name {
        None => return Err(ApiError::Validation(FieldErrors::single("name", REQUIRED))),
        Some(n) => n.trim().to_string(),
    };
    if name.is_empty() {
        return Err(ApiError::Validation(FieldErrors::single("name", BLANK)));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::Validation(FieldErrors::single(
            "name",
            "Ensure this field has no more than 255 characters.",
        )));
    }
    Ok(name)
}

#[instrument(skip(state))]
pub async fn list_attributes(
    State(state): State<AppState>,
    Extension(kind): Extension<AttributeKind>,
    AuthUser(user_id): AuthUser,
    QueryParams(q): QueryParams<AttributeListQuery>,
) -> Result<Json<Vec<Attribute>>, ApiError> {
    let assigned_only = parse_assigned_only(q.assigned_only.as_deref())?;
    let rows = state
        .store
        .list_attributes(kind, user_id, assigned_only)
        .await?;
    Ok(Json(rows))
}

#[instrument(skip(state, payload))]
pub async fn create_attribute(
    State(state): State<AppState>,
    Extension(kind): Extension<AttributeKind>,
    AuthUser(user_id): AuthUser,
    Payload(payload): Payload<AttributeRequest>,
) -> Result<(StatusCode, Json<Attribute>), ApiError> {
    let name = valid_name(payload)?;
    let row = state.store.insert_attribute(kind, user_id, &name).await?;
    info!(kind = ?kind, id = %row.id, %user_id, "created");
    Ok((StatusCode::CREATED, Json(row)))
}

#[instrument(skip(state))]
pub async fn get_attribute(
    State(state): State<AppState>,
    Extension(kind): Extension<AttributeKind>,
    AuthUser(user_id): AuthUser,
    IdPath(id): IdPath,
) -> Result<Json<Attribute>, ApiError> {
    let row = state
        .store
        .find_attributes(kind, user_id, &[id])
        .await?
        .pop()
        .ok_or(ApiError::NotFound)?;
    Ok(Json(row))
}

#[instrument(skip(state, payload))]
pub async fn update_attribute(
    State(state): State<AppState>,
    Extension(kind): Extension<AttributeKind>,
    AuthUser(user_id): AuthUser,
    IdPath(id): IdPath,
    Payload(payload): Payload<AttributeRequest>,
) -> Result<Json<Attribute>, ApiError> {
    let name = valid_name(payload)?;
    let row = state
        .store
        .rename_attribute(kind, user_id, id, &name)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(row))
}

#[instrument(skip(state))]
pub async fn delete_attribute(
    State(state): State<AppState>,
    Extension(kind): Extension<AttributeKind>,
    AuthUser(user_id): AuthUser,
    IdPath(id): IdPath,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_attribute(kind, user_id, id).await? {
        return Err(ApiError::NotFound);
    }
    info!(kind = ?kind, %id, %user_id, "deleted");
    Ok(StatusCode::NO_CONTENT)
}
