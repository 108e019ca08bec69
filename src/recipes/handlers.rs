use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    error::{ApiError, FieldErrors, IdPath, Payload, QueryParams, BLANK, REQUIRED},
    recipes::{
        dto::{
            RecipeDetailResponse, RecipeImageResponse, RecipeListQuery, RecipeRequest,
            RecipeResponse,
        },
        images::{self, is_image, UploadItem},
        repo_types::{AttributeKind, NewRecipe, Recipe, RecipeChanges, RecipeFilter},
    },
    state::AppState,
    store::normalize_ids,
    users::jwt::AuthUser,
};

const MAX_TITLE_LEN: usize = 255;
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

// --- public routers ---

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/recipes/:id",
            get(get_recipe)
                .patch(patch_recipe)
                .put(put_recipe)
                .delete(delete_recipe),
        )
        .route("/recipes/:id/image", get(get_recipe_image))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes/:id/upload-image", post(upload_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

// --- validation ---

fn parse_id_list(field: &str, raw: Option<&str>) -> Result<Vec<Uuid>, ApiError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s).map_err(|_| {
                ApiError::Validation(FieldErrors::single(field, format!("\"{s}\" is not a valid UUID.")))
            })
        })
        .collect()
}

fn check_title(errors: &mut FieldErrors, title: Option<&str>, required: bool) -> Option<String> {
    match title.map(str::trim) {
        None => {
            if required {
                errors.add("title", REQUIRED);
            }
            None
        }
        Some("") => {
            errors.add("title", BLANK);
            None
        }
        Some(t) if t.chars().count() > MAX_TITLE_LEN => {
            errors.add("title", "Ensure this field has no more than 255 characters.");
            None
        }
        Some(t) => Some(t.to_string()),
    }
}

fn check_minutes(errors: &mut FieldErrors, minutes: Option<i64>, required: bool) -> Option<i32> {
    match minutes {
        None => {
            if required {
                errors.add("time_minutes", REQUIRED);
            }
            None
        }
        Some(m) if m < 0 => {
            errors.add("time_minutes", "Ensure this value is greater than or equal to 0.");
            None
        }
        Some(m) => match i32::try_from(m) {
            Ok(m) => Some(m),
            Err(_) => {
                errors.add("time_minutes", "Ensure this value is less than or equal to 2147483647.");
                None
            }
        },
    }
}

/// At most five digits, two of them after the decimal point.
fn check_price(errors: &mut FieldErrors, price: Option<Decimal>, required: bool) -> Option<Decimal> {
    let Some(price) = price else {
        if required {
            errors.add("price", REQUIRED);
        }
        return None;
    };
    let price = price.normalize();
    if price.scale() > 2 {
        errors.add("price", "Ensure that there are no more than 2 decimal places.");
        return None;
    }
    if price.abs() >= Decimal::new(1000, 0) {
        errors.add("price", "Ensure that there are no more than 3 digits before the decimal point.");
        return None;
    }
    let mut price = price;
    price.rescale(2);
    Some(price)
}

/// Every id must name a row of `kind` owned by `owner`.
async fn check_links(
    state: &AppState,
    errors: &mut FieldErrors,
    kind: AttributeKind,
    owner: Uuid,
    ids: Option<Vec<Uuid>>,
) -> Result<Option<Vec<Uuid>>, ApiError> {
    let Some(ids) = ids else {
        return Ok(None);
    };
    let ids = normalize_ids(&ids);
    if ids.is_empty() {
        return Ok(Some(ids));
    }
    let found = state.store.find_attributes(kind, owner, &ids).await?;
    for id in &ids {
        if !found.iter().any(|a| a.id == *id) {
            errors.add(kind.field(), format!("Invalid pk \"{id}\" - object does not exist."));
        }
    }
    Ok(Some(ids))
}

/// Validated changes; with `full` every scalar is required and absent link lists clear the set.
async fn validate(
    state: &AppState,
    owner: Uuid,
    payload: RecipeRequest,
    full: bool,
) -> Result<RecipeChanges, ApiError> {
    let mut errors = FieldErrors::default();
    let title = check_title(&mut errors, payload.title.as_deref(), full);
    let time_minutes = check_minutes(&mut errors, payload.time_minutes, full);
    let price = check_price(&mut errors, payload.price, full);
    let mut tags = check_links(state, &mut errors, AttributeKind::Tag, owner, payload.tags).await?;
    let mut ingredients = check_links(
        state,
        &mut errors,
        AttributeKind::Ingredient,
        owner,
        payload.ingredients,
    )
    .await?;
    errors.into_result()?;

    if full {
        tags.get_or_insert_with(Vec::new);
        ingredients.get_or_insert_with(Vec::new);
    }
    Ok(RecipeChanges {
        title,
        time_minutes,
        price,
        tags,
        ingredients,
    })
}

async fn detail(state: &AppState, owner: Uuid, recipe: Recipe) -> Result<RecipeDetailResponse, ApiError> {
    let tags = state
        .store
        .find_attributes(AttributeKind::Tag, owner, &recipe.tags)
        .await?;
    let ingredients = state
        .store
        .find_attributes(AttributeKind::Ingredient, owner, &recipe.ingredients)
        .await?;
    Ok(RecipeDetailResponse {
        id: recipe.id,
        title: recipe.title,
        time_minutes: recipe.time_minutes,
        price: recipe.price,
        tags,
        ingredients,
        image: recipe.image,
    })
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    QueryParams(q): QueryParams<RecipeListQuery>,
) -> Result<Json<Vec<RecipeResponse>>, ApiError> {
    let filter = RecipeFilter {
        tags: parse_id_list("tags", q.tags.as_deref())?,
        ingredients: parse_id_list("ingredients", q.ingredients.as_deref())?,
    };
    let recipes = state.store.list_recipes(user_id, &filter).await?;
    Ok(Json(recipes.into_iter().map(RecipeResponse::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    IdPath(id): IdPath,
) -> Result<Json<RecipeDetailResponse>, ApiError> {
    let recipe = state
        .store
        .find_recipe(user_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(detail(&state, user_id, recipe).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Payload(payload): Payload<RecipeRequest>,
) -> Result<(StatusCode, Json<RecipeResponse>), ApiError> {
    let changes = validate(&state, user_id, payload, true).await?;
    let (Some(title), Some(time_minutes), Some(price)) =
        (changes.title, changes.time_minutes, changes.price)
    else {
        return Err(ApiError::Validation(FieldErrors::single("title", REQUIRED)));
    };

    let recipe = state
        .store
        .insert_recipe(
            user_id,
            NewRecipe {
                title,
                time_minutes,
                price,
                tags: changes.tags.unwrap_or_default(),
                ingredients: changes.ingredients.unwrap_or_default(),
            },
        )
        .await?;
    info!(recipe_id = %recipe.id, %user_id, "recipe created");
    Ok((StatusCode::CREATED, Json(recipe.into())))
}

#[instrument(skip(state, payload))]
pub async fn patch_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    IdPath(id): IdPath,
    Payload(payload): Payload<RecipeRequest>,
) -> Result<Json<RecipeResponse>, ApiError> {
    update(&state, user_id, id, payload, false).await
}

#[instrument(skip(state, payload))]
pub async fn put_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    IdPath(id): IdPath,
    Payload(payload): Payload<RecipeRequest>,
) -> Result<Json<RecipeResponse>, ApiError> {
    update(&state, user_id, id, payload, true).await
}

async fn update(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
    payload: RecipeRequest,
    full: bool,
) -> Result<Json<RecipeResponse>, ApiError> {
    if state.store.find_recipe(user_id, id).await?.is_none() {
        return Err(ApiError::NotFound);
    }
    let changes = validate(state, user_id, payload, full).await?;
    let recipe = state
        .store
        .update_recipe(user_id, id, changes)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!(recipe_id = %recipe.id, %user_id, full, "recipe updated");
    Ok(Json(recipe.into()))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    IdPath(id): IdPath,
) -> Result<StatusCode, ApiError> {
    let recipe = state
        .store
        .delete_recipe(user_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if let Some(key) = &recipe.image {
        images::discard(&state, key).await;
    }
    info!(recipe_id = %id, %user_id, "recipe deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /recipes/:id/upload-image (multipart, field `image`)
#[instrument(skip(state, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    IdPath(id): IdPath,
    mut mp: Multipart,
) -> Result<Json<RecipeImageResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().map(|s| s.to_string());
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let body = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        upload = Some(UploadItem {
            filename,
            content_type,
            body,
        });
        break;
    }

    let Some(item) = upload else {
        return Err(ApiError::Validation(FieldErrors::single(
            "image",
            "No file was submitted.",
        )));
    };
    if item.body.is_empty() {
        return Err(ApiError::Validation(FieldErrors::single(
            "image",
            "The submitted file is empty.",
        )));
    }
    if !is_image(&item.content_type) {
        return Err(ApiError::Validation(FieldErrors::single(
            "image",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        )));
    }

    let recipe = images::upload_recipe_image(&state, user_id, id, item)
        .await?
        .ok_or(ApiError::NotFound)?;
    let image = recipe.image.ok_or_else(|| anyhow::anyhow!("image key missing after upload"))?;
    Ok(Json(RecipeImageResponse { id: recipe.id, image }))
}

/// Temporary redirect to a URL serving the recipe's image.
#[instrument(skip(state))]
pub async fn get_recipe_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    IdPath(id): IdPath,
) -> Result<Redirect, ApiError> {
    let key = state
        .store
        .find_recipe(user_id, id)
        .await?
        .and_then(|r| r.image)
        .ok_or(ApiError::NotFound)?;
    let url = images::presign_image(&state, &key).await?;
    Ok(Redirect::temporary(&url))
}
