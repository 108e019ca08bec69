use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    error::{ApiError, FieldErrors, Payload, BLANK, REQUIRED},
    state::AppState,
    users::{
        dto::{CreateUserRequest, PublicUser, TokenRequest, TokenResponse, UpdateProfileRequest},
        jwt::{AuthUser, JwtKeys},
        services::{self, is_valid_email, ExtraFields, ProfileChanges, MIN_PASSWORD_LEN},
    },
};

const MAX_FIELD_LEN: usize = 255;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/create", post(create_user))
        .route("/user/token", post(create_token))
        .route("/user/me", get(get_me).patch(patch_me).put(put_me))
}

fn check_email(errors: &mut FieldErrors, email: Option<&str>, required: bool) {
    match email.map(str::trim) {
        None if required => errors.add("email", REQUIRED),
        None => {}
        Some("") => errors.add("email", BLANK),
        Some(e) if e.chars().count() > MAX_FIELD_LEN => {
            errors.add("email", "Ensure this field has no more than 255 characters.")
        }
        Some(e) if !is_valid_email(e) => errors.add("email", "Enter a valid email address."),
        Some(_) => {}
    }
}

fn check_password(errors: &mut FieldErrors, password: Option<&str>, required: bool) {
    match password {
        None if required => errors.add("password", REQUIRED),
        None => {}
        Some("") => errors.add("password", BLANK),
        Some(p) if p.chars().count() < MIN_PASSWORD_LEN => errors.add(
            "password",
            format!("Ensure this field has at least {MIN_PASSWORD_LEN} characters."),
        ),
        Some(_) => {}
    }
}

fn check_name(errors: &mut FieldErrors, name: Option<&str>) {
    if name.is_some_and(|n| n.chars().count() > MAX_FIELD_LEN) {
        errors.add("name", "Ensure this field has no more than 255 characters.");
    }
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Payload(payload): Payload<CreateUserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let mut errors = FieldErrors::default();
    check_email(&mut errors, payload.email.as_deref(), true);
    check_password(&mut errors, payload.password.as_deref(), true);
    check_name(&mut errors, payload.name.as_deref());
    errors.into_result()?;

    let (Some(email), Some(password)) = (payload.email, payload.password) else {
        return Err(ApiError::Validation(FieldErrors::single("email", REQUIRED)));
    };
    let user = services::create_user(
        state.store.as_ref(),
        &email,
        &password,
        ExtraFields {
            name: payload.name,
            ..Default::default()
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn create_token(
    State(state): State<AppState>,
    Payload(payload): Payload<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let mut errors = FieldErrors::default();
    match payload.email.as_deref() {
        None => errors.add("email", REQUIRED),
        Some(e) if e.trim().is_empty() => errors.add("email", BLANK),
        Some(_) => {}
    }
    match payload.password.as_deref() {
        None => errors.add("password", REQUIRED),
        Some("") => errors.add("password", BLANK),
        Some(_) => {}
    }
    errors.into_result()?;

    let email = payload.email.unwrap_or_default();
    let password = payload.password.unwrap_or_default();
    let user = services::authenticate(state.store.as_ref(), &email, &password)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, email = %user.email, "token issued");
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or(ApiError::AuthenticationRequired)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn patch_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Payload(payload): Payload<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    update_me(&state, user_id, payload, false).await
}

#[instrument(skip(state, payload))]
pub async fn put_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Payload(payload): Payload<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    update_me(&state, user_id, payload, true).await
}

async fn update_me(
    state: &AppState,
    user_id: uuid::Uuid,
    payload: UpdateProfileRequest,
    full: bool,
) -> Result<Json<PublicUser>, ApiError> {
    let mut errors = FieldErrors::default();
    check_email(&mut errors, payload.email.as_deref(), full);
    check_password(&mut errors, payload.password.as_deref(), full);
    check_name(&mut errors, payload.name.as_deref());
    errors.into_result()?;

    let user = services::update_profile(
        state.store.as_ref(),
        user_id,
        ProfileChanges {
            email: payload.email,
            name: payload.name,
            password: payload.password,
        },
    )
    .await?
    .ok_or(ApiError::AuthenticationRequired)?;

    Ok(Json(user.into()))
}
