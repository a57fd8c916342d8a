// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, http::header, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::user::{LoginRequest, SignupRequest, User, UserPublic},
    utils::{
        cookie::{build_auth_cookie, build_clear_cookie},
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

/// Creates an account and signs the caller in.
///
/// Hashes the password using Argon2 before storing it. On success the auth
/// token is set both as an HttpOnly cookie and returned to header-based
/// clients.
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created and signed in"),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already registered")
    ),
    tag = "auth"
)]
pub async fn signup(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.trim().to_lowercase();
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| email.split('@').next().unwrap_or("student").to_string());

    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password_hash, name)
        VALUES ($1, $2, $3)
        RETURNING id, email, password_hash, name, school, phone, avatar_data,
                  created_at, updated_at
        "#,
    )
    .bind(&email)
    .bind(&hashed_password)
    .bind(&name)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if matches!(&e, sqlx::Error::Database(db_err) if db_err.is_unique_violation()) {
            AppError::Conflict("An account with this email already exists".to_string())
        } else {
            tracing::error!("Failed to create account: {:?}", e);
            AppError::from(e)
        }
    })?;

    let token = sign_jwt(user.id, &user.email, &config.jwt_secret, config.token_ttl_secs)?;
    let cookie = build_auth_cookie(&config, &token);

    tracing::info!(user_id = user.id, "account created");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "user": UserPublic::from(&user), "token": token })),
    ))
}

/// Authenticates a user and sets the auth cookie.
///
/// Unknown email and wrong password return the same message so the endpoint
/// does not leak which addresses have accounts.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.trim().to_lowercase();

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, name, school, phone, avatar_data,
               created_at, updated_at
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(&email)
    .fetch_optional(&pool)
    .await?;

    let user =
        user.ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

    let is_valid = verify_password(&payload.password, &user.password_hash)?;
    if !is_valid {
        return Err(AppError::AuthError("Invalid email or password".to_string()));
    }

    let token = sign_jwt(user.id, &user.email, &config.jwt_secret, config.token_ttl_secs)?;
    let cookie = build_auth_cookie(&config, &token);

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "user": UserPublic::from(&user), "token": token })),
    ))
}

/// Returns the signed-in user.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user"),
        (status = 401, description = "Not signed in")
    ),
    tag = "auth"
)]
pub async fn me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, name, school, phone, avatar_data,
               created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(json!({ "user": UserPublic::from(&user) })))
}

/// Clears the auth cookie. Stateless tokens cannot be revoked server-side;
/// the cookie removal is what ends the browser session.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Signed out")),
    tag = "auth"
)]
pub async fn logout(State(config): State<Config>) -> Result<impl IntoResponse, AppError> {
    let cookie = build_clear_cookie(&config);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "message": "Signed out" })),
    ))
}
