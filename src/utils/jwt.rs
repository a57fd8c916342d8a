// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, utils::cookie::extract_cookie};

/// Token payload. `sub` holds the user id as a string; handlers parse it
/// back out (or use [`VerifiedUser`], which does the parse).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    pub sub: String,
    /// Email at the time the token was issued.
    pub email: String,
    /// Expiry as a Unix timestamp.
    pub exp: usize,
}

/// Issues a signed token for a user, expiring `expiration_seconds` from now.
pub fn sign_jwt(
    id: i64,
    email: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        email: email.to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Decodes and validates a token, including its expiry. Every failure mode
/// collapses to the same `Invalid token` 401 message.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Pulls the auth token out of a request: auth cookie first, then the
/// 'Authorization: Bearer <token>' header for API clients.
pub fn token_from_request(req: &Request<Body>, config: &Config) -> Option<String> {
    if let Some(token) = extract_cookie(req.headers(), &config.cookie_name) {
        return Some(token);
    }

    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// Guard layered over every protected route. Accepts the auth cookie or a
/// Bearer header; a valid token gets its `Claims` injected into the request
/// extensions, anything else is a 401 in the standard error envelope.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = token_from_request(&req, &config)
        .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))?;

    let claims = verify_jwt(&token, &config.jwt_secret)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// The authenticated principal as a typed extractor, for handlers that want
/// `user.id` rather than raw claims. Reads the `Claims` injected by
/// `auth_middleware`, so it only works behind that layer.
#[derive(Debug, Clone)]
pub struct VerifiedUser {
    pub id: i64,
    pub email: String,
}

impl<S> FromRequestParts<S> for VerifiedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))?;
        let id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;
        Ok(VerifiedUser { id, email: claims.email.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let token = sign_jwt(42, "a@b.c", "secret", 3600).unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email, "a@b.c");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign_jwt(42, "a@b.c", "secret", 3600).unwrap();
        assert!(verify_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(verify_jwt("not.a.jwt", "secret").is_err());
    }

    #[test]
    fn test_token_from_request_prefers_cookie() {
        let config = Config::for_tests();
        let mut req = Request::new(Body::empty());
        req.headers_mut().insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{}=cookie-token", config.cookie_name)).unwrap(),
        );
        req.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );

        assert_eq!(
            token_from_request(&req, &config).as_deref(),
            Some("cookie-token")
        );
    }

    #[test]
    fn test_token_from_request_bearer_fallback() {
        let config = Config::for_tests();
        let mut req = Request::new(Body::empty());
        req.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );

        assert_eq!(
            token_from_request(&req, &config).as_deref(),
            Some("header-token")
        );
        assert_eq!(token_from_request(&Request::new(Body::empty()), &config), None);
    }

    #[tokio::test]
    async fn test_verified_user_reads_injected_claims() {
        let mut req = Request::new(Body::empty());
        req.extensions_mut().insert(Claims {
            sub: "7".to_string(),
            email: "a@b.c".to_string(),
            exp: 0,
        });
        let (mut parts, _) = req.into_parts();
        let user = VerifiedUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.id, 7);
        assert_eq!(user.email, "a@b.c");

        let (mut bare, _) = Request::new(Body::empty()).into_parts();
        assert!(VerifiedUser::from_request_parts(&mut bare, &()).await.is_err());
    }
}
