// src/utils/cookie.rs

use axum::http::{HeaderMap, header};

use crate::config::Config;

/// Builds the Set-Cookie value carrying a fresh auth token.
/// HttpOnly + SameSite=Lax always; Secure only outside development so local
/// HTTP clients still work.
pub fn build_auth_cookie(config: &Config, token: &str) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        config.cookie_name, token, config.token_ttl_secs
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Builds the Set-Cookie value that expires the auth cookie.
pub fn build_clear_cookie(config: &Config) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
        config.cookie_name
    )
}

/// Extracts a cookie value from the Cookie request header.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;
            if key == name { Some(value.to_string()) } else { None }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; auth-token=abc123; other=xyz"),
        );

        assert_eq!(
            extract_cookie(&headers, "auth-token"),
            Some("abc123".to_string())
        );
        assert_eq!(extract_cookie(&headers, "foo"), Some("bar".to_string()));
        assert_eq!(extract_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_extract_cookie_no_header() {
        let headers = HeaderMap::new();
        assert_eq!(extract_cookie(&headers, "auth-token"), None);
    }
}
