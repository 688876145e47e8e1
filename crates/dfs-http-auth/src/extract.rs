//! Locating a bearer token in a request.
//!
//! Sources, in priority order:
//!
//! 1. `Authorization: Bearer <token>`
//! 2. the `auth_token` cookie
//! 3. the `token` query parameter
//!
//! Empty values are treated as absent and the next source is tried.

use http::header::{AUTHORIZATION, COOKIE};

/// Cookie holding a token.
pub const AUTH_COOKIE: &str = "auth_token";

/// Query parameter holding a token.
pub const TOKEN_QUERY_PARAM: &str = "token";

const BEARER: &str = "bearer";

/// Returns the first token found in the request, if any.
///
/// # Example
///
/// ```
/// use dfs_http_auth::extract_token;
///
/// let req = http::Request::builder()
///     .uri("/api/v1/files?token=abc")
///     .header("Cookie", "theme=dark; auth_token=from-cookie")
///     .body(())
///     .unwrap();
/// assert_eq!(extract_token(&req).as_deref(), Some("from-cookie"));
/// ```
pub fn extract_token<B>(request: &http::Request<B>) -> Option<String> {
    from_authorization(request)
        .or_else(|| from_cookie(request))
        .or_else(|| from_query(request))
}

fn from_authorization<B>(request: &http::Request<B>) -> Option<String> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER) {
        return None;
    }
    non_empty(token.trim())
}

fn from_cookie<B>(request: &http::Request<B>) -> Option<String> {
    request
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == AUTH_COOKIE)
        .and_then(|(_, value)| non_empty(value.trim().trim_matches('"')))
}

fn from_query<B>(request: &http::Request<B>) -> Option<String> {
    let query = request.uri().query()?;
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).ok()?;
    pairs
        .into_iter()
        .find(|(name, _)| name == TOKEN_QUERY_PARAM)
        .and_then(|(_, value)| non_empty(&value))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, headers: &[(&str, &str)]) -> http::Request<()> {
        let mut builder = http::Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_bearer_wins() {
        let req = request(
            "/x?token=q",
            &[("Authorization", "Bearer h"), ("Cookie", "auth_token=c")],
        );
        assert_eq!(extract_token(&req).as_deref(), Some("h"));
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        let req = request("/x", &[("Authorization", "bearer abc")]);
        assert_eq!(extract_token(&req).as_deref(), Some("abc"));
    }

    #[test]
    fn test_non_bearer_scheme_falls_through() {
        let req = request("/x?token=q", &[("Authorization", "Basic dXNlcjpwdw==")]);
        assert_eq!(extract_token(&req).as_deref(), Some("q"));
    }

    #[test]
    fn test_empty_bearer_falls_through_to_cookie() {
        let req = request(
            "/x",
            &[("Authorization", "Bearer   "), ("Cookie", "a=1; auth_token=c; b=2")],
        );
        assert_eq!(extract_token(&req).as_deref(), Some("c"));
    }

    #[test]
    fn test_query_param_is_decoded() {
        let req = request("/x?other=1&token=a%2Bb", &[]);
        assert_eq!(extract_token(&req).as_deref(), Some("a+b"));
    }

    #[test]
    fn test_nothing_found() {
        let req = request("/x?tok=1", &[("Cookie", "auth_token=")]);
        assert_eq!(extract_token(&req), None);
    }
}
