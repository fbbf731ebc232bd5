use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::{AdminConfig, AppState};

const CHALLENGE: &str = r#"Basic realm="Admin Access""#;

/// Username and password from an `Authorization: Basic` header.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

// Compares digests so the comparison time does not depend on where the inputs differ
fn same_secret(given: &str, expected: &str) -> bool {
    Sha256::digest(given.as_bytes()) == Sha256::digest(expected.as_bytes())
}

pub fn is_admin(headers: &HeaderMap, admin: &AdminConfig) -> bool {
    if admin.username.is_empty() || admin.password.is_empty() {
        return false;
    }
    basic_credentials(headers).is_some_and(|(username, password)| {
        same_secret(&username, &admin.username) & same_secret(&password, &admin.password)
    })
}

/// Middleware guarding `/admin` and `/api/cms/*`.
pub async fn require_admin(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if is_admin(request.headers(), &app_state.config.admin) {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Rejected unauthenticated admin request");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, CHALLENGE)],
        "Authentication required",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn admin() -> AdminConfig {
        AdminConfig {
            username: "owner".to_string(),
            password: "s3cret".to_string(),
        }
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_accepts_matching_credentials() {
        let encoded = general_purpose::STANDARD.encode("owner:s3cret");
        assert!(is_admin(&headers_with(&format!("Basic {}", encoded)), &admin()));
    }

    #[test]
    fn test_rejects_wrong_or_missing_credentials() {
        let wrong = general_purpose::STANDARD.encode("owner:nope");
        assert!(!is_admin(&headers_with(&format!("Basic {}", wrong)), &admin()));
        assert!(!is_admin(&headers_with("Bearer abc"), &admin()));
        assert!(!is_admin(&HeaderMap::new(), &admin()));
    }

    #[test]
    fn test_unset_credentials_never_match() {
        let encoded = general_purpose::STANDARD.encode(":");
        let empty = AdminConfig {
            username: String::new(),
            password: String::new(),
        };
        assert!(!is_admin(&headers_with(&format!("Basic {}", encoded)), &empty));
    }

    #[test]
    fn test_password_may_contain_colons() {
        let encoded = general_purpose::STANDARD.encode("owner:a:b");
        assert_eq!(
            basic_credentials(&headers_with(&format!("basic {}", encoded))),
            Some(("owner".to_string(), "a:b".to_string()))
        );
    }
}
