//! API key authentication.
//!
//! The key may arrive as a `key` query/form field, an `x-api-key` header or a bearer token.
//! Comparison is constant-time to mitigate timing attacks.

use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;

use crate::errors::AppError;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Check a request against the configured key. With no key configured every request passes.
pub fn authorize(
    expected: Option<&str>,
    headers: &HeaderMap,
    key_param: Option<&str>,
) -> Result<(), AppError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = key_param
        .filter(|k| !k.is_empty())
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
        })
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        });

    match provided {
        Some(key) if constant_time_compare(key, expected) => Ok(()),
        Some(_) => Err(AppError::Unauthorized("Invalid API key".to_string())),
        None => Err(AppError::Unauthorized("Missing API key".to_string())),
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("test-key-123", "test-key-123"));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("test-key-123", "test-key-124"));
    }

    #[test]
    fn test_constant_time_compare_different_lengths() {
        assert!(!constant_time_compare("short", "much-longer-key"));
    }

    #[test]
    fn test_open_when_unconfigured() {
        assert!(authorize(None, &HeaderMap::new(), None).is_ok());
        assert!(authorize(None, &HeaderMap::new(), Some("anything")).is_ok());
    }

    #[test]
    fn test_key_sources() {
        let empty = HeaderMap::new();
        assert!(authorize(Some("s3cret"), &empty, Some("s3cret")).is_ok());
        assert!(matches!(
            authorize(Some("s3cret"), &empty, Some("wrong")),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            authorize(Some("s3cret"), &empty, None),
            Err(AppError::Unauthorized(_))
        ));

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("s3cret"));
        assert!(authorize(Some("s3cret"), &headers, None).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer s3cret"),
        );
        assert!(authorize(Some("s3cret"), &headers, Some("")).is_ok());
    }
}
