/// Bearer credential extraction and session-token verification
use crate::error::{ApiError, ApiResult};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Signed claim carried by the bearer credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaim {
    /// Serialized protocol session
    pub session: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

/// Strip one leading `Bearer ` (any case)
pub fn strip_bearer(raw: &str) -> &str {
    match raw.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => &raw[7..],
        _ => raw,
    }
}

/// Pull the credential from the Authorization header, else from the cookie
///
/// An empty header falls through to the cookie; an empty result after
/// stripping the prefix counts as no credential.
pub fn extract_credential(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let raw = from_header.or_else(|| {
        CookieJar::from_headers(headers)
            .get(cookie_name)
            .map(|c| c.value().to_string())
            .filter(|s| !s.is_empty())
    })?;

    let token = strip_bearer(&raw);
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Verify signature and expiry, returning the session claim
///
/// Accepts the HMAC family; `exp` is checked when present but not required.
pub fn verify_token(token: &str, secret: &str) -> ApiResult<SessionClaim> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.required_spec_claims.clear();
    validation.validate_aud = false;
    validation.leeway = 0;

    decode::<SessionClaim>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token has expired".to_string(),
                ErrorKind::InvalidSignature => "invalid token signature".to_string(),
                _ => format!("invalid token: {}", e),
            };
            ApiError::InvalidToken { reason }
        })
}

/// Short, log-safe identifier for a credential
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sign_claim, sign_token, TEST_SECRET};
    use axum::http::{header::COOKIE, HeaderValue};

    fn headers(pairs: &[(axum::http::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_strip_bearer_any_case() {
        assert_eq!(strip_bearer("Bearer abc"), "abc");
        assert_eq!(strip_bearer("bearer abc"), "abc");
        assert_eq!(strip_bearer("BEARER abc"), "abc");
        assert_eq!(strip_bearer("abc"), "abc");
        assert_eq!(strip_bearer("Bearer Bearer abc"), "Bearer abc");
    }

    #[test]
    fn test_extract_from_header() {
        let map = headers(&[(AUTHORIZATION, "Bearer tok1")]);
        assert_eq!(extract_credential(&map, "authorization"), Some("tok1".into()));
    }

    #[test]
    fn test_extract_from_cookie() {
        let map = headers(&[(COOKIE, "theme=dark; authorization=Bearer%20tok2")]);
        // Percent-decoded, then the prefix is stripped
        assert_eq!(extract_credential(&map, "authorization"), Some("tok2".into()));

        let map = headers(&[(COOKIE, "authorization=tok2")]);
        assert_eq!(extract_credential(&map, "authorization"), Some("tok2".into()));
    }

    #[test]
    fn test_header_wins_over_cookie() {
        let map = headers(&[(AUTHORIZATION, "tok-header"), (COOKIE, "authorization=tok-cookie")]);
        assert_eq!(
            extract_credential(&map, "authorization"),
            Some("tok-header".into())
        );
    }

    #[test]
    fn test_absent_or_empty_is_missing() {
        assert_eq!(extract_credential(&HeaderMap::new(), "authorization"), None);
        let map = headers(&[(AUTHORIZATION, "Bearer ")]);
        assert_eq!(extract_credential(&map, "authorization"), None);
    }

    #[test]
    fn test_credential_is_not_trimmed() {
        let map = headers(&[(AUTHORIZATION, " Bearer tok")]);
        assert_eq!(
            extract_credential(&map, "authorization"),
            Some(" Bearer tok".into())
        );

        let map = headers(&[(AUTHORIZATION, "Bearer  tok ")]);
        assert_eq!(extract_credential(&map, "authorization"), Some(" tok ".into()));
    }

    #[test]
    fn test_verify_valid_token() {
        let token = sign_token("S1", TEST_SECRET);
        let claim = verify_token(&token, TEST_SECRET).unwrap();
        assert_eq!(claim.session, "S1");
    }

    #[test]
    fn test_verify_wrong_secret() {
        let token = sign_token("S1", "another-secret");
        assert!(matches!(
            verify_token(&token, TEST_SECRET),
            Err(ApiError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_verify_expired_token() {
        let claim = SessionClaim {
            session: "S1".into(),
            exp: Some(1_000),
            iat: None,
        };
        let token = sign_claim(&claim, TEST_SECRET);
        match verify_token(&token, TEST_SECRET) {
            Err(ApiError::InvalidToken { reason }) => assert!(reason.contains("expired")),
            other => panic!("expected InvalidToken, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_garbage() {
        assert!(verify_token("not.a.jwt", TEST_SECRET).is_err());
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        assert_eq!(fingerprint("tok1"), fingerprint("tok1"));
        assert_ne!(fingerprint("tok1"), fingerprint("tok2"));
        assert_eq!(fingerprint("tok1").len(), 12);
    }
}
