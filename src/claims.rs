use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::Error;

/// Claims read from an access token's payload.
///
/// NOT verified: the identity service verifies its own tokens on every
/// request. These are only used locally to notice an expired session.
#[derive(Debug, Clone, Default, Deserialize)]
#[non_exhaustive]
pub struct AccessClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl AccessClaims {
    /// Expiry instant, if the token carries a valid `exp`.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.exp
            .and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
    }
}

/// Reads the payload segment of a JWT access token without verifying it.
///
/// # Errors
///
/// Returns `Error::Token` if the token is not three dot-separated segments
/// or the payload is not base64url-encoded JSON.
pub fn peek_access_claims(token: &str) -> Result<AccessClaims, Error> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::Token("invalid token format".into()));
    }

    // Some issuers pad their segments
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|_| Error::Token("invalid payload encoding".into()))?;

    serde_json::from_slice(&payload).map_err(|e| Error::Token(format!("invalid payload: {e}")))
}

#[cfg(test)]
pub(crate) fn unsigned_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.signature")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_sub_and_expiry() {
        let token = unsigned_token(&json!({
            "sub": "user-1",
            "email": "ada@example.com",
            "exp": 1_700_000_000,
        }));

        let claims = peek_access_claims(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("user-1"));
        assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
        assert_eq!(
            claims.expires_at(),
            Some(OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap())
        );
    }

    #[test]
    fn missing_exp_means_no_expiry() {
        let token = unsigned_token(&json!({ "sub": "user-1" }));
        assert_eq!(peek_access_claims(&token).unwrap().expires_at(), None);
    }

    #[test]
    fn rejects_opaque_tokens() {
        assert!(peek_access_claims("opaque-token").is_err());
        assert!(peek_access_claims("a.b").is_err());
        assert!(peek_access_claims("a.!!!.c").is_err());
    }

    #[test]
    fn tolerates_padded_payload() {
        let token = unsigned_token(&json!({ "sub": "u" }));
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        parts[1].push_str("==");
        let padded = parts.join(".");
        assert_eq!(peek_access_claims(&padded).unwrap().sub.as_deref(), Some("u"));
    }
}
