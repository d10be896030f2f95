use serde::{Deserialize, Serialize};
use url::Url;

use crate::session::SessionTokens;

/// Message posted from the callback window to its opener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PopupMessage {
    #[serde(rename = "OAUTH_AUTH_SUCCESS")]
    AuthSuccess { url: String },
}

/// What the provider handed back on the callback URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Implicit flow: both tokens in the fragment.
    Tokens(SessionTokens),
    /// PKCE flow: an authorization code in the query.
    Code(String),
    /// `error` / `error_description` in the query or fragment.
    ProviderError(String),
    /// None of the above; carries the raw fragment (possibly empty).
    Incomplete(String),
}

impl Completion {
    #[must_use]
    pub fn parse(url: &Url) -> Self {
        if let Some(tokens) = SessionTokens::from_fragment(url) {
            return Self::Tokens(tokens);
        }

        let fragment = url.fragment().unwrap_or_default();
        let params = url
            .query_pairs()
            .chain(url::form_urlencoded::parse(fragment.as_bytes()));
        let mut error = None;
        let mut description = None;
        let mut code = None;
        for (key, value) in params {
            match key.as_ref() {
                "error" => error = error.or(Some(value.into_owned())),
                "error_description" => description = description.or(Some(value.into_owned())),
                "code" => code = code.or(Some(value.into_owned())),
                _ => {}
            }
        }

        match (error, description, code) {
            (Some(error), description, _) => Self::ProviderError(description.unwrap_or(error)),
            (None, _, Some(code)) if !code.is_empty() => Self::Code(code),
            _ => Self::Incomplete(fragment.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(url: &str) -> Completion {
        Completion::parse(&url.parse().unwrap())
    }

    #[test]
    fn message_wire_format() {
        let message = PopupMessage::AuthSuccess {
            url: "https://app.example/auth/callback#a=b".into(),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({ "type": "OAUTH_AUTH_SUCCESS", "url": "https://app.example/auth/callback#a=b" })
        );
        assert_eq!(serde_json::from_value::<PopupMessage>(value).unwrap(), message);
    }

    #[test]
    fn other_message_types_do_not_parse() {
        for value in [
            json!({ "type": "PING" }),
            json!({ "type": "OAUTH_AUTH_SUCCESS" }),
            json!("OAUTH_AUTH_SUCCESS"),
        ] {
            assert!(serde_json::from_value::<PopupMessage>(value).is_err());
        }
    }

    #[test]
    fn implicit_tokens() {
        let c = parse("https://app.example/cb#access_token=a&refresh_token=r&expires_in=3600");
        assert_eq!(c, Completion::Tokens(SessionTokens::new("a", "r").unwrap()));
    }

    #[test]
    fn pkce_code() {
        assert_eq!(
            parse("https://app.example/auth/callback?code=abc123"),
            Completion::Code("abc123".into())
        );
    }

    #[test]
    fn provider_error_prefers_description() {
        assert_eq!(
            parse("https://app.example/cb?error=access_denied&error_description=User+denied"),
            Completion::ProviderError("User denied".into())
        );
        assert_eq!(
            parse("https://app.example/auth/callback#error=server_error"),
            Completion::ProviderError("server_error".into())
        );
    }

    #[test]
    fn partial_tokens_are_incomplete() {
        assert_eq!(
            parse("https://app.example/auth/callback#access_token=a"),
            Completion::Incomplete("access_token=a".into())
        );
        assert_eq!(
            parse("https://app.example/auth/callback"),
            Completion::Incomplete(String::new())
        );
    }
}
