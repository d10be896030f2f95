//! Authenticated session and the process-wide store that holds it.

mod store;

pub use store::{SessionStore, Unsubscribe};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::claims;
use crate::error::Error;
use crate::types::UserId;

/// Access/refresh token pair.
///
/// Both tokens are non-empty by construction.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionTokens {
    access_token: String,
    refresh_token: String,
}

impl SessionTokens {
    /// # Errors
    ///
    /// Returns `Error::Token` if either token is empty.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self, Error> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        if access_token.is_empty() || refresh_token.is_empty() {
            return Err(Error::Token("access and refresh tokens are both required".into()));
        }
        Ok(Self {
            access_token,
            refresh_token,
        })
    }

    /// Extracts `access_token` and `refresh_token` from a URL fragment.
    ///
    /// Returns `None` if either is missing or empty.
    #[must_use]
    pub fn from_fragment(url: &Url) -> Option<Self> {
        let fragment = url.fragment()?;
        let mut access = None;
        let mut refresh = None;
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            match key.as_ref() {
                "access_token" => access = Some(value.into_owned()),
                "refresh_token" => refresh = Some(value.into_owned()),
                _ => {}
            }
        }
        Self::new(access?, refresh?).ok()
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionTokens(<redacted>)")
    }
}

/// Signed-in user as reported by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// A fully established session: both tokens plus the identity they resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    tokens: SessionTokens,
    identity: Identity,
    expires_at: Option<OffsetDateTime>,
}

impl Session {
    #[must_use]
    pub fn new(tokens: SessionTokens, identity: Identity) -> Self {
        // Opaque access tokens are allowed; they just never expire locally.
        let expires_at = claims::peek_access_claims(tokens.access_token())
            .ok()
            .and_then(|c| c.expires_at());
        Self {
            tokens,
            identity,
            expires_at,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &SessionTokens {
        &self.tokens
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        self.tokens.access_token()
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.identity.id
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[cfg(test)]
pub(crate) fn test_identity(id: &str) -> Identity {
    Identity {
        id: UserId(id.to_string()),
        display_name: format!("user {id}"),
        avatar_url: None,
        email: Some(format!("{id}@example.com")),
    }
}

#[cfg(test)]
pub(crate) fn test_session(id: &str) -> Session {
    Session::new(
        SessionTokens::new(format!("access-{id}"), format!("refresh-{id}")).unwrap(),
        test_identity(id),
    )
}
