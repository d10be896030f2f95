use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{GatewayError, IdentityProvider, RemoteGateway};
use crate::config::ClientConfig;
use crate::mutation::VoteDirection;
use crate::session::{Identity, Session, SessionTokens};
use crate::types::{ResourceId, UserId};

/// HTTP client for the hosted backend (identity service + table API).
///
/// One instance serves as both [`IdentityProvider`] and [`RemoteGateway`];
/// share it behind an `Arc`.
pub struct HostedBackend {
    base_url: Url,
    anon_key: String,
    provider: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

impl UserResponse {
    fn into_identity(self) -> Identity {
        let display_name = self
            .user_metadata
            .full_name
            .or(self.user_metadata.user_name)
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "Anonymous".into());
        Identity {
            id: UserId(self.id),
            display_name,
            avatar_url: self.user_metadata.avatar_url,
            email: self.email,
        }
    }
}

impl HostedBackend {
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            base_url: config.backend_url.clone(),
            anon_key: config.anon_key.clone(),
            provider: config.provider.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    fn request(
        &self,
        method: Method,
        url: Url,
        access_token: Option<&str>,
    ) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header("apikey", &self.anon_key);
        match access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Table endpoint filtered by `user_id` and `resource_id` equality.
    fn row_filter(
        &self,
        table: &str,
        session: &Session,
        resource: &ResourceId,
    ) -> Result<Url, GatewayError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        url.query_pairs_mut()
            .append_pair("user_id", &format!("eq.{}", session.user_id()))
            .append_pair("resource_id", &format!("eq.{resource}"));
        Ok(url)
    }

    async fn send(
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = request.send().await?;
        Self::ensure_success(response, operation).await
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(GatewayError::Unauthorized { operation });
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Status {
            operation,
            status: status.as_u16(),
            detail: body,
        })
    }
}

impl IdentityProvider for HostedBackend {
    async fn authorization_url(
        &self,
        redirect_uri: &Url,
        code_challenge: Option<&str>,
    ) -> Result<Url, GatewayError> {
        let mut url = self.endpoint("auth/v1/authorize")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("provider", &self.provider)
                .append_pair("redirect_to", redirect_uri.as_str());
            if let Some(challenge) = code_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "s256");
            }
        }
        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<SessionTokens, GatewayError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "pkce");

        let request = self
            .request(Method::POST, url, None)
            .json(&json!({ "auth_code": code, "code_verifier": code_verifier }));
        let response = Self::send(request, "code exchange").await?;
        let tokens = response.json::<TokenResponse>().await?;

        SessionTokens::new(tokens.access_token, tokens.refresh_token)
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

impl RemoteGateway for HostedBackend {
    async fn establish_session(&self, tokens: &SessionTokens) -> Result<Session, GatewayError> {
        let url = self.endpoint("auth/v1/user")?;
        let request = self.request(Method::GET, url, Some(tokens.access_token()));
        let response = Self::send(request, "session exchange").await?;
        let user = response.json::<UserResponse>().await?;
        if user.id.is_empty() {
            return Err(GatewayError::Malformed("user without id".into()));
        }

        Ok(Session::new(tokens.clone(), user.into_identity()))
    }

    async fn sign_out(&self, session: &Session) -> Result<(), GatewayError> {
        let url = self.endpoint("auth/v1/logout")?;
        let request = self.request(Method::POST, url, Some(session.access_token()));
        Self::send(request, "sign out").await.map(drop)
    }

    async fn upsert_vote(
        &self,
        session: &Session,
        resource: &ResourceId,
        direction: VoteDirection,
    ) -> Result<(), GatewayError> {
        let mut url = self.endpoint("rest/v1/votes")?;
        url.query_pairs_mut()
            .append_pair("on_conflict", "user_id,resource_id");

        let request = self
            .request(Method::POST, url, Some(session.access_token()))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&json!({
                "user_id": session.user_id(),
                "resource_id": resource,
                "vote_type": direction,
            }));
        Self::send(request, "vote upsert").await.map(drop)
    }

    async fn delete_vote(
        &self,
        session: &Session,
        resource: &ResourceId,
    ) -> Result<(), GatewayError> {
        let url = self.row_filter("votes", session, resource)?;
        let request = self.request(Method::DELETE, url, Some(session.access_token()));
        Self::send(request, "vote delete").await.map(drop)
    }

    async fn insert_bookmark(
        &self,
        session: &Session,
        resource: &ResourceId,
    ) -> Result<(), GatewayError> {
        let url = self.endpoint("rest/v1/bookmarks")?;
        let request = self
            .request(Method::POST, url, Some(session.access_token()))
            .header("Prefer", "return=minimal")
            .json(&json!({
                "user_id": session.user_id(),
                "resource_id": resource,
            }));
        match Self::send(request, "bookmark insert").await {
            // Unique (user_id, resource_id): the bookmark already exists.
            Err(GatewayError::Status { status: 409, .. }) => {
                tracing::debug!(resource_id = %resource, "Bookmark already present");
                Ok(())
            }
            other => other.map(drop),
        }
    }

    async fn delete_bookmark(
        &self,
        session: &Session,
        resource: &ResourceId,
    ) -> Result<(), GatewayError> {
        let url = self.row_filter("bookmarks", session, resource)?;
        let request = self.request(Method::DELETE, url, Some(session.access_token()));
        Self::send(request, "bookmark delete").await.map(drop)
    }
}
