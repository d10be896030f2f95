use std::time::Duration;

use url::Url;

use crate::auth::{HostPattern, OriginAllowList, TrustedOrigin};
use crate::error::Error;

/// Name, width and height of the sign-in popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Default for PopupSpec {
    fn default() -> Self {
        Self {
            name: "oauth_popup".into(),
            width: 600,
            height: 700,
        }
    }
}

impl PopupSpec {
    /// `window.open` feature string, e.g. `width=600,height=700`.
    #[must_use]
    pub fn features(&self) -> String {
        format!("width={},height={}", self.width, self.height)
    }
}

/// Client configuration.
///
/// Required fields (backend URL, anon key, redirect URI) are constructor
/// parameters. Use [`from_env()`](ClientConfig::from_env) for convention-based
/// setup, or [`new()`](ClientConfig::new) with `with_*` methods.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) backend_url: Url,
    pub(crate) anon_key: String,
    pub(crate) redirect_uri: Url,
    pub(crate) provider: String,
    pub(crate) trusted_origins: OriginAllowList,
    pub(crate) popup_hosts: Vec<HostPattern>,
    pub(crate) popup: PopupSpec,
    pub(crate) popup_poll_interval: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) use_pkce: bool,
    pub(crate) home_path: String,
}

impl ClientConfig {
    /// The redirect URI's own origin is always trusted: that is where the
    /// callback page posts from.
    #[must_use]
    pub fn new(backend_url: Url, anon_key: impl Into<String>, redirect_uri: Url) -> Self {
        let mut trusted_origins = OriginAllowList::default();
        trusted_origins.push(TrustedOrigin::Exact(redirect_uri.origin()));
        Self {
            backend_url,
            anon_key: anon_key.into(),
            redirect_uri,
            provider: "github".into(),
            trusted_origins,
            popup_hosts: HostPattern::parse_list("localhost,*.run.app"),
            popup: PopupSpec::default(),
            popup_poll_interval: Duration::from_secs(1),
            write_timeout: Duration::from_secs(5),
            use_pkce: false,
            home_path: "/".into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `DEVHUB_BACKEND_URL`: hosted backend base URL
    /// - `DEVHUB_ANON_KEY`: public API key sent as `apikey`
    /// - `DEVHUB_REDIRECT_URI`: OAuth callback URI (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `DEVHUB_PROVIDER`: OAuth provider name (default `github`)
    /// - `DEVHUB_TRUSTED_ORIGINS`: comma-separated extra message origins
    /// - `DEVHUB_POPUP_HOSTS`: comma-separated hostnames that use popup sign-in
    /// - `DEVHUB_WRITE_TIMEOUT_MS`: bound on vote/bookmark writes
    /// - `DEVHUB_POPUP_POLL_MS`: popup-closed poll interval
    /// - `DEVHUB_USE_PKCE`: `"1"` or `"true"` to request an authorization code
    /// - `DEVHUB_HOME_PATH`: where to go after sign-in
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let required =
            |key: &str| lookup(key).ok_or_else(|| Error::Config(format!("{key} is required")));
        let url = |key: &str, value: String| {
            value
                .parse::<Url>()
                .map_err(|e| Error::Config(format!("{key}: {e}")))
        };
        let millis = |key: &str, value: String| match value.parse::<u64>() {
            Ok(0) => Err(Error::Config(format!("{key} must be positive"))),
            Ok(ms) => Ok(Duration::from_millis(ms)),
            Err(e) => Err(Error::Config(format!("{key}: {e}"))),
        };

        let backend_url = url("DEVHUB_BACKEND_URL", required("DEVHUB_BACKEND_URL")?)?;
        let anon_key = required("DEVHUB_ANON_KEY")?;
        let redirect_uri = url("DEVHUB_REDIRECT_URI", required("DEVHUB_REDIRECT_URI")?)?;

        let mut config = Self::new(backend_url, anon_key, redirect_uri);

        if let Some(provider) = lookup("DEVHUB_PROVIDER") {
            config = config.with_provider(provider);
        }
        if let Some(origins) = lookup("DEVHUB_TRUSTED_ORIGINS") {
            for origin in origins.split(',').filter(|s| !s.trim().is_empty()) {
                config = config.with_trusted_origin(origin.parse()?);
            }
        }
        if let Some(hosts) = lookup("DEVHUB_POPUP_HOSTS") {
            config = config.with_popup_hosts(HostPattern::parse_list(&hosts));
        }
        if let Some(ms) = lookup("DEVHUB_WRITE_TIMEOUT_MS") {
            config = config.with_write_timeout(millis("DEVHUB_WRITE_TIMEOUT_MS", ms)?);
        }
        if let Some(ms) = lookup("DEVHUB_POPUP_POLL_MS") {
            config = config.with_popup_poll_interval(millis("DEVHUB_POPUP_POLL_MS", ms)?);
        }
        let use_pkce = matches!(lookup("DEVHUB_USE_PKCE").as_deref(), Some("1") | Some("true"));
        config = config.with_pkce(use_pkce);
        if let Some(path) = lookup("DEVHUB_HOME_PATH") {
            config = config.with_home_path(path);
        }

        Ok(config)
    }

    /// Override the OAuth provider name (default `github`).
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Trust one more origin for completion messages.
    #[must_use]
    pub fn with_trusted_origin(mut self, origin: TrustedOrigin) -> Self {
        self.trusted_origins.push(origin);
        self
    }

    /// Replace the hostnames that sign in through a popup.
    #[must_use]
    pub fn with_popup_hosts(mut self, hosts: Vec<HostPattern>) -> Self {
        self.popup_hosts = hosts;
        self
    }

    /// Override the popup window name and size.
    #[must_use]
    pub fn with_popup(mut self, popup: PopupSpec) -> Self {
        self.popup = popup;
        self
    }

    /// Set how often the popup is polled for being closed. Zero is clamped to 1ms.
    #[must_use]
    pub fn with_popup_poll_interval(mut self, interval: Duration) -> Self {
        self.popup_poll_interval = interval;
        self
    }

    /// Set the bound on a single vote or bookmark write.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Request an authorization code with PKCE instead of an implicit token.
    #[must_use]
    pub fn with_pkce(mut self, enabled: bool) -> Self {
        self.use_pkce = enabled;
        self
    }

    /// Set the path the callback page returns to.
    #[must_use]
    pub fn with_home_path(mut self, path: impl Into<String>) -> Self {
        self.home_path = path.into();
        self
    }

    /// Hosted backend base URL.
    #[must_use]
    pub fn backend_url(&self) -> &Url {
        &self.backend_url
    }

    /// OAuth callback URI registered with the provider.
    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// OAuth provider name passed to the authorize endpoint.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Origins whose completion messages are accepted.
    #[must_use]
    pub fn trusted_origins(&self) -> &OriginAllowList {
        &self.trusted_origins
    }

    /// Bound on a single remote write.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Where the callback page goes when it is not a popup.
    #[must_use]
    pub fn home_path(&self) -> &str {
        &self.home_path
    }
}
