use std::str::FromStr;

use url::{Origin, Url};

use crate::error::Error;

/// One allow-list entry: an exact origin, or every subdomain of a host.
///
/// Parsed from `https://app.example.com`, `http://localhost:3000` or
/// `https://*.vercel.app`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustedOrigin {
    Exact(Origin),
    Subdomains {
        scheme: String,
        suffix: String,
        port: Option<u16>,
    },
}

impl TrustedOrigin {
    fn matches(&self, candidate: &Url) -> bool {
        match self {
            Self::Exact(origin) => candidate.origin() == *origin,
            Self::Subdomains {
                scheme,
                suffix,
                port,
            } => {
                let Some(host) = candidate.host_str() else {
                    return false;
                };
                candidate.scheme() == scheme
                    && candidate.port_or_known_default() == *port
                    && host
                        .strip_suffix(suffix.as_str())
                        .is_some_and(|label| label.len() > 1 && label.ends_with('.'))
            }
        }
    }
}

impl FromStr for TrustedOrigin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((scheme, rest)) = s.split_once("://*.") {
            // Parse the suffix as a host so ports and casing normalize.
            let url = Url::parse(&format!("{scheme}://{rest}"))
                .map_err(|e| Error::Config(format!("trusted origin '{s}': {e}")))?;
            let suffix = url
                .host_str()
                .ok_or_else(|| Error::Config(format!("trusted origin '{s}' has no host")))?;
            return Ok(Self::Subdomains {
                scheme: url.scheme().to_string(),
                suffix: suffix.to_string(),
                port: url.port_or_known_default(),
            });
        }

        let url =
            Url::parse(s).map_err(|e| Error::Config(format!("trusted origin '{s}': {e}")))?;
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(Error::Config(format!("trusted origin '{s}' is opaque")));
        }
        Ok(Self::Exact(origin))
    }
}

/// Origins whose cross-window messages are processed.
///
/// Anything not on the list, including opaque (`null`) origins, is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginAllowList(Vec<TrustedOrigin>);

impl OriginAllowList {
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = TrustedOrigin>) -> Self {
        Self(entries.into_iter().collect())
    }

    /// Parses a comma-separated list.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first invalid entry.
    pub fn parse_list(list: &str) -> Result<Self, Error> {
        list.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn push(&mut self, entry: TrustedOrigin) {
        if !self.0.contains(&entry) {
            self.0.push(entry);
        }
    }

    /// Whether a message event's `origin` string is trusted.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        let Ok(candidate) = Url::parse(origin) else {
            return false;
        };
        // An origin string never carries a path beyond "/".
        if candidate.path() != "/" || candidate.query().is_some() || candidate.fragment().is_some()
        {
            return false;
        }
        self.0.iter().any(|entry| entry.matches(&candidate))
    }
}

/// Hostname pattern (`localhost`, `*.run.app`) used to pick popup mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    Subdomains(String),
}

impl HostPattern {
    #[must_use]
    pub fn matches(&self, hostname: &str) -> bool {
        let hostname = hostname.to_ascii_lowercase();
        match self {
            Self::Exact(host) => hostname == *host,
            Self::Subdomains(suffix) => hostname
                .strip_suffix(suffix.as_str())
                .is_some_and(|label| label.len() > 1 && label.ends_with('.')),
        }
    }

    /// Parses a comma-separated list of patterns.
    #[must_use]
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(HostPattern::from)
            .collect()
    }
}

impl From<&str> for HostPattern {
    fn from(s: &str) -> Self {
        let s = s.trim().to_ascii_lowercase();
        match s.strip_prefix("*.") {
            Some(suffix) => Self::Subdomains(suffix.to_string()),
            None => Self::Exact(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: &str) -> OriginAllowList {
        OriginAllowList::parse_list(entries).unwrap()
    }

    #[test]
    fn exact_origin_matches_scheme_host_and_port() {
        let allow = list("https://devhub.example.com, http://localhost:3000");

        assert!(allow.allows("https://devhub.example.com"));
        assert!(allow.allows("https://devhub.example.com:443"));
        assert!(allow.allows("http://localhost:3000"));

        assert!(!allow.allows("http://devhub.example.com"));
        assert!(!allow.allows("http://localhost:3001"));
        assert!(!allow.allows("https://evil.example"));
    }

    #[test]
    fn wildcard_matches_subdomains_only() {
        let allow = list("https://*.vercel.app");

        assert!(allow.allows("https://devhub-git-main.vercel.app"));
        assert!(allow.allows("https://a.b.vercel.app"));

        assert!(!allow.allows("https://vercel.app"));
        assert!(!allow.allows("https://evilvercel.app"));
        assert!(!allow.allows("http://devhub.vercel.app"));
    }

    #[test]
    fn lookalike_hosts_are_rejected() {
        let allow = list("http://localhost:3000, https://*.run.app");

        assert!(!allow.allows("http://localhost.evil.example:3000"));
        assert!(!allow.allows("https://run.app.evil.example"));
        assert!(!allow.allows("https://evil.example/?x=.run.app"));
    }

    #[test]
    fn opaque_and_garbage_origins_are_rejected() {
        let allow = list("https://devhub.example.com");
        assert!(!allow.allows("null"));
        assert!(!allow.allows(""));
        assert!(!allow.allows("https://devhub.example.com/path"));
    }

    #[test]
    fn invalid_entries_are_config_errors() {
        assert!(OriginAllowList::parse_list("not a url").is_err());
        assert!(OriginAllowList::parse_list("data:text/plain,hi").is_err());
        assert_eq!(OriginAllowList::parse_list("").unwrap(), OriginAllowList::default());
    }

    #[test]
    fn push_deduplicates() {
        let mut allow = list("https://devhub.example.com");
        allow.push("https://devhub.example.com".parse().unwrap());
        assert_eq!(allow.0.len(), 1);
    }

    #[test]
    fn host_patterns() {
        let patterns = HostPattern::parse_list("localhost, *.run.app");

        assert!(patterns.iter().any(|p| p.matches("localhost")));
        assert!(patterns.iter().any(|p| p.matches("preview-123.run.app")));
        assert!(patterns.iter().any(|p| p.matches("Preview.RUN.app")));
        assert!(!patterns.iter().any(|p| p.matches("devhub.vercel.app")));
        assert!(!patterns.iter().any(|p| p.matches("run.app")));
    }
}
