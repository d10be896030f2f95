use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Backend user identifier (the identity service's `sub`, a UUID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Resource row identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of one in-flight sign-in attempt.
///
/// Random, URL-safe; see [`generate_request_id`](crate::pkce::generate_request_id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Into)]
pub struct RequestId(pub String);

/// Tag of one optimistic mutation.
///
/// Assigned monotonically by the executor, so a larger id on the same
/// (entity, field) always means a newer mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
pub struct CorrelationId(pub u64);
