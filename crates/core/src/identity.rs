//! Authenticator trait: the identity collaborator.
//!
//! The runtime never inspects credentials itself. It asks an
//! [`Authenticator`] for a subject and rejects the request when there is
//! none.

use serde::{Deserialize, Serialize};

/// Opaque id of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait Authenticator: Send + Sync {
    /// Resolve a bearer credential (the part after `Bearer `) to a subject.
    /// `None` means unauthenticated.
    fn authenticate(&self, credential: Option<&str>) -> Option<SubjectId>;
}
