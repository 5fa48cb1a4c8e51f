//! Bearer-token authenticator backed by the `[gateway.tokens]` table.

use std::collections::{BTreeMap, HashMap};

use turnstream_core::{Authenticator, SubjectId};

/// Maps configured bearer tokens to subject ids. With no tokens configured
/// every request is unauthenticated.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, SubjectId>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: &BTreeMap<String, String>) -> Self {
        Self {
            tokens: tokens
                .iter()
                .filter(|(token, _)| !token.is_empty())
                .map(|(token, subject)| (token.clone(), SubjectId(subject.clone())))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, credential: Option<&str>) -> Option<SubjectId> {
        self.tokens.get(credential?).cloned()
    }
}

/// The credential of an `Authorization: Bearer <token>` header value.
pub fn bearer_credential(header: Option<&str>) -> Option<&str> {
    header?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
