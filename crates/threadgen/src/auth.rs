//! Caller identity verification at the submission boundary.
//!
//! The pipeline itself never sees credentials; the dispatcher maps an
//! opaque credential to an [`OwnerId`] once, stamps it on the job record,
//! and every later read is checked against that owner.

use std::collections::HashMap;

use crate::error::AuthError;
use crate::job::record::OwnerId;

/// Maps an opaque credential to a caller identity.
pub trait Authenticator: Send + Sync {
    fn verify(&self, credential: &str) -> Result<OwnerId, AuthError>;
}

/// Static token-table authenticator for embedders and tests.
///
/// Real deployments verify tokens against an identity provider; that
/// protocol is out of scope here, only the boundary is.
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, OwnerId>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self {
            tokens: HashMap::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>, owner: OwnerId) -> Self {
        self.tokens.insert(token.into(), owner);
        self
    }
}

impl Default for StaticTokenAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn verify(&self, credential: &str) -> Result<OwnerId, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.tokens
            .get(credential)
            .cloned()
            .ok_or(AuthError::InvalidCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_token_maps_to_owner() {
        let auth = StaticTokenAuthenticator::new().with_token("tok-1", OwnerId::new("alice"));
        assert_eq!(auth.verify("tok-1").unwrap(), OwnerId::new("alice"));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let auth = StaticTokenAuthenticator::new();
        assert!(matches!(
            auth.verify("nope"),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn test_empty_credential_rejected() {
        let auth = StaticTokenAuthenticator::new().with_token("tok-1", OwnerId::new("alice"));
        assert!(matches!(auth.verify(""), Err(AuthError::MissingCredential)));
    }
}
