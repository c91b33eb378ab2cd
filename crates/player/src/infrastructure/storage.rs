//! Bearer credential storage.
//!
//! The token feeds both the HTTP `Authorization` header and the socket's
//! authenticate frame. Nothing is persisted beyond the process.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Header name used for the bearer credential
pub const AUTHORIZATION: &str = "Authorization";

/// Set/get/remove a bearer token
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;

    fn set_token(&self, token: &str);

    fn remove_token(&self);
}

/// Header map for the authenticate frame; empty when signed out.
pub fn auth_headers(store: &dyn CredentialStore) -> BTreeMap<String, String> {
    store
        .token()
        .map(|token| BTreeMap::from([(AUTHORIZATION.to_string(), format!("Bearer {token}"))]))
        .unwrap_or_default()
}

/// Process-local credential store shared by clones
#[derive(Clone, Debug, Default)]
pub struct InMemoryCredentialStore {
    token: Arc<RwLock<Option<String>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token.into()))),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    fn remove_token(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
