use std::sync::Arc;

use crate::{remote_key_set::RemoteKeySet, KeyFetchError, SigningKeySet};

/// Source of the signing keys used to verify tokens: either a fixed local set or a [`RemoteKeySet`].
///
/// Cloning is cheap and every clone shares the same cache, so one provider can be handed to any number of gates.
#[derive(Clone)]
pub enum KeyProvider {
    Local(Arc<SigningKeySet>),
    Remote(RemoteKeySet),
}

impl KeyProvider {
    pub async fn get_keys(&self) -> Result<Arc<SigningKeySet>, KeyFetchError> {
        match self {
            KeyProvider::Local(key_set) => Ok(key_set.clone()),
            KeyProvider::Remote(remote_key_set) => remote_key_set.key_set().await,
        }
    }

    /// Fetches a newer key set, if one can be had. A local provider never has one.
    pub async fn refresh(&self) -> Result<Option<Arc<SigningKeySet>>, KeyFetchError> {
        match self {
            KeyProvider::Local(_) => Ok(None),
            KeyProvider::Remote(remote_key_set) => remote_key_set.refresh().await,
        }
    }
}

impl From<SigningKeySet> for KeyProvider {
    fn from(key_set: SigningKeySet) -> Self {
        KeyProvider::Local(Arc::new(key_set))
    }
}

impl From<jsonwebtoken::jwk::JwkSet> for KeyProvider {
    fn from(jwk_set: jsonwebtoken::jwk::JwkSet) -> Self {
        SigningKeySet::from(jwk_set).into()
    }
}

impl From<RemoteKeySet> for KeyProvider {
    fn from(remote_key_set: RemoteKeySet) -> Self {
        KeyProvider::Remote(remote_key_set)
    }
}
