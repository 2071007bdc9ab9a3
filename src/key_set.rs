use std::collections::HashMap;

use jsonwebtoken::jwk::{Jwk, JwkSet};

/// Public signing keys of an issuer, addressable by key ID (`kid`).
///
/// A set is never mutated after construction. Providers hand it out behind an `Arc` and install a fresh one on
/// refresh, so a verification always sees one consistent set.
#[derive(Debug, Clone, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, Jwk>,
}

impl SigningKeySet {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

/// Keys without a `kid` can never be selected and are dropped. On duplicate IDs the first key wins.
impl From<JwkSet> for SigningKeySet {
    fn from(jwk_set: JwkSet) -> Self {
        let mut keys = HashMap::with_capacity(jwk_set.keys.len());
        for jwk in jwk_set.keys {
            if let Some(kid) = jwk.common.key_id.clone() {
                keys.entry(kid).or_insert(jwk);
            }
        }
        SigningKeySet { keys }
    }
}

#[cfg(test)]
mod test {
    use jsonwebtoken::jwk::JwkSet;

    use super::SigningKeySet;

    #[test]
    fn test_keys_without_kid_are_dropped() {
        let jwk_set: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [
                { "kty": "oct", "kid": "a", "k": "c2VjcmV0" },
                { "kty": "oct", "k": "b3RoZXI" },
                { "kty": "oct", "kid": "a", "k": "ZHVwbGljYXRl" },
            ]
        }))
        .unwrap();

        let key_set = SigningKeySet::from(jwk_set);
        assert_eq!(key_set.len(), 1);
        assert!(key_set.find("a").is_some());
        assert!(key_set.find("b").is_none());
        assert_eq!(key_set.key_ids().collect::<Vec<_>>(), vec!["a"]);
    }
}
