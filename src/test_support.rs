use std::time::{Duration, SystemTime};

use jsonwebtoken::{
    jwk::{AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, RSAKeyParameters, RSAKeyType},
    Algorithm, EncodingKey, Header,
};
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{SigningKeySet, Verifier};

pub(crate) const AUDIENCE: &str = "https://drinks.example/api";
pub(crate) const ISSUER: &str = "https://issuer.example/";

const JWKS_PATH: &str = "/.well-known/jwks.json";

/// RSA key pair that mints RS256 tokens and publishes its public half as a JWK.
pub(crate) struct TokenSigner {
    key_id: String,
    encoding_key: EncodingKey,
    jwk: Jwk,
}

impl TokenSigner {
    pub(crate) fn generate(key_id: &str) -> Self {
        let rsa_private_key = openssl::rsa::Rsa::generate(2048).unwrap();

        let jwk = Jwk {
            common: CommonParameters {
                key_algorithm: Some(KeyAlgorithm::RS256),
                key_id: Some(key_id.to_string()),
                ..CommonParameters::default()
            },
            algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
                n: base64_url::encode(&rsa_private_key.n().to_vec()),
                e: base64_url::encode(&rsa_private_key.e().to_vec()),
                key_type: RSAKeyType::RSA,
            }),
        };
        let encoding_key = EncodingKey::from_rsa_der(&rsa_private_key.private_key_to_der().unwrap());

        TokenSigner {
            key_id: key_id.to_string(),
            encoding_key,
            jwk,
        }
    }

    pub(crate) fn jwk_set(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.jwk.clone()],
        }
    }

    pub(crate) fn key_set(&self) -> SigningKeySet {
        self.jwk_set().into()
    }

    pub(crate) fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key_id.clone());
        self.sign_with_header(&header, claims)
    }

    pub(crate) fn sign_with_header(&self, header: &Header, claims: &serde_json::Value) -> String {
        jsonwebtoken::encode(header, claims, &self.encoding_key).unwrap()
    }
}

/// Routes library logs to the test output; `RUST_LOG` selects the level.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
}

/// Claims accepted by [`verifier`], granting `permissions`.
pub(crate) fn claims(permissions: &[&str]) -> serde_json::Value {
    let now = unix_now();
    serde_json::json!({
        "sub": "auth0|1234567890",
        "aud": AUDIENCE,
        "iss": ISSUER,
        "iat": now.as_secs(),
        "exp": (now + Duration::from_secs(3600)).as_secs(),
        "permissions": permissions,
    })
}

pub(crate) fn expired_claims(permissions: &[&str]) -> serde_json::Value {
    let mut claims = claims(permissions);
    claims["exp"] = (unix_now() - Duration::from_secs(3600)).as_secs().into();
    claims
}

pub(crate) fn verifier() -> Verifier {
    Verifier::new(Algorithm::RS256, AUDIENCE, ISSUER)
}

/// Authorization server stand-in that publishes a JWK set on `/.well-known/jwks.json`.
pub(crate) struct MockAuthServer {
    inner_server: MockServer,
    signer: TokenSigner,
}

impl MockAuthServer {
    pub(crate) const KEY_ID: &'static str = "42";

    pub(crate) async fn new() -> MockAuthServer {
        init_tracing();
        let signer = TokenSigner::generate(Self::KEY_ID);
        let inner_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(signer.jwk_set()))
            .mount(&inner_server)
            .await;

        MockAuthServer {
            inner_server,
            signer,
        }
    }

    /// Serves `stale` for the first request only, then the key set of the returned server's own signer, as if the
    /// issuer had rotated its keys in between.
    pub(crate) async fn rotating(stale: &TokenSigner) -> MockAuthServer {
        init_tracing();
        let signer = TokenSigner::generate("rotated");
        let inner_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(stale.jwk_set()))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&inner_server)
            .await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(signer.jwk_set()))
            .with_priority(2)
            .mount(&inner_server)
            .await;

        MockAuthServer {
            inner_server,
            signer,
        }
    }

    pub(crate) fn server(&self) -> &MockServer {
        &self.inner_server
    }

    pub(crate) fn uri(&self) -> Url {
        Url::parse(&self.inner_server.uri()).unwrap()
    }

    pub(crate) fn jwks_url(&self) -> Url {
        self.uri().join(JWKS_PATH).unwrap()
    }

    pub(crate) fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub(crate) fn token(&self, permissions: &[&str]) -> String {
        self.signer.sign(&claims(permissions))
    }

    pub(crate) async fn jwks_requests(&self) -> usize {
        self.inner_server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == JWKS_PATH)
            .count()
    }
}
